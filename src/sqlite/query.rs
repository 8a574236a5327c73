use rusqlite::types::Value as SqliteValue;
use rusqlite::{Connection, params_from_iter};

use crate::error::DbError;
use crate::results::{Columns, Row};

use super::params::{Params, sqlite_to_value};

/// Run a query and collect every row. Column names are shared between rows.
///
/// # Errors
/// Returns `DbError::SqliteError` if preparing or stepping the statement fails.
pub fn build_rows(conn: &Connection, sql: &str, params: &Params) -> Result<Vec<Row>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let columns = Columns::new(
        stmt.column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect(),
    );
    let width = columns.len();

    let mut rows_iter = stmt.query(params_from_iter(params.as_values()))?;
    let mut rows = Vec::new();
    while let Some(row) = rows_iter.next()? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            let value: SqliteValue = row.get(idx)?;
            values.push(sqlite_to_value(value));
        }
        rows.push(Row::new(columns.clone(), values));
    }
    Ok(rows)
}

/// Run a single-value query such as `COUNT(1)`.
///
/// # Errors
/// Returns `DbError::SqliteError` if the query fails or yields no row.
pub fn query_count(conn: &Connection, sql: &str, params: &Params) -> Result<u64, DbError> {
    let n: i64 = conn.query_row(sql, params_from_iter(params.as_values()), |row| row.get(0))?;
    u64::try_from(n).map_err(|e| DbError::ConversionError(format!("negative count {n}: {e}")))
}

/// Execute a statement and report the affected row count.
///
/// # Errors
/// Returns `DbError::SqliteError` if execution fails.
pub fn execute_dml(conn: &Connection, sql: &str, params: &Params) -> Result<u64, DbError> {
    let affected = conn.execute(sql, params_from_iter(params.as_values()))?;
    Ok(affected as u64)
}
