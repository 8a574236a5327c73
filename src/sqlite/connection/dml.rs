use crate::adapter::Statement;
use crate::error::DbError;
use crate::sql::{Dialect, render};
use crate::sqlite::query::execute_dml;
use crate::types::Value;

use super::SqliteConnection;
use super::core::{key_columns, prepare, rowid_alias};

impl SqliteConnection {
    /// Insert one row and report its key: the supplied key value when the payload carries
    /// the key column, otherwise the rowid when the key is (or aliases) the rowid.
    ///
    /// # Errors
    /// Returns `DbError` if rendering or executing the insert fails.
    pub(crate) async fn execute_insert(&self, statement: &Statement) -> Result<Option<Value>, DbError> {
        let (sql, params) = prepare(render(Dialect::Sqlite, statement, None)?);
        let table = statement.primary().to_string();
        let payload = statement.payload.clone();
        self.with_connection("insert", move |conn| {
            let keys = key_columns(conn, &table)?;
            execute_dml(conn, &sql, &params)?;
            let rowid = Value::Int(conn.last_insert_rowid());
            Ok(match keys.as_slice() {
                [] => Some(rowid),
                [(column, _)] => match supplied(&payload, column) {
                    Some(value) => Some(value.clone()),
                    None => rowid_alias(&keys).map(|_| rowid),
                },
                _ => None,
            })
        })
        .await
    }

    /// Execute UPDATE, DELETE or the truncating DELETE and report affected rows.
    ///
    /// # Errors
    /// Returns `DbError` if rendering or executing the statement fails.
    pub(crate) async fn execute_write(&self, statement: &Statement) -> Result<u64, DbError> {
        let (sql, params) = prepare(render(Dialect::Sqlite, statement, None)?);
        let ctx = statement.kind.to_string();
        self.with_connection(&ctx, move |conn| execute_dml(conn, &sql, &params))
            .await
    }
}

fn supplied<'a>(payload: &'a [(String, Value)], column: &str) -> Option<&'a Value> {
    payload
        .iter()
        .find(|(c, v)| c.eq_ignore_ascii_case(column) && !v.is_null())
        .map(|(_, v)| v)
}
