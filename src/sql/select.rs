use std::fmt::Write as _;

use crate::adapter::Statement;
use crate::condition::Column;
use crate::error::DbError;
use crate::types::Value;

use super::{Dialect, QueryAndParams, function_name, push_where, quote_ident};

fn from_clause(target: &[String]) -> String {
    target
        .iter()
        .map(|t| quote_ident(t))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_list(columns: &[Column]) -> Result<String, DbError> {
    if columns.is_empty() {
        return Ok("*".to_string());
    }
    let rendered = columns
        .iter()
        .map(|column| {
            Ok(match column {
                Column::Name(name) => quote_ident(name),
                Column::Aliased { column, alias } => {
                    format!("{} AS {}", quote_ident(column), quote_ident(alias))
                }
                Column::Raw(expr) => expr.clone(),
                Column::Func { name, columns } => format!(
                    "{}({})",
                    function_name(name)?,
                    columns
                        .iter()
                        .map(|c| quote_ident(c))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
        })
        .collect::<Result<Vec<_>, DbError>>()?;
    Ok(rendered.join(", "))
}

pub(super) fn select(
    dialect: Dialect,
    statement: &Statement,
    filter: Option<(&str, &[Value])>,
) -> Result<QueryAndParams, DbError> {
    let shape = &statement.shape;
    let mut query = format!(
        "SELECT {} FROM {}",
        column_list(&shape.columns)?,
        from_clause(&statement.target)
    );
    let mut params = Vec::new();
    push_where(&mut query, &mut params, filter);

    if !shape.sort.is_empty() {
        let keys = shape
            .sort
            .iter()
            .map(|key| {
                let dir = match (dialect, key.descending) {
                    (Dialect::Sqlite, false) => "ASC",
                    (Dialect::Sqlite, true) => "DESC",
                    // match SQLite's NULL placement
                    (Dialect::Postgres, false) => "ASC NULLS FIRST",
                    (Dialect::Postgres, true) => "DESC NULLS LAST",
                };
                format!("{} {dir}", quote_ident(&key.column))
            })
            .collect::<Vec<_>>()
            .join(", ");
        let _ = write!(query, " ORDER BY {keys}");
    }

    match (shape.limit, shape.offset) {
        (0, 0) => {}
        (0, offset) => match dialect {
            Dialect::Sqlite => {
                let _ = write!(query, " LIMIT -1 OFFSET {offset}");
            }
            Dialect::Postgres => {
                let _ = write!(query, " OFFSET {offset}");
            }
        },
        (limit, 0) => {
            let _ = write!(query, " LIMIT {limit}");
        }
        (limit, offset) => {
            let _ = write!(query, " LIMIT {limit} OFFSET {offset}");
        }
    }

    Ok(QueryAndParams::new(query, params))
}

pub(super) fn count(statement: &Statement, filter: Option<(&str, &[Value])>) -> QueryAndParams {
    let mut query = format!("SELECT COUNT(1) FROM {}", from_clause(&statement.target));
    let mut params = Vec::new();
    push_where(&mut query, &mut params, filter);
    QueryAndParams::new(query, params)
}
