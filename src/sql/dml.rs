use crate::error::DbError;
use crate::types::Value;

use super::{Dialect, QueryAndParams, push_where, quote_ident};

pub(super) fn insert(
    dialect: Dialect,
    table: &str,
    payload: &[(String, Value)],
    returning: Option<&str>,
) -> QueryAndParams {
    let table = quote_ident(table);
    let mut query = if payload.is_empty() {
        format!("INSERT INTO {table} DEFAULT VALUES")
    } else {
        let columns = payload
            .iter()
            .map(|(c, _)| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let markers = vec!["?"; payload.len()].join(", ");
        format!("INSERT INTO {table} ({columns}) VALUES ({markers})")
    };
    if dialect == Dialect::Postgres
        && let Some(key) = returning
    {
        query.push_str(" RETURNING ");
        query.push_str(&quote_ident(key));
    }
    QueryAndParams::new(query, payload.iter().map(|(_, v)| v.clone()).collect())
}

pub(super) fn update(
    table: &str,
    payload: &[(String, Value)],
    filter: Option<(&str, &[Value])>,
) -> Result<QueryAndParams, DbError> {
    if payload.is_empty() {
        return Err(DbError::ValidationError(format!(
            "update of `{table}` has no changes"
        )));
    }
    let assignments = payload
        .iter()
        .map(|(c, _)| format!("{} = ?", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let mut query = format!("UPDATE {} SET {assignments}", quote_ident(table));
    let mut params: Vec<Value> = payload.iter().map(|(_, v)| v.clone()).collect();
    push_where(&mut query, &mut params, filter);
    Ok(QueryAndParams::new(query, params))
}

pub(super) fn delete(table: &str, filter: Option<(&str, &[Value])>) -> QueryAndParams {
    let mut query = format!("DELETE FROM {}", quote_ident(table));
    let mut params = Vec::new();
    push_where(&mut query, &mut params, filter);
    QueryAndParams::new(query, params)
}

pub(super) fn truncate(dialect: Dialect, table: &str) -> QueryAndParams {
    let table = quote_ident(table);
    match dialect {
        // SQLite has no TRUNCATE; sqlite_sequence is left alone
        Dialect::Sqlite => QueryAndParams::new_without_params(format!("DELETE FROM {table}")),
        Dialect::Postgres => {
            QueryAndParams::new_without_params(format!("TRUNCATE TABLE {table} RESTART IDENTITY"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_with_and_without_columns() {
        let q = insert(
            Dialect::Postgres,
            "people",
            &[("name".into(), Value::Text("A".into())), ("age".into(), Value::Int(30))],
            Some("id"),
        );
        assert_eq!(
            q.query,
            "INSERT INTO \"people\" (\"name\", \"age\") VALUES (?, ?) RETURNING \"id\""
        );
        assert_eq!(q.params.len(), 2);

        let q = insert(Dialect::Sqlite, "people", &[], Some("id"));
        assert_eq!(q.query, "INSERT INTO \"people\" DEFAULT VALUES");
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(matches!(update("people", &[], None), Err(DbError::ValidationError(_))));
    }

    #[test]
    fn truncate_per_dialect() {
        assert_eq!(truncate(Dialect::Sqlite, "t").query, "DELETE FROM \"t\"");
        assert_eq!(
            truncate(Dialect::Postgres, "t").query,
            "TRUNCATE TABLE \"t\" RESTART IDENTITY"
        );
    }
}
