//! SQL generation shared by the SQLite and PostgreSQL adapters.
//!
//! Output uses positional `?` markers; adapters number them with
//! [`crate::translation::number_placeholders`] for their driver.

mod dml;
mod filter;
mod select;

use std::sync::LazyLock;

use regex::Regex;

use crate::adapter::{Predicate, Statement, StatementKind};
use crate::error::DbError;
use crate::types::Value;

pub use filter::compile_filter;

/// SQL flavour to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

/// A query and its parameters bundled together.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAndParams {
    /// SQL text with `?` placeholders.
    pub query: String,
    /// Arguments in placeholder order.
    pub params: Vec<Value>,
}

impl QueryAndParams {
    pub fn new(query: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }

    pub fn new_without_params(query: impl Into<String>) -> Self {
        Self::new(query, Vec::new())
    }
}

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|e| unreachable!("{e}"))
});

/// Quote an identifier, splitting `schema.table` style names; `*` passes through.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| {
            let part = part.trim();
            if part == "*" {
                part.to_string()
            } else {
                format!("\"{}\"", part.replace('"', "\"\""))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Check a function name before it is spliced into SQL.
pub(crate) fn function_name(name: &str) -> Result<&str, DbError> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(DbError::UnsupportedExpression(format!(
            "`{name}` is not a valid function name"
        )))
    }
}

/// Render `statement` for `dialect`. `returning` names the generated-key column an insert
/// should hand back (PostgreSQL only).
///
/// # Errors
/// Returns `DbError::ValidationError` for statements with no target or an empty update, and
/// `DbError::ExecutionError` if the predicate was produced by a non-SQL backend.
pub fn render(
    dialect: Dialect,
    statement: &Statement,
    returning: Option<&str>,
) -> Result<QueryAndParams, DbError> {
    if statement.target.is_empty() {
        return Err(DbError::ValidationError(
            "statement has no target collection".to_string(),
        ));
    }
    let filter = match &statement.predicate {
        Predicate::All => None,
        Predicate::Sql { clause, args } => Some((clause.as_str(), args.as_slice())),
        Predicate::Tree(_) => {
            return Err(DbError::ExecutionError(
                "predicate was not built for a SQL backend".to_string(),
            ));
        }
    };
    match statement.kind {
        StatementKind::Select => Ok(select::select(dialect, statement, filter)?),
        StatementKind::Count => Ok(select::count(statement, filter)),
        StatementKind::Insert => Ok(dml::insert(
            dialect,
            statement.primary(),
            &statement.payload,
            returning,
        )),
        StatementKind::Update => dml::update(statement.primary(), &statement.payload, filter),
        StatementKind::Delete => Ok(dml::delete(statement.primary(), filter)),
        StatementKind::Truncate => Ok(dml::truncate(dialect, statement.primary())),
    }
}

/// Append ` WHERE clause` and its arguments.
fn push_where(query: &mut String, params: &mut Vec<Value>, filter: Option<(&str, &[Value])>) {
    if let Some((clause, args)) = filter {
        query.push_str(" WHERE ");
        query.push_str(clause);
        params.extend_from_slice(args);
    }
}
