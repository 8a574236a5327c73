//! The contract a backend implements to plug into sessions, collections and result sets.
//!
//! A [`Backend`] is a named factory registered in [`registry`]; it opens a [`Connection`],
//! which translates condition trees with [`Connection::build_filter`] and runs
//! [`Statement`]s. Selects hand back a [`Cursor`] that is drained one row at a time.

pub mod buffered;
pub mod registry;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;

use crate::condition::{Column, Condition};
use crate::config::ConnectionSettings;
use crate::error::DbError;
use crate::results::Row;
use crate::types::Value;

pub use buffered::BufferedCursor;

/// What a statement does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Count,
    Truncate,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Count => "count",
            StatementKind::Truncate => "truncate",
        };
        f.write_str(name)
    }
}

/// Backends compiled into this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum BuiltinBackend {
    /// In-process document store
    Memory,
    /// SQLite through rusqlite
    Sqlite,
    /// PostgreSQL through tokio-postgres
    Postgres,
}

impl BuiltinBackend {
    /// Registry name of the backend.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BuiltinBackend::Memory => "memory",
            BuiltinBackend::Sqlite => "sqlite",
            BuiltinBackend::Postgres => "postgres",
        }
    }
}

/// Features a backend declares; the core checks them instead of guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    pub transactions: bool,
    /// Whether `truncate` resets auto-increment counters.
    pub truncate_resets_sequence: bool,
    /// Whether `Raw` and `Func` conditions can be expressed.
    pub raw_expressions: bool,
    /// Whether collections with several names can be read.
    pub joins: bool,
    pub change_database: bool,
}

/// One sort key; `"-age"` or `"age DESC"` sorts descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if let Some(column) = spec.strip_prefix('-') {
            return Self {
                column: column.trim().to_string(),
                descending: true,
            };
        }
        let spec = spec.strip_prefix('+').unwrap_or(spec);
        let mut parts = spec.split_whitespace();
        let column = parts.next().unwrap_or_default().to_string();
        let descending = parts.next().is_some_and(|d| d.eq_ignore_ascii_case("desc"));
        Self { column, descending }
    }
}

impl From<&str> for SortKey {
    fn from(spec: &str) -> Self {
        SortKey::parse(spec)
    }
}

/// Offset, limit, ordering and projection of a read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryShape {
    pub offset: u64,
    /// `0` means unbounded.
    pub limit: u64,
    pub sort: Vec<SortKey>,
    /// Empty selects every column.
    pub columns: Vec<Column>,
}

/// Backend-native filter produced by [`Connection::build_filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// No restriction.
    All,
    /// SQL clause with positional `?` placeholders and their arguments.
    Sql { clause: String, args: Vec<Value> },
    /// Condition evaluated by the backend itself.
    Tree(Condition),
}

/// A statement handed to [`Connection::execute`].
#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    /// Collection names; writes use the first one.
    pub target: Vec<String>,
    pub predicate: Predicate,
    /// Column/value pairs for insert and update.
    pub payload: Vec<(String, Value)>,
    pub shape: QueryShape,
}

impl Statement {
    #[must_use]
    pub fn new(kind: StatementKind, target: Vec<String>) -> Self {
        Self {
            kind,
            target,
            predicate: Predicate::All,
            payload: Vec::new(),
            shape: QueryShape::default(),
        }
    }

    #[must_use]
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Vec<(String, Value)>) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_shape(mut self, shape: QueryShape) -> Self {
        self.shape = shape;
        self
    }

    /// Primary collection name.
    #[must_use]
    pub fn primary(&self) -> &str {
        self.target.first().map_or("", String::as_str)
    }
}

/// Result of [`Connection::execute`].
pub enum Outcome {
    Affected(u64),
    /// Insert result with the generated key, if the backend produced one.
    Inserted(Option<Value>),
    Count(u64),
    Rows(Box<dyn Cursor>),
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Affected(n) => f.debug_tuple("Affected").field(n).finish(),
            Outcome::Inserted(key) => f.debug_tuple("Inserted").field(key).finish(),
            Outcome::Count(n) => f.debug_tuple("Count").field(n).finish(),
            Outcome::Rows(_) => f.write_str("Rows(..)"),
        }
    }
}

impl Outcome {
    fn mismatch(self, expected: &str) -> DbError {
        DbError::ExecutionError(format!("backend returned {self:?}, expected {expected}"))
    }

    /// # Errors
    /// Returns `DbError::ExecutionError` if the backend answered with another outcome.
    pub fn into_cursor(self) -> Result<Box<dyn Cursor>, DbError> {
        match self {
            Outcome::Rows(cursor) => Ok(cursor),
            other => Err(other.mismatch("rows")),
        }
    }

    /// # Errors
    /// Returns `DbError::ExecutionError` if the backend answered with another outcome.
    pub fn into_count(self) -> Result<u64, DbError> {
        match self {
            Outcome::Count(n) | Outcome::Affected(n) => Ok(n),
            other => Err(other.mismatch("a count")),
        }
    }

    /// # Errors
    /// Returns `DbError::ExecutionError` if the backend answered with another outcome.
    pub fn into_key(self) -> Result<Option<Value>, DbError> {
        match self {
            Outcome::Inserted(key) => Ok(key),
            other => Err(other.mismatch("an insert result")),
        }
    }
}

/// Row source of one executed select.
#[async_trait]
pub trait Cursor: Send {
    /// Next row, or `None` at the end.
    async fn fetch_next(&mut self) -> Result<Option<Row>, DbError>;

    /// Release backend resources. Must be safe to call more than once.
    async fn close(&mut self) -> Result<(), DbError>;
}

/// An open connection (or pool handle, or transaction) of one backend.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Registry name of the backend.
    fn backend(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Translate a condition tree. Must be pure.
    ///
    /// # Errors
    /// Returns `DbError::UnsupportedExpression` for nodes the backend cannot express.
    fn build_filter(&self, condition: &Condition) -> Result<Predicate, DbError>;

    /// Run one statement.
    async fn execute(&self, statement: Statement) -> Result<Outcome, DbError>;

    /// Names of the collections in the active database.
    async fn collections(&self) -> Result<Vec<String>, DbError>;

    async fn exists(&self, collection: &str) -> Result<bool, DbError>;

    /// Column holding the generated key of `collection`, if any.
    async fn primary_key(&self, collection: &str) -> Result<Option<String>, DbError>;

    /// Switch the active database without reconnecting.
    async fn use_database(&self, name: &str) -> Result<(), DbError> {
        Err(DbError::UnsupportedFeature(format!(
            "{} cannot switch to database `{name}` on an open connection",
            self.backend()
        )))
    }

    /// Start a transaction; the returned connection runs statements inside it.
    async fn begin_tx(&self) -> Result<Arc<dyn Connection>, DbError>;

    async fn commit(&self) -> Result<(), DbError>;

    async fn rollback(&self) -> Result<(), DbError>;

    async fn close(&self) -> Result<(), DbError>;

    /// Give up an unfinished transaction without awaiting. Returns `false` when the
    /// backend needs an async `rollback` to release it.
    fn abandon(&self) -> bool {
        false
    }

    /// Native driver handle for operations outside this abstraction.
    fn driver(&self) -> &(dyn Any + Send + Sync);
}

/// A named connection factory.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether settings must carry a host or socket rather than only a database name.
    fn requires_address(&self) -> bool {
        false
    }

    async fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Connection>, DbError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_forms() {
        assert_eq!(
            SortKey::parse("-age"),
            SortKey {
                column: "age".into(),
                descending: true
            }
        );
        assert!(SortKey::parse("age DESC").descending);
        assert!(!SortKey::parse("+name").descending);
        assert_eq!(SortKey::parse("name asc").column, "name");
    }

    #[test]
    fn outcome_mismatch_is_an_error() {
        assert_eq!(Outcome::Count(3).into_count().unwrap(), 3);
        assert!(Outcome::Affected(1).into_key().is_err());
    }
}
