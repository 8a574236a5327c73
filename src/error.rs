use thiserror::Error;

use crate::adapter::StatementKind;

/// Boxed backend cause carried by connection errors.
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse error classification.
///
/// Callers branch on this instead of on message text; in particular `NoMoreRows` is the
/// iteration sentinel returned by `ResultSet::next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    MappingConflict,
    UnsupportedExpression,
    UnsupportedFeature,
    NoMoreRows,
    CursorClosed,
    Validation,
    TransactionDone,
    Conversion,
    Backend,
}

#[derive(Debug, Error)]
pub enum DbError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PoolErrorPostgres(#[from] deadpool_postgres::PoolError),

    #[error("Connection error ({backend}): {message}")]
    ConnectionError {
        backend: String,
        message: String,
        #[source]
        source: Option<BoxedCause>,
    },

    #[error("Mapping conflict in {type_name}: {message}")]
    MappingConflict {
        type_name: &'static str,
        message: String,
    },

    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("No more rows")]
    NoMoreRows,

    #[error("Result set is closed")]
    CursorClosed,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transaction already finished")]
    TransactionDone,

    #[error("Value conversion error: {0}")]
    ConversionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("{kind} on `{collection}` failed: {source}")]
    Statement {
        collection: String,
        kind: StatementKind,
        #[source]
        source: Box<DbError>,
    },
}

impl DbError {
    /// Classify this error, looking through operation-context wrappers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Statement { source, .. } => source.kind(),
            DbError::ConnectionError { .. } => ErrorKind::Connection,
            DbError::MappingConflict { .. } => ErrorKind::MappingConflict,
            DbError::UnsupportedExpression(_) => ErrorKind::UnsupportedExpression,
            DbError::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            DbError::NoMoreRows => ErrorKind::NoMoreRows,
            DbError::CursorClosed => ErrorKind::CursorClosed,
            DbError::ValidationError(_) => ErrorKind::Validation,
            DbError::TransactionDone => ErrorKind::TransactionDone,
            DbError::ConversionError(_) => ErrorKind::Conversion,
            #[cfg(feature = "postgres")]
            DbError::PoolErrorPostgres(_) => ErrorKind::Connection,
            _ => ErrorKind::Backend,
        }
    }

    /// `true` for the end-of-iteration sentinel.
    #[must_use]
    pub fn is_no_more_rows(&self) -> bool {
        self.kind() == ErrorKind::NoMoreRows
    }

    /// Attach the collection name and statement kind to a backend failure.
    #[must_use]
    pub fn in_statement(self, collection: &str, kind: StatementKind) -> DbError {
        match self {
            // already carries context, or is a core sentinel that must stay matchable as-is
            DbError::Statement { .. }
            | DbError::NoMoreRows
            | DbError::CursorClosed
            | DbError::TransactionDone => self,
            other => DbError::Statement {
                collection: collection.to_string(),
                kind,
                source: Box::new(other),
            },
        }
    }

    /// Wrap a backend cause as a `ConnectionError`.
    pub fn connection<E>(backend: &str, cause: E) -> DbError
    where
        E: Into<BoxedCause>,
    {
        let source: BoxedCause = cause.into();
        DbError::ConnectionError {
            backend: backend.to_string(),
            message: source.to_string(),
            source: Some(source),
        }
    }
}
