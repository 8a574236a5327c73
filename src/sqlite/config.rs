use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::config::{Address, ConnectionSettings};
use crate::error::DbError;

use super::BACKEND_NAME;

/// One rusqlite connection shared by a session and its transaction handle.
///
/// `None` once the session is closed.
pub type SharedSqliteConnection = Arc<Mutex<Option<Connection>>>;

pub const MEMORY_PATH: &str = ":memory:";

/// Options for opening a `SQLite` database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    pub db_path: String,
    pub busy_timeout: Option<Duration>,
    /// `journal_mode` pragma; file databases default to `WAL`.
    pub journal_mode: Option<String>,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout: None,
            journal_mode: None,
        }
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_journal_mode(mut self, mode: impl Into<String>) -> Self {
        self.journal_mode = Some(mode.into());
        self
    }

    /// Read `database` (the file path, `:memory:` when absent), `busy_timeout` (ms) and
    /// `journal_mode` from generic settings.
    ///
    /// # Errors
    /// Returns `DbError::ValidationError` for network addressing or malformed options.
    pub fn from_settings(settings: &ConnectionSettings) -> Result<Self, DbError> {
        if settings.address() != Address::Local {
            return Err(DbError::ValidationError(
                "sqlite opens a file named by `database`; host and socket do not apply".into(),
            ));
        }
        let mut opts = SqliteOptions::new(settings.database.as_deref().unwrap_or(MEMORY_PATH));
        if let Some(ms) = settings.parse_option::<u64>("busy_timeout")? {
            opts = opts.with_busy_timeout(Duration::from_millis(ms));
        }
        if let Some(mode) = settings.get_option("journal_mode") {
            let mode = mode.trim().to_ascii_uppercase();
            if !matches!(
                mode.as_str(),
                "DELETE" | "TRUNCATE" | "PERSIST" | "MEMORY" | "WAL" | "OFF"
            ) {
                return Err(DbError::ValidationError(format!(
                    "unknown sqlite journal_mode {mode:?}"
                )));
            }
            opts = opts.with_journal_mode(mode);
        }
        Ok(opts)
    }

    fn is_memory(&self) -> bool {
        self.db_path == MEMORY_PATH || self.db_path.is_empty()
    }

    fn pragmas(&self) -> String {
        let mut batch = String::new();
        let journal = self
            .journal_mode
            .as_deref()
            .or((!self.is_memory()).then_some("WAL"));
        if let Some(mode) = journal {
            batch.push_str(&format!("PRAGMA journal_mode = {mode};"));
        }
        batch
    }

    /// Open the database on a blocking thread and apply the pragmas.
    ///
    /// # Errors
    /// Returns `DbError::ConnectionError` wrapping the rusqlite failure.
    pub async fn open(self) -> Result<SharedSqliteConnection, DbError> {
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, rusqlite::Error> {
            let conn = if self.is_memory() {
                Connection::open_in_memory()?
            } else {
                Connection::open(&self.db_path)?
            };
            if let Some(timeout) = self.busy_timeout {
                conn.busy_timeout(timeout)?;
            }
            let pragmas = self.pragmas();
            if !pragmas.is_empty() {
                conn.execute_batch(&pragmas)?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| DbError::connection(BACKEND_NAME, e))?
        .map_err(|e| DbError::connection(BACKEND_NAME, e))?;
        Ok(Arc::new(Mutex::new(Some(conn))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_settings() {
        let settings = ConnectionSettings::for_database("app.db")
            .option("busy_timeout", "250")
            .option("journal_mode", "delete");
        let opts = SqliteOptions::from_settings(&settings).unwrap();
        assert_eq!(opts.busy_timeout, Some(Duration::from_millis(250)));
        assert_eq!(opts.pragmas(), "PRAGMA journal_mode = DELETE;");
    }

    #[test]
    fn file_databases_default_to_wal() {
        let opts = SqliteOptions::new("app.db");
        assert_eq!(opts.pragmas(), "PRAGMA journal_mode = WAL;");
        assert!(SqliteOptions::new(MEMORY_PATH).pragmas().is_empty());
    }

    #[test]
    fn network_addressing_is_rejected() {
        let settings = ConnectionSettings::new().host("db").database("x");
        assert!(SqliteOptions::from_settings(&settings).is_err());
        let settings = ConnectionSettings::for_database("x").option("journal_mode", "fast");
        assert!(SqliteOptions::from_settings(&settings).is_err());
    }
}
