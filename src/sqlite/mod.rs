//! `SQLite` backend.
//!
//! One rusqlite connection per session, driven on tokio's blocking pool and guarded by a
//! `tokio::sync::Mutex`. A transaction runs on the same connection, so the parent session
//! refuses statements until it finishes. `truncate` deletes every row but leaves
//! `sqlite_sequence` untouched.
//!
//! Options: `busy_timeout` (milliseconds), `journal_mode`.

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapter::{Backend, Connection, registry};
use crate::config::ConnectionSettings;
use crate::error::DbError;

pub use config::{SharedSqliteConnection, SqliteOptions};
pub use connection::SqliteConnection;

pub const BACKEND_NAME: &str = "sqlite";

/// Register the `SQLite` backend under `"sqlite"`.
pub fn register() {
    registry::register(Arc::new(SqliteBackend));
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteBackend;

#[async_trait]
impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Connection>, DbError> {
        let opts = SqliteOptions::from_settings(settings)?;
        tracing::debug!(path = %opts.db_path, "opening sqlite database");
        let conn = opts.open().await?;
        Ok(Arc::new(SqliteConnection::new(conn)))
    }
}
