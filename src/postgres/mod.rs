//! `PostgreSQL` backend over a deadpool-postgres pool.
//!
//! Each statement checks out a pooled client; a transaction pins one client until it
//! commits or rolls back, so the parent session stays usable meanwhile. Inserts use
//! `RETURNING` on the primary key, and `truncate` restarts identity sequences.
//!
//! Options: `pool_size`, `application_name`.

pub mod config;
pub mod connection;
pub mod params;
pub mod query;
mod transaction;

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapter::{Backend, Connection, registry};
use crate::config::ConnectionSettings;
use crate::error::DbError;

pub use connection::PostgresConnection;
pub use deadpool_postgres::Pool;
pub use params::Params;

pub const BACKEND_NAME: &str = "postgres";

/// Register the `PostgreSQL` backend under `"postgres"`.
pub fn register() {
    registry::register(Arc::new(PostgresBackend));
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresBackend;

#[async_trait]
impl Backend for PostgresBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn requires_address(&self) -> bool {
        true
    }

    async fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Connection>, DbError> {
        let pool = config::connect_pool(settings).await?;
        tracing::debug!(database = ?settings.database, "postgres pool ready");
        Ok(Arc::new(PostgresConnection::new(pool)))
    }
}
