use crate::error::DbError;

use super::connection::PostgresConnection;

impl PostgresConnection {
    /// Check out a client from the pool and open a transaction on it.
    ///
    /// # Errors
    /// Returns `DbError::UnsupportedFeature` when called on a transaction handle, or the
    /// pool/driver error if `BEGIN` fails.
    pub async fn begin(&self) -> Result<PostgresConnection, DbError> {
        if self.is_tx() {
            return Err(DbError::UnsupportedFeature(
                "nested transactions are not supported".into(),
            ));
        }
        let client = self.pool.get().await?;
        client.batch_execute("BEGIN").await?;
        tracing::debug!("postgres transaction started");
        Ok(self.pinned(client))
    }

    /// Send `COMMIT` or `ROLLBACK` and release the pinned client back to the pool.
    ///
    /// # Errors
    /// Returns `DbError::TransactionDone` if already finished, `DbError::ValidationError` on
    /// a non-transaction connection, or the driver error.
    pub(crate) async fn finish(&self, verb: &str) -> Result<(), DbError> {
        let Some(slot) = &self.tx else {
            return Err(DbError::ValidationError(
                "not a transaction connection".into(),
            ));
        };
        let client = slot.lock().await.take().ok_or(DbError::TransactionDone)?;
        let result = client.batch_execute(verb).await;
        if result.is_err() && verb == "COMMIT" {
            // leave the client clean before it returns to the pool
            if let Err(e) = client.batch_execute("ROLLBACK").await {
                tracing::warn!(error = %e, "rollback after failed commit also failed");
            }
        }
        tracing::debug!(verb, ok = result.is_ok(), "postgres transaction finished");
        Ok(result?)
    }
}
