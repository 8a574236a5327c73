use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::error::DbError;
use crate::sqlite::config::SharedSqliteConnection;

use super::SqliteConnection;
use super::core::{SqliteShared, run_blocking};

const ROLLBACK_BUSY_RETRIES: &[Duration] = &[
    Duration::from_millis(10),
    Duration::from_millis(25),
    Duration::from_millis(50),
];

fn is_busy(err: &DbError) -> bool {
    matches!(
        err,
        DbError::SqliteError(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::DatabaseBusy
    )
}

/// Roll back, retrying briefly while the database reports `SQLITE_BUSY`.
pub(crate) fn rollback_with_busy_retries(conn: &rusqlite::Connection) -> Result<(), DbError> {
    for (idx, delay) in ROLLBACK_BUSY_RETRIES.iter().copied().enumerate() {
        let result = conn.execute_batch("ROLLBACK").map_err(DbError::SqliteError);
        match result {
            Err(ref e) if is_busy(e) && idx + 1 < ROLLBACK_BUSY_RETRIES.len() => {
                thread::sleep(delay);
            }
            other => return other,
        }
    }
    Err(DbError::ExecutionError("rollback retries exhausted".into()))
}

async fn rollback_on(handle: SharedSqliteConnection) -> Result<(), DbError> {
    run_blocking(handle, |conn| rollback_with_busy_retries(conn)).await
}

impl SqliteShared {
    /// Roll back an abandoned transaction, if one is waiting. Call with the lock held.
    pub(crate) fn settle(&self, conn: &rusqlite::Connection) {
        if !self.rollback_pending.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = rollback_with_busy_retries(conn) {
            tracing::warn!(error = %e, "rollback of abandoned sqlite transaction failed");
        }
        self.in_transaction.store(false, Ordering::Release);
        tracing::debug!("abandoned sqlite transaction rolled back");
    }
}

impl SqliteConnection {
    /// Begin a transaction and hand back the connection that runs inside it.
    ///
    /// # Errors
    /// Returns `DbError` if a transaction is already active or `BEGIN` fails.
    pub(crate) async fn begin(&self) -> Result<SqliteConnection, DbError> {
        if self.is_tx() {
            return Err(DbError::UnsupportedFeature(
                "nested SQLite transactions are not supported".into(),
            ));
        }
        if self.shared.rollback_pending.load(Ordering::Acquire) {
            let shared = Arc::clone(&self.shared);
            run_blocking(self.conn_handle(), move |conn| {
                shared.settle(conn);
                Ok(())
            })
            .await?;
        }
        if self
            .shared
            .in_transaction
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DbError::ExecutionError(
                "SQLite transaction already in progress".into(),
            ));
        }
        let begun = run_blocking(self.conn_handle(), |conn| {
            conn.execute_batch("BEGIN").map_err(DbError::SqliteError)
        })
        .await;
        if let Err(e) = begun {
            self.shared.in_transaction.store(false, Ordering::Release);
            return Err(e);
        }
        tracing::debug!("sqlite transaction started");
        Ok(SqliteConnection {
            shared: Arc::clone(&self.shared),
            tx_done: Some(AtomicBool::new(false)),
        })
    }

    fn mark_done(&self) -> Result<(), DbError> {
        let Some(done) = &self.tx_done else {
            return Err(DbError::ValidationError(
                "no transaction is open on this connection".into(),
            ));
        };
        if done.swap(true, Ordering::AcqRel) {
            return Err(DbError::TransactionDone);
        }
        Ok(())
    }

    /// Commit; a failed `COMMIT` is rolled back so the parent connection is usable again.
    ///
    /// # Errors
    /// Returns `DbError::TransactionDone` if already finished, or the commit failure.
    pub(crate) async fn commit_tx(&self) -> Result<(), DbError> {
        self.mark_done()?;
        let result = run_blocking(self.conn_handle(), |conn| {
            match conn.execute_batch("COMMIT").map_err(DbError::SqliteError) {
                Ok(()) => Ok(()),
                Err(e) => {
                    if let Err(rb) = rollback_with_busy_retries(conn) {
                        tracing::warn!(error = %rb, "rollback after failed commit also failed");
                    }
                    Err(e)
                }
            }
        })
        .await;
        self.shared.in_transaction.store(false, Ordering::Release);
        tracing::debug!(ok = result.is_ok(), "sqlite transaction committed");
        result
    }

    /// Roll back an open transaction.
    ///
    /// # Errors
    /// Returns `DbError::TransactionDone` if already finished, or the rollback failure.
    pub(crate) async fn rollback_tx(&self) -> Result<(), DbError> {
        self.mark_done()?;
        let result = rollback_on(self.conn_handle()).await;
        self.shared.in_transaction.store(false, Ordering::Release);
        tracing::debug!(ok = result.is_ok(), "sqlite transaction rolled back");
        result
    }

    /// Release the transaction without awaiting: roll back now when the connection is free,
    /// otherwise leave the rollback for the next call on the parent.
    pub(crate) fn abandon_tx(&self) -> bool {
        match self.mark_done() {
            Ok(()) => {}
            Err(DbError::TransactionDone) => return true,
            Err(_) => return false,
        }
        self.shared.rollback_pending.store(true, Ordering::Release);
        if let Ok(guard) = self.shared.conn.try_lock() {
            match guard.as_ref() {
                Some(conn) => self.shared.settle(conn),
                None => {
                    self.shared.rollback_pending.store(false, Ordering::Release);
                    self.shared.in_transaction.store(false, Ordering::Release);
                }
            }
        }
        true
    }
}
