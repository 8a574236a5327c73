use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::DbError;
use crate::logging::log_statement;
use crate::sql::QueryAndParams;
use crate::sqlite::BACKEND_NAME;
use crate::sqlite::config::SharedSqliteConnection;
use crate::sqlite::params::Params;
use crate::translation::{PlaceholderStyle, number_placeholders};

/// State shared by a session's connection and its transaction handle.
pub(crate) struct SqliteShared {
    pub(crate) conn: SharedSqliteConnection,
    pub(crate) in_transaction: AtomicBool,
    /// An abandoned transaction whose `ROLLBACK` waits for the connection lock.
    pub(crate) rollback_pending: AtomicBool,
}

impl SqliteShared {
    /// Refuse parent work while a transaction owns the connection. Runs with the lock held,
    /// after any pending rollback has been settled.
    fn ensure_idle(&self, ctx: &str) -> Result<(), DbError> {
        if self.in_transaction.load(Ordering::Acquire) {
            return Err(DbError::ExecutionError(format!(
                "SQLite transaction in progress; operation not permitted ({ctx})"
            )));
        }
        Ok(())
    }
}

/// A `SQLite` connection, or a transaction running on it.
pub struct SqliteConnection {
    pub(crate) shared: Arc<SqliteShared>,
    /// `Some` for transaction handles; the flag flips once committed or rolled back.
    pub(crate) tx_done: Option<AtomicBool>,
}

impl SqliteConnection {
    pub(crate) fn new(conn: SharedSqliteConnection) -> Self {
        Self {
            shared: Arc::new(SqliteShared {
                conn,
                in_transaction: AtomicBool::new(false),
                rollback_pending: AtomicBool::new(false),
            }),
            tx_done: None,
        }
    }

    pub(crate) fn conn_handle(&self) -> SharedSqliteConnection {
        Arc::clone(&self.shared.conn)
    }

    pub(crate) fn is_tx(&self) -> bool {
        self.tx_done.is_some()
    }

    /// Refuse work on finished transaction handles.
    pub(crate) fn ensure_usable(&self) -> Result<(), DbError> {
        match &self.tx_done {
            Some(done) if done.load(Ordering::Acquire) => Err(DbError::TransactionDone),
            _ => Ok(()),
        }
    }

    /// Run `func` against the connection on the blocking pool.
    pub async fn with_connection<F, R>(&self, ctx: &str, func: F) -> Result<R, DbError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, DbError> + Send + 'static,
        R: Send + 'static,
    {
        self.ensure_usable()?;
        if self.is_tx() {
            return run_blocking(self.conn_handle(), func).await;
        }
        let shared = Arc::clone(&self.shared);
        let ctx = ctx.to_string();
        run_blocking(self.conn_handle(), move |conn| {
            shared.settle(conn);
            shared.ensure_idle(&ctx)?;
            func(conn)
        })
        .await
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field(
                "in_transaction",
                &self.shared.in_transaction.load(Ordering::Relaxed),
            )
            .field("is_tx", &self.is_tx())
            .finish_non_exhaustive()
    }
}

pub(crate) async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, DbError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, DbError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        match guard.as_mut() {
            Some(conn) => func(conn),
            None => Err(closed()),
        }
    })
    .await
    .map_err(|e| DbError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}

pub(crate) fn closed() -> DbError {
    DbError::ConnectionError {
        backend: BACKEND_NAME.to_string(),
        message: "connection is closed".to_string(),
        source: None,
    }
}

/// Declared primary-key columns of `table` with their declared types, in key order.
pub(crate) fn key_columns(
    conn: &rusqlite::Connection,
    table: &str,
) -> Result<Vec<(String, String)>, DbError> {
    let mut stmt =
        conn.prepare("SELECT name, type FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
    let keys = stmt
        .query_map([table], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
}

/// The column aliasing the rowid: a lone key column declared exactly `INTEGER`.
pub(crate) fn rowid_alias(keys: &[(String, String)]) -> Option<&str> {
    match keys {
        [(name, ty)] if ty.eq_ignore_ascii_case("INTEGER") => Some(name),
        _ => None,
    }
}

/// Number placeholders for rusqlite, log the statement and convert its arguments.
pub(crate) fn prepare(query: QueryAndParams) -> (String, Params) {
    let sql = number_placeholders(&query.query, PlaceholderStyle::Sqlite).into_owned();
    log_statement(BACKEND_NAME, &sql, &query.params);
    let params = Params::convert(&query.params);
    (sql, params)
}
