mod core;
mod dml;
mod select;
mod tx;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::adapter::{Capabilities, Connection, Outcome, Predicate, Statement, StatementKind};
use crate::condition::Condition;
use crate::error::DbError;
use crate::sql::{Dialect, compile_filter};

use super::BACKEND_NAME;

use self::core::{key_columns, rowid_alias};

pub use self::core::SqliteConnection;

#[async_trait]
impl Connection for SqliteConnection {
    fn backend(&self) -> &'static str {
        BACKEND_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transactions: true,
            truncate_resets_sequence: false,
            raw_expressions: true,
            joins: true,
            change_database: false,
        }
    }

    fn build_filter(&self, condition: &Condition) -> Result<Predicate, DbError> {
        Ok(match compile_filter(Dialect::Sqlite, condition)? {
            Some((clause, args)) => Predicate::Sql { clause, args },
            None => Predicate::All,
        })
    }

    async fn execute(&self, statement: Statement) -> Result<Outcome, DbError> {
        match statement.kind {
            StatementKind::Select => Ok(Outcome::Rows(Box::new(
                self.execute_select(&statement).await?,
            ))),
            StatementKind::Count => Ok(Outcome::Count(self.execute_count(&statement).await?)),
            StatementKind::Insert => Ok(Outcome::Inserted(self.execute_insert(&statement).await?)),
            StatementKind::Update | StatementKind::Delete | StatementKind::Truncate => {
                Ok(Outcome::Affected(self.execute_write(&statement).await?))
            }
        }
    }

    async fn collections(&self) -> Result<Vec<String>, DbError> {
        self.with_connection("collections", |conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn exists(&self, collection: &str) -> Result<bool, DbError> {
        let name = collection.to_string();
        self.with_connection("exists", move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(1) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
                [&name],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
        .await
    }

    /// Only a rowid alias is reported; other keys are never generated by `SQLite`.
    async fn primary_key(&self, collection: &str) -> Result<Option<String>, DbError> {
        let name = collection.to_string();
        self.with_connection("primary_key", move |conn| {
            let keys = key_columns(conn, &name)?;
            Ok(rowid_alias(&keys).map(str::to_string))
        })
        .await
    }

    async fn begin_tx(&self) -> Result<Arc<dyn Connection>, DbError> {
        Ok(Arc::new(self.begin().await?))
    }

    async fn commit(&self) -> Result<(), DbError> {
        self.commit_tx().await
    }

    async fn rollback(&self) -> Result<(), DbError> {
        self.rollback_tx().await
    }

    async fn close(&self) -> Result<(), DbError> {
        if self.is_tx() {
            return match self.rollback_tx().await {
                Ok(()) | Err(DbError::TransactionDone) => Ok(()),
                Err(e) => Err(e),
            };
        }
        let handle = self.conn_handle();
        let mut guard = handle.lock().await;
        if let Some(conn) = guard.take() {
            self.shared.settle(&conn);
            tracing::debug!("closing sqlite connection");
            conn.close().map_err(|(_, e)| DbError::SqliteError(e))?;
        }
        Ok(())
    }

    fn abandon(&self) -> bool {
        self.abandon_tx()
    }

    fn driver(&self) -> &(dyn Any + Send + Sync) {
        &self.shared.conn
    }
}
