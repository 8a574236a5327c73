use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio::sync::MutexGuard;

use crate::adapter::{
    BufferedCursor, Capabilities, Connection, Outcome, Predicate, Statement, StatementKind,
};
use crate::condition::Condition;
use crate::error::DbError;
use crate::logging::log_statement;
use crate::sql::{Dialect, compile_filter, quote_ident, render};
use crate::translation::{PlaceholderStyle, number_placeholders};

use super::BACKEND_NAME;
use super::params::Params;
use super::query::{build_rows, postgres_extract_value};

type KeyCache = Arc<Mutex<HashMap<String, Option<String>>>>;

/// A pooled Postgres connection, or a transaction pinned to one pooled client.
pub struct PostgresConnection {
    pub(crate) pool: Pool,
    /// `Some` for transaction handles; the inner client is taken once finished.
    pub(crate) tx: Option<tokio::sync::Mutex<Option<Object>>>,
    keys: KeyCache,
}

/// A client checked out for one statement.
enum ClientGuard<'a> {
    Pooled(Object),
    Pinned(MutexGuard<'a, Option<Object>>),
}

impl ClientGuard<'_> {
    fn client(&self) -> Result<&Object, DbError> {
        match self {
            ClientGuard::Pooled(obj) => Ok(obj),
            ClientGuard::Pinned(slot) => slot.as_ref().ok_or(DbError::TransactionDone),
        }
    }
}

impl PostgresConnection {
    pub(crate) fn new(pool: Pool) -> Self {
        Self {
            pool,
            tx: None,
            keys: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn pinned(&self, client: Object) -> Self {
        Self {
            pool: self.pool.clone(),
            tx: Some(tokio::sync::Mutex::new(Some(client))),
            keys: Arc::clone(&self.keys),
        }
    }

    pub(crate) fn is_tx(&self) -> bool {
        self.tx.is_some()
    }

    async fn checkout(&self) -> Result<ClientGuard<'_>, DbError> {
        match &self.tx {
            Some(slot) => Ok(ClientGuard::Pinned(slot.lock().await)),
            None => {
                if self.pool.is_closed() {
                    return Err(DbError::ConnectionError {
                        backend: BACKEND_NAME.to_string(),
                        message: "connection is closed".to_string(),
                        source: None,
                    });
                }
                Ok(ClientGuard::Pooled(self.pool.get().await?))
            }
        }
    }

    /// Drop cached key lookups; `None` forgets every table.
    fn forget_keys(&self, table: Option<&str>) {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        match table {
            Some(name) => {
                keys.remove(name);
            }
            None => keys.clear(),
        }
    }

    async fn returning_column(&self, statement: &Statement) -> Result<Option<String>, DbError> {
        if statement.kind == StatementKind::Insert {
            self.primary_key(statement.primary()).await
        } else {
            Ok(None)
        }
    }

    async fn run(&self, statement: Statement) -> Result<Outcome, DbError> {
        let returning = self.returning_column(&statement).await?;
        let rendered = render(Dialect::Postgres, &statement, returning.as_deref())?;
        let sql = number_placeholders(&rendered.query, PlaceholderStyle::Postgres);
        log_statement(BACKEND_NAME, &sql, &rendered.params);

        let guard = self.checkout().await?;
        let client = guard.client()?;
        let prepared = client.prepare_cached(&sql).await?;
        let params = Params::convert(&rendered.params);

        match statement.kind {
            StatementKind::Select => {
                let rows = client.query(&prepared, params.as_refs()).await?;
                Ok(Outcome::Rows(Box::new(BufferedCursor::new(build_rows(
                    &rows,
                )?))))
            }
            StatementKind::Count => {
                let row = client.query_one(&prepared, params.as_refs()).await?;
                let n: i64 = row.try_get(0)?;
                Ok(Outcome::Count(to_u64(n, "count")?))
            }
            StatementKind::Insert if returning.is_some() => {
                let row = client.query_opt(&prepared, params.as_refs()).await?;
                let key = row
                    .map(|r| postgres_extract_value(&r, 0))
                    .transpose()?;
                Ok(Outcome::Inserted(key))
            }
            StatementKind::Insert => {
                client.execute(&prepared, params.as_refs()).await?;
                Ok(Outcome::Inserted(None))
            }
            StatementKind::Update | StatementKind::Delete | StatementKind::Truncate => {
                Ok(Outcome::Affected(
                    client.execute(&prepared, params.as_refs()).await?,
                ))
            }
        }
    }
}

impl fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("pool", &self.pool.status())
            .field("is_tx", &self.is_tx())
            .finish_non_exhaustive()
    }
}

fn to_u64(n: i64, what: &str) -> Result<u64, DbError> {
    u64::try_from(n).map_err(|e| DbError::ExecutionError(format!("invalid {what} {n}: {e}")))
}

#[async_trait]
impl Connection for PostgresConnection {
    fn backend(&self) -> &'static str {
        BACKEND_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transactions: true,
            truncate_resets_sequence: true,
            raw_expressions: true,
            joins: true,
            change_database: false,
        }
    }

    fn build_filter(&self, condition: &Condition) -> Result<Predicate, DbError> {
        Ok(match compile_filter(Dialect::Postgres, condition)? {
            Some((clause, args)) => Predicate::Sql { clause, args },
            None => Predicate::All,
        })
    }

    /// A failed statement may mean the table changed shape, so its cached key is dropped.
    async fn execute(&self, statement: Statement) -> Result<Outcome, DbError> {
        let table = statement.primary().to_string();
        let result = self.run(statement).await;
        if result.is_err() {
            self.forget_keys(Some(&table));
        }
        result
    }

    async fn collections(&self) -> Result<Vec<String>, DbError> {
        let guard = self.checkout().await?;
        let rows = guard
            .client()?
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = current_schema() ORDER BY table_name",
                &[],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn exists(&self, collection: &str) -> Result<bool, DbError> {
        let guard = self.checkout().await?;
        let row = guard
            .client()?
            .query_one(
                "SELECT to_regclass($1::text) IS NOT NULL",
                &[&quote_ident(collection)],
            )
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn primary_key(&self, collection: &str) -> Result<Option<String>, DbError> {
        if let Some(cached) = self
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
        {
            return Ok(cached.clone());
        }
        let guard = self.checkout().await?;
        let rows = guard
            .client()?
            .query(
                "SELECT a.attname::text FROM pg_index i \
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
                 WHERE i.indrelid = to_regclass($1::text) AND i.indisprimary",
                &[&quote_ident(collection)],
            )
            .await?;
        // composite keys are never generated
        let key = match rows.as_slice() {
            [single] => Some(single.try_get::<_, String>(0)?),
            _ => None,
        };
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.to_string(), key.clone());
        Ok(key)
    }

    async fn begin_tx(&self) -> Result<Arc<dyn Connection>, DbError> {
        Ok(Arc::new(self.begin().await?))
    }

    async fn commit(&self) -> Result<(), DbError> {
        self.finish("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), DbError> {
        self.finish("ROLLBACK").await
    }

    async fn close(&self) -> Result<(), DbError> {
        if self.is_tx() {
            return match self.finish("ROLLBACK").await {
                Ok(()) | Err(DbError::TransactionDone) => Ok(()),
                Err(e) => Err(e),
            };
        }
        tracing::debug!("closing postgres pool");
        self.forget_keys(None);
        self.pool.close();
        Ok(())
    }

    fn driver(&self) -> &(dyn Any + Send + Sync) {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use deadpool_postgres::Runtime;
    use tokio_postgres::NoTls;

    use super::*;
    use crate::config::ConnectionSettings;
    use crate::postgres::config::pg_config;

    fn unreachable() -> PostgresConnection {
        let settings = ConnectionSettings::new()
            .host("127.0.0.1")
            .port(1)
            .database("d")
            .user("u");
        let pool = pg_config(&settings)
            .unwrap()
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .unwrap();
        PostgresConnection::new(pool)
    }

    fn cached(conn: &PostgresConnection, table: &str) -> bool {
        conn.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(table)
    }

    #[tokio::test]
    async fn failed_statements_forget_the_cached_key() {
        let conn = unreachable();
        {
            let mut keys = conn.keys.lock().unwrap();
            keys.insert("people".into(), Some("id".into()));
            keys.insert("pets".into(), Some("id".into()));
        }
        let select = Statement::new(StatementKind::Select, vec!["people".into()]);
        assert!(conn.execute(select).await.is_err());
        assert!(!cached(&conn, "people"));
        assert!(cached(&conn, "pets"));

        conn.close().await.unwrap();
        assert!(!cached(&conn, "pets"));
    }
}
