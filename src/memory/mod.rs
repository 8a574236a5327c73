//! In-process document store.
//!
//! Collections are created on first insert and documents are plain [`ValueMap`]s, so any
//! record shape fits. Filters run through the reference evaluator, which makes this backend
//! the baseline the SQL adapters are checked against. A transaction works on a snapshot of
//! the whole store that replaces it on commit.
//!
//! Options: `primary_key` (default `id`) names the generated key column.

mod store;

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::adapter::{
    Backend, BufferedCursor, Capabilities, Connection, Outcome, Predicate, Statement,
    StatementKind, registry,
};
use crate::condition::Condition;
use crate::config::ConnectionSettings;
use crate::error::DbError;
use crate::types::ValueMap;

use store::{Catalog, DEFAULT_DATABASE};

pub const BACKEND_NAME: &str = "memory";

/// Register the memory backend under `"memory"`.
pub fn register() {
    registry::register(Arc::new(MemoryBackend));
}

/// Factory for [`MemoryConnection`]s. Every `connect` creates a fresh, empty store.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackend;

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Connection>, DbError> {
        let database = settings.database.as_deref().unwrap_or(DEFAULT_DATABASE);
        let primary_key = settings.get_option("primary_key").unwrap_or("id");
        tracing::debug!(database, primary_key, "opened memory store");
        Ok(Arc::new(MemoryConnection::open(database, primary_key)))
    }
}

/// The shared state behind every handle of one store; what `driver()` exposes.
#[derive(Debug)]
pub struct MemoryStore {
    catalog: Mutex<Catalog>,
    tx_open: AtomicBool,
    closed: AtomicBool,
}

impl MemoryStore {
    fn catalog(&self) -> MutexGuard<'_, Catalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Committed documents of `collection` in the active database.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<ValueMap> {
        self.catalog()
            .table(collection)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
enum Mode {
    Direct,
    /// Working copy of the catalog; `None` once committed or rolled back.
    Tx(Mutex<Option<Catalog>>),
}

/// A handle on a memory store, either direct or inside a transaction.
#[derive(Debug)]
pub struct MemoryConnection {
    store: Arc<MemoryStore>,
    mode: Mode,
}

impl MemoryConnection {
    #[must_use]
    pub fn open(database: &str, primary_key: &str) -> Self {
        Self {
            store: Arc::new(MemoryStore {
                catalog: Mutex::new(Catalog::new(database, primary_key)),
                tx_open: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
            mode: Mode::Direct,
        }
    }

    fn with_catalog<R>(&self, f: impl FnOnce(&mut Catalog) -> Result<R, DbError>) -> Result<R, DbError> {
        if self.store.closed.load(Ordering::Acquire) {
            return Err(DbError::ConnectionError {
                backend: BACKEND_NAME.to_string(),
                message: "connection is closed".to_string(),
                source: None,
            });
        }
        match &self.mode {
            Mode::Direct => {
                if self.store.tx_open.load(Ordering::Acquire) {
                    return Err(DbError::ExecutionError(
                        "memory transaction in progress; operation not permitted outside it"
                            .to_string(),
                    ));
                }
                f(&mut self.store.catalog())
            }
            Mode::Tx(working) => {
                let mut working = working.lock().unwrap_or_else(PoisonError::into_inner);
                match working.as_mut() {
                    Some(catalog) => f(catalog),
                    None => Err(DbError::TransactionDone),
                }
            }
        }
    }

    fn finish(&self, commit: bool) -> Result<(), DbError> {
        let Mode::Tx(working) = &self.mode else {
            return Err(DbError::ValidationError(
                "no transaction is open on this connection".to_string(),
            ));
        };
        let taken = working
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(DbError::TransactionDone)?;
        if commit {
            *self.store.catalog() = taken;
        }
        self.store.tx_open.store(false, Ordering::Release);
        tracing::debug!(commit, "memory transaction finished");
        Ok(())
    }
}

fn tree(predicate: Predicate) -> Result<Condition, DbError> {
    match predicate {
        Predicate::All => Ok(Condition::all()),
        Predicate::Tree(condition) => Ok(condition),
        Predicate::Sql { .. } => Err(DbError::ExecutionError(
            "memory backend cannot run SQL predicates".to_string(),
        )),
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn backend(&self) -> &'static str {
        BACKEND_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            transactions: true,
            truncate_resets_sequence: true,
            raw_expressions: false,
            joins: false,
            change_database: true,
        }
    }

    fn build_filter(&self, condition: &Condition) -> Result<Predicate, DbError> {
        reject_opaque(condition)?;
        if condition.is_empty() {
            Ok(Predicate::All)
        } else {
            Ok(Predicate::Tree(condition.clone()))
        }
    }

    async fn execute(&self, statement: Statement) -> Result<Outcome, DbError> {
        if statement.target.len() > 1 {
            return Err(DbError::UnsupportedFeature(format!(
                "memory backend cannot join collections {:?}",
                statement.target
            )));
        }
        let collection = statement.primary().to_string();
        let kind = statement.kind;
        tracing::debug!(%kind, collection = %collection, "memory statement");
        let filter = tree(statement.predicate)?;
        let shape = statement.shape;
        let payload = statement.payload;

        self.with_catalog(|catalog| match kind {
            StatementKind::Select => {
                let rows = catalog.select(&collection, &filter, &shape)?;
                Ok(Outcome::Rows(Box::new(BufferedCursor::new(rows))))
            }
            StatementKind::Count => Ok(Outcome::Count(catalog.count(&collection, &filter)?)),
            StatementKind::Insert => {
                Ok(Outcome::Inserted(Some(catalog.insert(&collection, payload)?)))
            }
            StatementKind::Update => {
                Ok(Outcome::Affected(catalog.update(&collection, &filter, &payload)?))
            }
            StatementKind::Delete => Ok(Outcome::Affected(catalog.delete(&collection, &filter)?)),
            StatementKind::Truncate => Ok(Outcome::Affected(catalog.truncate(&collection))),
        })
    }

    async fn collections(&self) -> Result<Vec<String>, DbError> {
        self.with_catalog(|catalog| Ok(catalog.collection_names()))
    }

    async fn exists(&self, collection: &str) -> Result<bool, DbError> {
        self.with_catalog(|catalog| Ok(catalog.has(collection)))
    }

    async fn primary_key(&self, _collection: &str) -> Result<Option<String>, DbError> {
        self.with_catalog(|catalog| Ok(Some(catalog.primary_key().to_string())))
    }

    async fn use_database(&self, name: &str) -> Result<(), DbError> {
        self.with_catalog(|catalog| {
            catalog.use_database(name);
            Ok(())
        })
    }

    async fn begin_tx(&self) -> Result<Arc<dyn Connection>, DbError> {
        if matches!(self.mode, Mode::Tx(_)) {
            return Err(DbError::UnsupportedFeature(
                "nested transactions are not supported".to_string(),
            ));
        }
        let snapshot = self.with_catalog(|catalog| Ok(catalog.clone()))?;
        if self
            .store
            .tx_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DbError::ExecutionError(
                "memory transaction already in progress".to_string(),
            ));
        }
        tracing::debug!("memory transaction started");
        Ok(Arc::new(MemoryConnection {
            store: Arc::clone(&self.store),
            mode: Mode::Tx(Mutex::new(Some(snapshot))),
        }))
    }

    async fn commit(&self) -> Result<(), DbError> {
        self.finish(true)
    }

    async fn rollback(&self) -> Result<(), DbError> {
        self.finish(false)
    }

    async fn close(&self) -> Result<(), DbError> {
        match self.mode {
            Mode::Direct => {
                self.store.closed.store(true, Ordering::Release);
                Ok(())
            }
            // closing a transaction handle abandons the unit of work
            Mode::Tx(_) => match self.finish(false) {
                Ok(()) | Err(DbError::TransactionDone) => Ok(()),
                Err(e) => Err(e),
            },
        }
    }

    fn abandon(&self) -> bool {
        match self.finish(false) {
            Ok(()) | Err(DbError::TransactionDone) => true,
            Err(_) => false,
        }
    }

    fn driver(&self) -> &(dyn Any + Send + Sync) {
        self.store.as_ref()
    }
}

fn reject_opaque(condition: &Condition) -> Result<(), DbError> {
    match condition {
        Condition::Cond(_) => Ok(()),
        Condition::And(children) | Condition::Or(children) => {
            children.iter().try_for_each(reject_opaque)
        }
        Condition::Raw(raw) => Err(DbError::UnsupportedExpression(format!(
            "memory backend cannot express raw fragment {:?}",
            raw.fragment
        ))),
        Condition::Func(func) => Err(DbError::UnsupportedExpression(format!(
            "memory backend cannot express function {}",
            func.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Cond, raw};
    use crate::types::Value;

    fn insert(name: &str) -> Statement {
        Statement::new(StatementKind::Insert, vec!["people".into()])
            .with_payload(vec![("name".into(), Value::from(name))])
    }

    #[tokio::test]
    async fn raw_conditions_are_rejected_at_build_time() {
        let conn = MemoryConnection::open("t", "id");
        let err = conn.build_filter(&raw("1 = 1", vec![])).unwrap_err();
        assert!(matches!(err, DbError::UnsupportedExpression(_)));
        assert_eq!(conn.build_filter(&Cond::new().into()).unwrap(), Predicate::All);
    }

    #[tokio::test]
    async fn parent_is_blocked_while_tx_open() {
        let conn = MemoryConnection::open("t", "id");
        let tx = conn.begin_tx().await.unwrap();
        tx.execute(insert("A")).await.unwrap();
        assert!(matches!(
            conn.execute(insert("B")).await,
            Err(DbError::ExecutionError(_))
        ));
        tx.rollback().await.unwrap();
        assert!(matches!(tx.commit().await, Err(DbError::TransactionDone)));
        assert!(!conn.exists("people").await.unwrap());
    }

    #[tokio::test]
    async fn commit_publishes_snapshot() {
        let conn = MemoryConnection::open("t", "id");
        let tx = conn.begin_tx().await.unwrap();
        tx.execute(insert("A")).await.unwrap();
        tx.commit().await.unwrap();
        let store = conn.driver().downcast_ref::<MemoryStore>().unwrap();
        assert_eq!(store.documents("people").len(), 1);
    }

    #[tokio::test]
    async fn abandoned_tx_frees_the_parent_at_once() {
        let conn = MemoryConnection::open("t", "id");
        let tx = conn.begin_tx().await.unwrap();
        tx.execute(insert("A")).await.unwrap();
        assert!(tx.abandon());
        assert!(!conn.exists("people").await.unwrap());
        assert!(!conn.abandon());
    }

    #[tokio::test]
    async fn joins_are_unsupported() {
        let conn = MemoryConnection::open("t", "id");
        let stmt = Statement::new(StatementKind::Select, vec!["a".into(), "b".into()]);
        assert!(matches!(
            conn.execute(stmt).await,
            Err(DbError::UnsupportedFeature(_))
        ));
    }
}
