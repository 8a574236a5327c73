use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use crate::adapter::{Capabilities, Connection, registry};
use crate::collection::Collection;
use crate::config::ConnectionSettings;
use crate::error::{DbError, ErrorKind};

struct SessionInner {
    backend: &'static str,
    conn: Arc<dyn Connection>,
    collections: Mutex<HashMap<Vec<String>, Collection>>,
}

/// A connection to one backend; opens collections and transactions.
///
/// Cloning is cheap and every clone shares the connection.
///
/// ```rust,no_run
/// use dbmux::prelude::*;
///
/// # async fn demo() -> Result<(), DbError> {
/// dbmux::register_builtin();
/// let session = Session::open("sqlite", &ConnectionSettings::for_database("app.db")).await?;
/// let people = session.collection(&["people"])?;
/// let adults = people.find(Cond::new().gte("age", 18)).count().await?;
/// # let _ = adults;
/// session.close().await
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    fn from_connection(conn: Arc<dyn Connection>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                backend: conn.backend(),
                conn,
                collections: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Connect to the backend registered as `backend`.
    ///
    /// # Errors
    /// Returns `DbError::ValidationError` for invalid settings, an unknown backend name, or
    /// settings without host or socket for a backend that needs one, and
    /// `DbError::ConnectionError` wrapping the backend cause when connecting fails.
    pub async fn open(backend: &str, settings: &ConnectionSettings) -> Result<Session, DbError> {
        settings.validate()?;
        let factory = registry::lookup(backend)?;
        if factory.requires_address() {
            settings.require_address(backend)?;
        }
        let conn = factory.connect(settings).await.map_err(|e| match e.kind() {
            ErrorKind::Validation | ErrorKind::Connection => e,
            _ => DbError::connection(backend, e),
        })?;
        tracing::debug!(backend, "session opened");
        Ok(Self::from_connection(conn))
    }

    #[must_use]
    pub fn backend(&self) -> &'static str {
        self.inner.backend
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.inner.conn.capabilities()
    }

    /// Handle onto the collection `names[0]`, joined with the rest when more are given.
    ///
    /// # Errors
    /// Returns `DbError::ValidationError` for an empty name list and
    /// `DbError::UnsupportedFeature` for joins on a backend without them.
    pub fn collection(&self, names: &[&str]) -> Result<Collection, DbError> {
        let key: Vec<String> = names.iter().map(|n| (*n).to_string()).collect();
        let mut cache = self
            .inner
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(found) = cache.get(&key) {
            return Ok(found.clone());
        }
        let collection = Collection::new(Arc::clone(&self.inner.conn), key.clone())?;
        cache.insert(key, collection.clone());
        Ok(collection)
    }

    /// Names of the collections in the active database.
    ///
    /// # Errors
    /// Returns the backend failure.
    pub async fn collections(&self) -> Result<Vec<String>, DbError> {
        self.inner.conn.collections().await
    }

    /// Switch the active database on the same connection.
    ///
    /// # Errors
    /// Returns `DbError::UnsupportedFeature` where the backend cannot switch in place.
    pub async fn use_database(&self, name: &str) -> Result<(), DbError> {
        self.inner.conn.use_database(name).await?;
        self.inner
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!(backend = self.backend(), database = name, "switched database");
        Ok(())
    }

    /// Begin a transaction. The returned [`Tx`] behaves like a session bound to it.
    ///
    /// # Errors
    /// Returns `DbError::UnsupportedFeature` if the backend has no transactions or this
    /// session already is one.
    pub async fn transaction(&self) -> Result<Tx, DbError> {
        if !self.capabilities().transactions {
            return Err(DbError::UnsupportedFeature(format!(
                "{} has no transactions",
                self.backend()
            )));
        }
        let conn = self.inner.conn.begin_tx().await?;
        Ok(Tx {
            session: Session::from_connection(conn),
            done: false,
        })
    }

    /// The backend's own handle, for work this crate does not cover.
    #[must_use]
    pub fn driver(&self) -> &(dyn Any + Send + Sync) {
        self.inner.conn.driver()
    }

    /// [`Session::driver`] downcast to a concrete type.
    #[must_use]
    pub fn driver_as<T: Any>(&self) -> Option<&T> {
        self.driver().downcast_ref::<T>()
    }

    /// Release the connection. Clones of this session become unusable.
    ///
    /// # Errors
    /// Returns the backend failure.
    pub async fn close(&self) -> Result<(), DbError> {
        tracing::debug!(backend = self.backend(), "closing session");
        self.inner.conn.close().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.inner.backend)
            .finish_non_exhaustive()
    }
}

/// A transaction. Derefs to a [`Session`] whose statements run inside it.
///
/// Dropping an unfinished `Tx` rolls it back. Memory and `SQLite` release the connection before
/// `drop` returns; Postgres rolls back in the background on the current tokio runtime.
pub struct Tx {
    session: Session,
    done: bool,
}

impl Tx {
    /// # Errors
    /// Returns `DbError::TransactionDone` if already finished, or the backend failure.
    pub async fn commit(mut self) -> Result<(), DbError> {
        self.done = true;
        self.session.inner.conn.commit().await
    }

    /// # Errors
    /// Returns `DbError::TransactionDone` if already finished, or the backend failure.
    pub async fn rollback(mut self) -> Result<(), DbError> {
        self.done = true;
        self.session.inner.conn.rollback().await
    }
}

impl Deref for Tx {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx")
            .field("backend", &self.session.inner.backend)
            .field("done", &self.done)
            .finish()
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let backend = self.session.backend();
        if self.session.inner.conn.abandon() {
            tracing::warn!(backend, "transaction dropped unfinished; rolled back");
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(backend, "transaction dropped unfinished; rolling back");
                let conn = Arc::clone(&self.session.inner.conn);
                handle.spawn(async move {
                    if let Err(e) = conn.rollback().await {
                        tracing::warn!(backend, error = %e, "background rollback failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(backend, "transaction dropped outside a runtime; not rolled back");
            }
        }
    }
}
