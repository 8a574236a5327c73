use std::fmt;
use std::sync::Arc;

use crate::adapter::{Connection, Predicate, Statement, StatementKind};
use crate::condition::Condition;
use crate::error::DbError;
use crate::mapping::{ExtractMode, Record, describe};
use crate::result_set::ResultSet;
use crate::types::{Value, ValueMap};

/// A table or document collection, or a join of several when opened with more than one name.
///
/// Reads address every name; writes go to the first. Collections hold no row data, so a
/// clone is just another handle onto the same backend connection.
#[derive(Clone)]
pub struct Collection {
    conn: Arc<dyn Connection>,
    names: Arc<[String]>,
}

impl Collection {
    pub(crate) fn new(conn: Arc<dyn Connection>, names: Vec<String>) -> Result<Self, DbError> {
        if names.is_empty() || names.iter().any(|n| n.trim().is_empty()) {
            return Err(DbError::ValidationError(
                "collection names must be non-empty".into(),
            ));
        }
        if names.len() > 1 && !conn.capabilities().joins {
            return Err(DbError::UnsupportedFeature(format!(
                "{} cannot join collections",
                conn.backend()
            )));
        }
        Ok(Self {
            conn,
            names: names.into(),
        })
    }

    /// The write target: the first name this collection was opened with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.names[0]
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Insert `record`. When the backend generates a key and the record's key field was
    /// zero, the key is written back into `record`.
    ///
    /// # Errors
    /// Returns `DbError::MappingConflict` for an invalid record type, or the backend failure
    /// wrapped with the collection name.
    pub async fn append<R: Record>(&self, record: &mut R) -> Result<Option<Value>, DbError> {
        let descriptor = describe::<R>()?;
        let payload = descriptor.extract(record, ExtractMode::Write);
        let (key_column, key) = self.insert(payload).await?;

        if let (Some(column), Some(key)) = (key_column, &key) {
            let unset = descriptor
                .value_of(record, &column)
                .is_none_or(|v| v.is_zero());
            if unset {
                descriptor.assign(record, &column, key.clone())?;
            }
        }
        Ok(key)
    }

    /// Insert a plain map of column values.
    ///
    /// # Errors
    /// Returns the backend failure wrapped with the collection name.
    pub async fn append_values(&self, values: ValueMap) -> Result<Option<Value>, DbError> {
        let (_, key) = self.insert(values.into_iter().collect()).await?;
        Ok(key)
    }

    async fn insert(
        &self,
        mut payload: Vec<(String, Value)>,
    ) -> Result<(Option<String>, Option<Value>), DbError> {
        let key_column = self
            .conn
            .primary_key(self.name())
            .await
            .map_err(|e| e.in_statement(self.name(), StatementKind::Insert))?;
        // a zero key asks the backend to generate one
        if let Some(column) = &key_column {
            payload.retain(|(c, v)| c != column || !v.is_zero());
        }
        let key = self
            .write(StatementKind::Insert, Predicate::All, payload)
            .await?
            .into_key()?;
        Ok((key_column, key))
    }

    pub(crate) async fn write(
        &self,
        kind: StatementKind,
        predicate: Predicate,
        payload: Vec<(String, Value)>,
    ) -> Result<crate::adapter::Outcome, DbError> {
        let statement = Statement::new(kind, vec![self.name().to_string()])
            .with_predicate(predicate)
            .with_payload(payload);
        self.conn
            .execute(statement)
            .await
            .map_err(|e| e.in_statement(self.name(), kind))
    }

    /// Rows matching `condition`. Nothing runs until the result set is read.
    #[must_use]
    pub fn find(&self, condition: impl Into<Condition>) -> ResultSet {
        ResultSet::new(
            Arc::clone(&self.conn),
            Arc::clone(&self.names),
            condition.into(),
        )
    }

    /// Every row of the collection.
    #[must_use]
    pub fn find_all(&self) -> ResultSet {
        self.find(Condition::all())
    }

    /// Remove every row. Whether key counters restart is reported by
    /// `Capabilities::truncate_resets_sequence`.
    ///
    /// # Errors
    /// Returns the backend failure wrapped with the collection name.
    pub async fn truncate(&self) -> Result<(), DbError> {
        self.write(StatementKind::Truncate, Predicate::All, Vec::new())
            .await?;
        tracing::debug!(collection = self.name(), "truncated");
        Ok(())
    }

    /// Whether every named collection exists in the backend.
    ///
    /// # Errors
    /// Returns the backend failure.
    pub async fn exists(&self) -> Result<bool, DbError> {
        for name in self.names.iter() {
            if !self.conn.exists(name).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("backend", &self.conn.backend())
            .field("names", &self.names)
            .finish()
    }
}
