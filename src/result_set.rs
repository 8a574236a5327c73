//! Lazy, chainable views over a collection.
//!
//! A [`ResultSet`] starts out `Built`: it only records the condition and query shape. The
//! first `next`/`all`/`one` executes the select and keeps the backend cursor open until the
//! rows run out (`Drained`) or the set is closed. Modifiers never touch an existing cursor;
//! they return a fresh `Built` set, so chaining after iteration started simply runs a new
//! query.

use std::fmt;
use std::sync::Arc;

use crate::adapter::{Connection, Cursor, Predicate, QueryShape, SortKey, Statement, StatementKind};
use crate::condition::{Column, Condition};
use crate::error::DbError;
use crate::mapping::{Container, Destination, ExtractMode, Record, describe};
use crate::results::Row;
use crate::types::{Value, ValueMap};

/// Observable phase of a [`ResultSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Not executed yet; modifiers apply.
    Built,
    /// A backend cursor is live.
    Open,
    /// The cursor reached its end and was released.
    Drained,
    Closed,
}

enum State {
    Built,
    Open(Box<dyn Cursor>),
    Drained,
    Closed,
}

/// Field values for [`ResultSet::update`].
///
/// Maps apply every entry as given, zero values included. Records go through write-mode
/// extraction, so `omitempty` fields holding zero are left alone.
pub trait Changes {
    /// # Errors
    /// Returns `DbError::MappingConflict` if a record type cannot be described.
    fn into_changes(self) -> Result<Vec<(String, Value)>, DbError>;
}

impl Changes for ValueMap {
    fn into_changes(self) -> Result<Vec<(String, Value)>, DbError> {
        Ok(self.into_iter().collect())
    }
}

impl Changes for Vec<(String, Value)> {
    fn into_changes(self) -> Result<Vec<(String, Value)>, DbError> {
        Ok(self)
    }
}

impl<R: Record> Changes for &R {
    fn into_changes(self) -> Result<Vec<(String, Value)>, DbError> {
        Ok(describe::<R>()?.extract(self, ExtractMode::Write))
    }
}

/// A filtered, ordered, paginated query over a collection.
pub struct ResultSet {
    conn: Arc<dyn Connection>,
    target: Arc<[String]>,
    condition: Arc<Condition>,
    shape: QueryShape,
    state: State,
}

impl ResultSet {
    pub(crate) fn new(conn: Arc<dyn Connection>, target: Arc<[String]>, condition: Condition) -> Self {
        Self {
            conn,
            target,
            condition: Arc::new(condition),
            shape: QueryShape::default(),
            state: State::Built,
        }
    }

    fn derive(&self, apply: impl FnOnce(&mut QueryShape)) -> ResultSet {
        let mut shape = self.shape.clone();
        apply(&mut shape);
        ResultSet {
            conn: Arc::clone(&self.conn),
            target: Arc::clone(&self.target),
            condition: Arc::clone(&self.condition),
            shape,
            state: State::Built,
        }
    }

    fn primary(&self) -> &str {
        &self.target[0]
    }

    #[must_use]
    pub fn state(&self) -> CursorState {
        match self.state {
            State::Built => CursorState::Built,
            State::Open(_) => CursorState::Open,
            State::Drained => CursorState::Drained,
            State::Closed => CursorState::Closed,
        }
    }

    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    #[must_use]
    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }

    /// Skip the first `offset` rows.
    #[must_use]
    pub fn skip(&self, offset: u64) -> ResultSet {
        self.derive(|s| s.offset = offset)
    }

    /// Return at most `limit` rows; `0` means unbounded.
    #[must_use]
    pub fn limit(&self, limit: u64) -> ResultSet {
        self.derive(|s| s.limit = limit)
    }

    /// Order by `keys`, each a column optionally prefixed with `-` for descending.
    #[must_use]
    pub fn sort(&self, keys: &[&str]) -> ResultSet {
        self.derive(|s| s.sort = keys.iter().copied().map(SortKey::parse).collect())
    }

    /// Restrict the returned columns. An empty list selects everything.
    #[must_use]
    pub fn select<I, C>(&self, columns: I) -> ResultSet
    where
        I: IntoIterator<Item = C>,
        C: Into<Column>,
    {
        let columns: Vec<Column> = columns.into_iter().map(Into::into).collect();
        self.derive(|s| s.columns = columns)
    }

    /// Narrow the condition with `extra`, joined by AND.
    #[must_use]
    pub fn and_where(&self, extra: impl Into<Condition>) -> ResultSet {
        let condition = (*self.condition).clone().and(extra);
        let mut derived = self.derive(|_| {});
        derived.condition = Arc::new(condition);
        derived
    }

    /// Page size for [`ResultSet::page`]; resets to the first page.
    #[must_use]
    pub fn paginate(&self, size: u64) -> ResultSet {
        self.derive(|s| {
            s.limit = size;
            s.offset = 0;
        })
    }

    /// Jump to page `n`, counting from 1. Without a page size this is the whole result.
    #[must_use]
    pub fn page(&self, n: u64) -> ResultSet {
        self.derive(|s| s.offset = n.saturating_sub(1).saturating_mul(s.limit))
    }

    /// Pages needed to show every matching row at the current page size.
    ///
    /// # Errors
    /// Same as [`ResultSet::count`].
    pub async fn total_pages(&self) -> Result<u64, DbError> {
        let total = self.count().await?;
        Ok(match self.shape.limit {
            0 => u64::from(total > 0),
            size => total.div_ceil(size),
        })
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        match self.state {
            State::Closed => Err(DbError::CursorClosed),
            _ => Ok(()),
        }
    }

    fn predicate(&self) -> Result<Predicate, DbError> {
        self.conn.build_filter(&self.condition)
    }

    async fn run(&self, statement: Statement) -> Result<crate::adapter::Outcome, DbError> {
        let kind = statement.kind;
        self.conn
            .execute(statement)
            .await
            .map_err(|e| e.in_statement(self.primary(), kind))
    }

    async fn open_cursor(&self, shape: QueryShape) -> Result<Box<dyn Cursor>, DbError> {
        let predicate = self
            .predicate()
            .map_err(|e| e.in_statement(self.primary(), StatementKind::Select))?;
        let statement = Statement::new(StatementKind::Select, self.target.to_vec())
            .with_predicate(predicate)
            .with_shape(shape);
        self.run(statement).await?.into_cursor()
    }

    async fn fetch(&mut self) -> Result<Option<Row>, DbError> {
        if let State::Built = self.state {
            let cursor = self.open_cursor(self.shape.clone()).await?;
            self.state = State::Open(cursor);
        }
        let row = match self.state {
            State::Open(ref mut cursor) => cursor.fetch_next().await?,
            State::Drained => return Ok(None),
            State::Built | State::Closed => return Err(DbError::CursorClosed),
        };
        if row.is_none()
            && let State::Open(mut cursor) = std::mem::replace(&mut self.state, State::Drained)
        {
            cursor.close().await?;
        }
        Ok(row)
    }

    /// Populate `dest` from the next row.
    ///
    /// # Errors
    /// Returns `DbError::NoMoreRows` once the rows are exhausted, `DbError::CursorClosed`
    /// after [`ResultSet::close`], or the backend/mapping failure.
    pub async fn next<D: Destination + ?Sized>(&mut self, dest: &mut D) -> Result<(), DbError> {
        self.ensure_open()?;
        match self.fetch().await? {
            Some(row) => dest.assign_row(&row),
            None => Err(DbError::NoMoreRows),
        }
    }

    /// Populate `dest` from the first matching row, then close.
    ///
    /// # Errors
    /// Returns `DbError::NoMoreRows` if nothing matches.
    pub async fn one<D: Destination + ?Sized>(&mut self, dest: &mut D) -> Result<(), DbError> {
        self.ensure_open()?;
        self.close().await?;
        let mut shape = self.shape.clone();
        shape.limit = 1;
        let mut cursor = self.open_cursor(shape).await?;
        let row = cursor.fetch_next().await;
        cursor.close().await?;
        match row? {
            Some(row) => dest.assign_row(&row),
            None => Err(DbError::NoMoreRows),
        }
    }

    /// Materialize every remaining row into `container`, then close.
    ///
    /// # Errors
    /// Returns `DbError::CursorClosed` after close, or the backend/mapping failure.
    pub async fn all<C: Container + ?Sized>(&mut self, container: &mut C) -> Result<(), DbError> {
        self.ensure_open()?;
        container.reset();
        while let Some(row) = self.fetch().await? {
            container.push_row(&row)?;
        }
        self.close().await
    }

    /// Rows matching the condition, ignoring skip and limit.
    ///
    /// # Errors
    /// Returns `DbError::CursorClosed` after close, or the backend failure.
    pub async fn count(&self) -> Result<u64, DbError> {
        self.ensure_open()?;
        let predicate = self
            .predicate()
            .map_err(|e| e.in_statement(self.primary(), StatementKind::Count))?;
        let statement =
            Statement::new(StatementKind::Count, self.target.to_vec()).with_predicate(predicate);
        self.run(statement).await?.into_count()
    }

    /// Apply `changes` to every matching row and return how many were touched.
    ///
    /// # Errors
    /// Returns `DbError::ValidationError` for an empty change set, `DbError::CursorClosed`
    /// after close, or the backend failure.
    pub async fn update(&self, changes: impl Changes) -> Result<u64, DbError> {
        self.ensure_open()?;
        let payload = changes.into_changes()?;
        if payload.is_empty() {
            return Err(DbError::ValidationError("update without changes".into()));
        }
        let predicate = self
            .predicate()
            .map_err(|e| e.in_statement(self.primary(), StatementKind::Update))?;
        let statement = Statement::new(StatementKind::Update, vec![self.primary().to_string()])
            .with_predicate(predicate)
            .with_payload(payload);
        self.run(statement).await?.into_count()
    }

    /// Delete every matching row and return how many were removed.
    ///
    /// # Errors
    /// Returns `DbError::CursorClosed` after close, or the backend failure.
    pub async fn remove(&self) -> Result<u64, DbError> {
        self.ensure_open()?;
        let predicate = self
            .predicate()
            .map_err(|e| e.in_statement(self.primary(), StatementKind::Delete))?;
        let statement = Statement::new(StatementKind::Delete, vec![self.primary().to_string()])
            .with_predicate(predicate);
        self.run(statement).await?.into_count()
    }

    /// Release the backend cursor. Closing twice is a no-op.
    ///
    /// # Errors
    /// Returns the backend failure from closing a live cursor.
    pub async fn close(&mut self) -> Result<(), DbError> {
        if let State::Open(mut cursor) = std::mem::replace(&mut self.state, State::Closed) {
            cursor.close().await?;
        }
        Ok(())
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("backend", &self.conn.backend())
            .field("target", &self.target)
            .field("condition", &self.condition)
            .field("shape", &self.shape)
            .field("state", &self.state())
            .finish()
    }
}
