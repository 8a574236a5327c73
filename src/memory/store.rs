use std::collections::BTreeMap;

use crate::adapter::{QueryShape, SortKey};
use crate::condition::{Column, Condition, eval};
use crate::error::DbError;
use crate::results::Row;
use crate::types::{Value, ValueMap};

pub(super) const DEFAULT_DATABASE: &str = "default";

#[derive(Debug, Clone)]
pub(super) struct Table {
    pub(super) rows: Vec<ValueMap>,
    /// `None` once the key space is used up.
    next_id: Option<i64>,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            next_id: Some(1),
        }
    }
}

impl Table {
    /// Which rows `filter` accepts, decided before anything is changed.
    fn matching(&self, filter: &Condition) -> Result<Vec<bool>, DbError> {
        self.rows
            .iter()
            .map(|doc| eval::matches(filter, &Row::from_map(doc.clone())))
            .collect()
    }

    fn holds_key(&self, pk: &str, key: &Value) -> bool {
        self.rows.iter().any(|doc| doc.get(pk) == Some(key))
    }
}

/// Every database of one store; cloned wholesale when a transaction begins.
#[derive(Debug, Clone)]
pub(super) struct Catalog {
    databases: BTreeMap<String, BTreeMap<String, Table>>,
    active: String,
    primary_key: String,
}

impl Catalog {
    pub(super) fn new(active: &str, primary_key: &str) -> Self {
        let mut databases = BTreeMap::new();
        databases.insert(active.to_string(), BTreeMap::new());
        Self {
            databases,
            active: active.to_string(),
            primary_key: primary_key.to_string(),
        }
    }

    pub(super) fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub(super) fn use_database(&mut self, name: &str) {
        self.databases.entry(name.to_string()).or_default();
        self.active = name.to_string();
    }

    fn tables(&self) -> Option<&BTreeMap<String, Table>> {
        self.databases.get(&self.active)
    }

    fn tables_mut(&mut self) -> &mut BTreeMap<String, Table> {
        self.databases.entry(self.active.clone()).or_default()
    }

    pub(super) fn collection_names(&self) -> Vec<String> {
        self.tables()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(super) fn has(&self, collection: &str) -> bool {
        self.tables().is_some_and(|t| t.contains_key(collection))
    }

    pub(super) fn table(&self, collection: &str) -> Option<&Table> {
        self.tables().and_then(|t| t.get(collection))
    }

    pub(super) fn select(
        &self,
        collection: &str,
        filter: &Condition,
        shape: &QueryShape,
    ) -> Result<Vec<Row>, DbError> {
        let Some(table) = self.table(collection) else {
            return Ok(Vec::new());
        };
        let mut hits = Vec::new();
        for doc in &table.rows {
            let row = Row::from_map(doc.clone());
            if eval::matches(filter, &row)? {
                hits.push(row);
            }
        }
        sort_rows(&mut hits, &shape.sort);

        let offset = usize::try_from(shape.offset).unwrap_or(usize::MAX);
        let limit = match shape.limit {
            0 => usize::MAX,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        };
        hits.into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| project(row, &shape.columns))
            .collect()
    }

    pub(super) fn count(&self, collection: &str, filter: &Condition) -> Result<u64, DbError> {
        let Some(table) = self.table(collection) else {
            return Ok(0);
        };
        let mut n = 0u64;
        for doc in &table.rows {
            if eval::matches(filter, &Row::from_map(doc.clone()))? {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Store a document, assigning the next id when the key is absent or zero.
    ///
    /// # Errors
    /// Returns `DbError::ExecutionError` for a key already in use or when no ids are left.
    pub(super) fn insert(
        &mut self,
        collection: &str,
        payload: Vec<(String, Value)>,
    ) -> Result<Value, DbError> {
        let pk = self.primary_key.clone();
        let table = self.tables_mut().entry(collection.to_string()).or_default();
        let mut doc: ValueMap = payload.into_iter().collect();

        let key = match doc.get(&pk) {
            Some(v) if !v.is_zero() => {
                if table.holds_key(&pk, v) {
                    return Err(DbError::ExecutionError(format!(
                        "duplicate key {pk}={v:?} in {collection}"
                    )));
                }
                if let Some(explicit) = v.as_int()
                    && table.next_id.is_some_and(|next| explicit >= next)
                {
                    table.next_id = explicit.checked_add(1);
                }
                v.clone()
            }
            _ => {
                let id = table.next_id.ok_or_else(|| {
                    DbError::ExecutionError(format!("{collection} has run out of {pk} values"))
                })?;
                table.next_id = id.checked_add(1);
                let id = Value::Int(id);
                doc.insert(pk, id.clone());
                id
            }
        };
        table.rows.push(doc);
        Ok(key)
    }

    pub(super) fn update(
        &mut self,
        collection: &str,
        filter: &Condition,
        changes: &[(String, Value)],
    ) -> Result<u64, DbError> {
        let Some(table) = self.tables_mut().get_mut(collection) else {
            return Ok(0);
        };
        let hits = table.matching(filter)?;
        let mut affected = 0u64;
        for (doc, _) in table.rows.iter_mut().zip(&hits).filter(|(_, hit)| **hit) {
            for (column, value) in changes {
                doc.insert(column.clone(), value.clone());
            }
            affected += 1;
        }
        Ok(affected)
    }

    pub(super) fn delete(&mut self, collection: &str, filter: &Condition) -> Result<u64, DbError> {
        let Some(table) = self.tables_mut().get_mut(collection) else {
            return Ok(0);
        };
        let hits = table.matching(filter)?;
        let before = table.rows.len();
        let mut verdicts = hits.into_iter();
        table.rows.retain(|_| !verdicts.next().unwrap_or(false));
        Ok((before - table.rows.len()) as u64)
    }

    pub(super) fn truncate(&mut self, collection: &str) -> u64 {
        match self.tables_mut().get_mut(collection) {
            Some(table) => {
                let removed = table.rows.len() as u64;
                *table = Table::default();
                removed
            }
            None => 0,
        }
    }
}

fn sort_rows(rows: &mut [Row], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    // stable, so ties keep insertion order
    rows.sort_by(|a, b| {
        for key in keys {
            let left = a.get(&key.column).unwrap_or(&Value::Null);
            let right = b.get(&key.column).unwrap_or(&Value::Null);
            let ord = left.sort_cmp(right);
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord.is_ne() {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn project(row: Row, columns: &[Column]) -> Result<Row, DbError> {
    if columns.is_empty() {
        return Ok(row);
    }
    let mut pairs = Vec::with_capacity(columns.len());
    for column in columns {
        let (source, name) = match column {
            Column::Name(name) => (name, name),
            Column::Aliased { column, alias } => (column, alias),
            Column::Raw(_) | Column::Func { .. } => {
                return Err(DbError::UnsupportedExpression(format!(
                    "column expression `{}` cannot be evaluated in memory",
                    column.output_name()
                )));
            }
        };
        let value = row.get(source).cloned().unwrap_or(Value::Null);
        pairs.push((name.clone(), value));
    }
    Ok(Row::from_pairs(pairs))
}
