use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{Value, ValueMap};

/// Normalized form used for case- and underscore-insensitive column matching.
#[must_use]
pub fn normalize_column(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Column names shared by every row of one statement.
///
/// Holds an index cache so per-row lookups do not repeat string comparisons.
#[derive(Debug, Clone)]
pub struct Columns {
    names: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
}

impl Columns {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect::<HashMap<_, _>>();
        Self {
            names: Arc::new(names),
            index: Arc::new(index),
        }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Exact match first, then case/underscore-insensitive.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        if let Some(&idx) = self.index.get(name) {
            return Some(idx);
        }
        let wanted = normalize_column(name);
        self.names
            .iter()
            .position(|col| normalize_column(col) == wanted)
    }
}

/// A row returned by a backend.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Columns,
    values: Vec<Value>,
}

impl Row {
    /// Create a row; `values` must line up with `columns`.
    #[must_use]
    pub fn new(columns: Columns, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Build a row from ordered column/value pairs.
    #[must_use]
    pub fn from_pairs(pairs: Vec<(String, Value)>) -> Self {
        let (names, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self::new(Columns::new(names), values)
    }

    /// Build a row from a map; columns come out in key order.
    #[must_use]
    pub fn from_map(map: ValueMap) -> Self {
        Self::from_pairs(map.into_iter().collect())
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        self.columns.names()
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get a value by column name (exact, then case/underscore-insensitive).
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .position(column)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Iterate column/value pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    #[must_use]
    pub fn into_map(self) -> ValueMap {
        self.columns
            .names()
            .iter()
            .cloned()
            .zip(self.values)
            .collect()
    }
}
