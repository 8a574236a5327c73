use std::collections::VecDeque;

use async_trait::async_trait;

use crate::error::DbError;
use crate::results::Row;

use super::Cursor;

/// Cursor over rows already fetched from the backend.
///
/// Drivers that return whole result sets (rusqlite behind `spawn_blocking`, the in-memory
/// store) hand rows out through this.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    rows: VecDeque<Row>,
    closed: bool,
}

impl BufferedCursor {
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into(),
            closed: false,
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

#[async_trait]
impl Cursor for BufferedCursor {
    async fn fetch_next(&mut self) -> Result<Option<Row>, DbError> {
        if self.closed {
            return Err(DbError::CursorClosed);
        }
        Ok(self.rows.pop_front())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.closed = true;
        self.rows.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[tokio::test]
    async fn drains_in_order_then_closes() {
        let rows = (1..=2)
            .map(|i| Row::from_pairs(vec![("id".into(), Value::Int(i))]))
            .collect();
        let mut cursor = BufferedCursor::new(rows);
        assert_eq!(cursor.fetch_next().await.unwrap().unwrap().get("id"), Some(&Value::Int(1)));
        assert_eq!(cursor.remaining(), 1);
        cursor.close().await.unwrap();
        cursor.close().await.unwrap();
        assert!(matches!(cursor.fetch_next().await, Err(DbError::CursorClosed)));
    }
}
