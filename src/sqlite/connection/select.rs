use crate::adapter::{BufferedCursor, Statement};
use crate::error::DbError;
use crate::sql::{Dialect, render};
use crate::sqlite::query::{build_rows, query_count};

use super::SqliteConnection;
use super::core::prepare;

impl SqliteConnection {
    /// Execute a SELECT and buffer its rows.
    ///
    /// # Errors
    /// Returns `DbError` if rendering, preparing or stepping the query fails.
    pub(crate) async fn execute_select(
        &self,
        statement: &Statement,
    ) -> Result<BufferedCursor, DbError> {
        let (sql, params) = prepare(render(Dialect::Sqlite, statement, None)?);
        let rows = self
            .with_connection("select", move |conn| build_rows(conn, &sql, &params))
            .await?;
        Ok(BufferedCursor::new(rows))
    }

    /// Execute a COUNT over the statement's filter.
    ///
    /// # Errors
    /// Returns `DbError` if rendering or executing the query fails.
    pub(crate) async fn execute_count(&self, statement: &Statement) -> Result<u64, DbError> {
        let (sql, params) = prepare(render(Dialect::Sqlite, statement, None)?);
        self.with_connection("count", move |conn| query_count(conn, &sql, &params))
            .await
    }
}
