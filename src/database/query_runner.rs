//! # Query Execution
//!
//! Runs a parameterized query on one connection and materializes the cursor
//! into a [`TabularResult`].
//!
//! ```rust
//! use dbtemplate_core::database::memory::{MemoryDatabase, MemoryTable, MemoryValue};
//! use dbtemplate_core::database::QueryRunner;
//! use dbtemplate_core::types::{BindValue, TypeCodec};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let db = MemoryDatabase::new();
//! db.register_query("select name from widgets where id = ?", |binds| {
//!     assert_eq!(binds, &[BindValue::from(7_i64)]);
//!     Ok(MemoryTable::new(&[("NAME", "TEXT")]).row(vec![MemoryValue::scalar("sprocket")]))
//! });
//!
//! let runner = QueryRunner::new(db.connect(), Arc::new(TypeCodec::new()));
//! let result = runner
//!     .execute_query("select name from widgets where id = ?", &[BindValue::from(7_i64)])
//!     .await
//!     .unwrap();
//! assert_eq!(result.cell(0, 0).unwrap().as_str(), Some("sprocket"));
//! # });
//! ```

use super::driver::{DbConnection, PreparedStatement};
use crate::error::{SqlError, SqlResult, StatementKind};
use crate::logging::log_database_operation;
use crate::tabular::TabularResult;
use crate::types::{BindValue, TypeCodec};
use crate::validation::require_statement;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Executes queries on a single connection.
#[derive(Clone)]
pub struct QueryRunner {
    connection: Arc<dyn DbConnection>,
    codec: Arc<TypeCodec>,
}

impl std::fmt::Debug for QueryRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRunner")
            .field("backend", &self.connection.backend())
            .finish()
    }
}

impl QueryRunner {
    pub fn new(connection: Arc<dyn DbConnection>, codec: Arc<TypeCodec>) -> Self {
        Self { connection, codec }
    }

    pub fn connection(&self) -> &Arc<dyn DbConnection> {
        &self.connection
    }

    /// Execute `sql` with positional binds (slice index 0 binds position 1).
    ///
    /// The prepared statement is closed whatever happens; a failed close is
    /// logged and does not affect the returned value.
    pub async fn execute_query(&self, sql: &str, binds: &[BindValue]) -> SqlResult<TabularResult> {
        let sql = require_statement(sql, StatementKind::Query)?;
        let started = Instant::now();

        let mut statement = self
            .connection
            .prepare(sql)
            .await
            .map_err(|e| SqlError::database(sql, e))?;
        debug!(sql = %sql, binds = binds.len(), "Prepared query");

        let outcome = self.bind_and_fetch(statement.as_mut(), sql, binds).await;

        if let Err(e) = statement.close().await {
            warn!(sql = %sql, error = %e, "Failed to close prepared query");
        }

        if let Ok(result) = &outcome {
            log_database_operation(
                "execute_query",
                Some(sql),
                Some(result.row_count()),
                Some(started.elapsed()),
            );
        }
        outcome
    }

    async fn bind_and_fetch(
        &self,
        statement: &mut dyn PreparedStatement,
        sql: &str,
        binds: &[BindValue],
    ) -> SqlResult<TabularResult> {
        for (i, value) in binds.iter().enumerate() {
            statement
                .bind(i + 1, self.codec.normalize_temporal(value.clone()))
                .map_err(|e| SqlError::database(sql, e))?;
        }

        let cursor = statement
            .execute_query()
            .await
            .map_err(|e| SqlError::database(sql, e))?;

        TabularResult::materialize(cursor)
            .await
            .map_err(|e| SqlError::database(sql, e))
    }
}
