//! # Connection Facade
//!
//! The entry point template code uses to run queries and calls on one
//! logical connection.

use super::call_binder::CallBinder;
use super::driver::DbConnection;
use super::query_runner::QueryRunner;
use crate::error::{DriverResult, SqlResult};
use crate::tabular::{Cell, TabularResult};
use crate::types::{BindValue, TypeCodec};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const HEALTH_CHECK_QUERY: &str = "SELECT 1 AS health";

#[derive(Default)]
struct Helpers {
    query_runner: Option<Arc<QueryRunner>>,
    call_binder: Option<Arc<CallBinder>>,
}

/// Wraps one connection and lazily creates one [`QueryRunner`] and one
/// [`CallBinder`] for it.
pub struct ConnectionFacade {
    connection: Arc<dyn DbConnection>,
    codec: Arc<TypeCodec>,
    helpers: Mutex<Helpers>,
}

impl std::fmt::Debug for ConnectionFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFacade")
            .field("backend", &self.connection.backend())
            .field("closed", &self.connection.is_closed())
            .finish()
    }
}

impl ConnectionFacade {
    pub fn new(connection: Arc<dyn DbConnection>, codec: Arc<TypeCodec>) -> Self {
        Self {
            connection,
            codec,
            helpers: Mutex::new(Helpers::default()),
        }
    }

    pub fn connection(&self) -> &Arc<dyn DbConnection> {
        &self.connection
    }

    pub fn codec(&self) -> &Arc<TypeCodec> {
        &self.codec
    }

    /// The memoized query runner; the same instance on every call
    pub fn query_runner(&self) -> Arc<QueryRunner> {
        let mut helpers = self.helpers.lock();
        helpers
            .query_runner
            .get_or_insert_with(|| {
                debug!(backend = self.connection.backend(), "Creating query runner");
                Arc::new(QueryRunner::new(self.connection.clone(), self.codec.clone()))
            })
            .clone()
    }

    /// The memoized call binder; the same instance on every call
    pub fn call_binder(&self) -> Arc<CallBinder> {
        let mut helpers = self.helpers.lock();
        helpers
            .call_binder
            .get_or_insert_with(|| {
                debug!(backend = self.connection.backend(), "Creating call binder");
                Arc::new(CallBinder::new(self.connection.clone(), self.codec.clone()))
            })
            .clone()
    }

    pub async fn query(&self, sql: &str) -> SqlResult<TabularResult> {
        self.query_runner().execute_query(sql, &[]).await
    }

    pub async fn query_with_binds(&self, sql: &str, binds: &[BindValue]) -> SqlResult<TabularResult> {
        self.query_runner().execute_query(sql, binds).await
    }

    pub async fn call(
        &self,
        call: &str,
        in_binds: &BTreeMap<String, BindValue>,
        out_binds: &BTreeMap<String, String>,
    ) -> SqlResult<BTreeMap<String, Cell>> {
        self.call_binder()
            .execute_call(call, in_binds, out_binds)
            .await
    }

    /// Run a trivial query; `false` when the connection is already closed
    pub async fn health_check(&self) -> SqlResult<bool> {
        if self.connection.is_closed() {
            return Ok(false);
        }
        let result = self.query(HEALTH_CHECK_QUERY).await?;
        Ok(result.get(0, 0).and_then(Cell::as_i64) == Some(1))
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    /// Close the underlying connection and forget the memoized helpers
    pub async fn close(&self) -> DriverResult<()> {
        *self.helpers.lock() = Helpers::default();
        self.connection.close().await?;
        info!(backend = self.connection.backend(), "Connection closed");
        Ok(())
    }
}
