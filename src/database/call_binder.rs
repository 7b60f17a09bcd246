//! # Stored Procedure Calls
//!
//! Executes a call with positional inputs and outputs described by string
//! keyed bind sets, the shape template code naturally produces:
//!
//! - `in_binds`: `"1" -> value`
//! - `out_binds`: `"2" -> "VARCHAR"` or `"3" -> "ARRAY:SCHEMA.NUM_LIST"`
//!
//! A position may appear in both sets (an INOUT parameter). Every input is
//! bound before any output is registered. Output cursors come back as nested
//! [`TabularResult`](crate::tabular::TabularResult)s and large character
//! objects as text.

use super::driver::{DbConnection, PreparedCall};
use crate::error::{BindDirection, SqlError, SqlResult, StatementKind};
use crate::logging::log_database_operation;
use crate::tabular::materialize::resolve_fetched;
use crate::tabular::Cell;
use crate::types::{BindValue, TypeCodec};
use crate::validation::{parse_bind_index, parse_type_spec, require_statement};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Executes stored procedure calls on a single connection.
#[derive(Clone)]
pub struct CallBinder {
    connection: Arc<dyn DbConnection>,
    codec: Arc<TypeCodec>,
}

impl std::fmt::Debug for CallBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallBinder")
            .field("backend", &self.connection.backend())
            .finish()
    }
}

impl CallBinder {
    pub fn new(connection: Arc<dyn DbConnection>, codec: Arc<TypeCodec>) -> Self {
        Self { connection, codec }
    }

    /// Execute `call` once and collect every registered output.
    ///
    /// The returned map is keyed by the canonical position string, so an out
    /// bind keyed `"01"` comes back as `"1"`. The prepared call is closed
    /// whatever happens.
    pub async fn execute_call(
        &self,
        call: &str,
        in_binds: &BTreeMap<String, BindValue>,
        out_binds: &BTreeMap<String, String>,
    ) -> SqlResult<BTreeMap<String, Cell>> {
        let call = require_statement(call, StatementKind::Call)?;
        let started = Instant::now();

        let mut prepared = self
            .connection
            .prepare_call(call)
            .await
            .map_err(|e| SqlError::database(call, e))?;
        debug!(
            call = %call,
            inputs = in_binds.len(),
            outputs = out_binds.len(),
            "Prepared call"
        );

        let outcome = self
            .run(prepared.as_mut(), call, in_binds, out_binds)
            .await;

        if let Err(e) = prepared.close().await {
            warn!(call = %call, error = %e, "Failed to close prepared call");
        }

        if let Ok(outputs) = &outcome {
            log_database_operation(
                "execute_call",
                Some(call),
                Some(outputs.len()),
                Some(started.elapsed()),
            );
        }
        outcome
    }

    async fn run(
        &self,
        prepared: &mut dyn PreparedCall,
        call: &str,
        in_binds: &BTreeMap<String, BindValue>,
        out_binds: &BTreeMap<String, String>,
    ) -> SqlResult<BTreeMap<String, Cell>> {
        for (key, value) in in_binds {
            let position = parse_bind_index(key, BindDirection::In)?;
            prepared
                .bind(position, self.codec.normalize_temporal(value.clone()))
                .map_err(|e| SqlError::database(call, e))?;
        }

        let mut outputs = Vec::with_capacity(out_binds.len());
        for (key, spec) in out_binds {
            let position = parse_bind_index(key, BindDirection::Out)?;
            let spec = parse_type_spec(spec);
            let type_code =
                self.codec
                    .code_of(spec.sql_type)
                    .map_err(|e| SqlError::UnknownOutputType {
                        position,
                        type_name: spec.sql_type.to_string(),
                        source: Box::new(e),
                    })?;
            prepared
                .register_out(position, type_code, spec.user_type)
                .map_err(|e| SqlError::database(call, e))?;
            if !outputs.contains(&position) {
                outputs.push(position);
            }
        }

        prepared
            .execute()
            .await
            .map_err(|e| SqlError::database(call, e))?;

        let mut results = BTreeMap::new();
        for position in outputs {
            let fetched = prepared
                .take_out(position)
                .map_err(|e| SqlError::database(call, e))?;
            let cell = resolve_fetched(fetched)
                .await
                .map_err(|e| SqlError::database(call, e))?;
            results.insert(position.to_string(), cell);
        }
        Ok(results)
    }
}
