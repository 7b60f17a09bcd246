//! # In-Memory Backend
//!
//! A scriptable, in-process implementation of the driver SPI. Queries and
//! procedures are registered as closures keyed by their statement text
//! (whitespace-insensitive); everything a real server would observe - bound
//! values, the order of bind/register/execute operations, prepared and closed
//! statements, open cursors - is recorded so callers can assert on it.
//!
//! Like a strict driver it rejects unclassified temporal binds and inputs
//! bound after output registration.
//!
//! ```rust
//! use dbtemplate_core::database::memory::{MemoryDatabase, MemoryTable, MemoryValue};
//!
//! let db = MemoryDatabase::new();
//! db.register_query("select id, name from widgets", |_binds| {
//!     Ok(MemoryTable::new(&[("ID", "INT8"), ("NAME", "TEXT")])
//!         .row(vec![MemoryValue::scalar(1_i64), MemoryValue::scalar("sprocket")]))
//! });
//! let connection = db.connect();
//! # let _ = connection;
//! ```

use super::driver::{
    Clob, Connector, DbConnection, Fetched, OutParameter, PreparedCall, PreparedStatement,
    RowCursor,
};
use crate::constants::sql_types;
use crate::error::{DriverError, DriverResult};
use crate::tabular::ColumnDescriptor;
use crate::types::{BindValue, Value};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A value a scripted handler can produce
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryValue {
    Null,
    Scalar(Value),
    /// Served to the caller as a nested cursor
    Table(MemoryTable),
    /// Served to the caller as a large character object
    Clob(String),
    /// Makes the cursor fail when this row is fetched
    FetchError(String),
}

impl MemoryValue {
    pub fn scalar(v: impl Into<Value>) -> Self {
        MemoryValue::Scalar(v.into())
    }

    pub fn clob(text: impl Into<String>) -> Self {
        MemoryValue::Clob(text.into())
    }
}

impl From<Value> for MemoryValue {
    fn from(v: Value) -> Self {
        MemoryValue::Scalar(v)
    }
}

impl From<MemoryTable> for MemoryValue {
    fn from(t: MemoryTable) -> Self {
        MemoryValue::Table(t)
    }
}

/// A scripted result set
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemoryTable {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<MemoryValue>>,
}

impl MemoryTable {
    /// Columns from `(name, native type)` pairs
    pub fn new(columns: &[(&str, &str)]) -> Self {
        Self::with_descriptors(
            columns
                .iter()
                .enumerate()
                .map(|(i, (name, type_name))| ColumnDescriptor::new(i + 1, *name, *type_name))
                .collect(),
        )
    }

    pub fn with_descriptors(columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, values: Vec<MemoryValue>) -> Self {
        self.rows.push(values);
        self
    }
}

/// What a procedure handler sees when a call executes
#[derive(Debug, Clone, PartialEq)]
pub struct CallInvocation {
    pub call: String,
    pub inputs: BTreeMap<usize, BindValue>,
    pub outputs: BTreeMap<usize, OutParameter>,
}

impl CallInvocation {
    pub fn input(&self, position: usize) -> Option<&BindValue> {
        self.inputs.get(&position)
    }

    pub fn input_str(&self, position: usize) -> Option<&str> {
        self.input(position)
            .and_then(BindValue::as_scalar)
            .and_then(Value::as_str)
    }
}

/// A bound value as seen by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedBind {
    pub statement: String,
    pub position: usize,
    pub value: BindValue,
}

/// One operation applied to a prepared call, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOp {
    Bind(usize),
    Register(usize),
    Execute,
}

/// Counters over the lifetime of a [`MemoryDatabase`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub connections_opened: usize,
    pub statements_prepared: usize,
    pub calls_prepared: usize,
    pub statements_closed: usize,
    pub executions: usize,
    pub open_cursors: usize,
    pub cursors_closed: usize,
}

type QueryHandler = Arc<dyn Fn(&[BindValue]) -> DriverResult<MemoryTable> + Send + Sync>;
type ProcedureHandler =
    Arc<dyn Fn(&CallInvocation) -> DriverResult<BTreeMap<usize, MemoryValue>> + Send + Sync>;

#[derive(Default)]
struct MemoryState {
    queries: HashMap<String, QueryHandler>,
    procedures: HashMap<String, ProcedureHandler>,
    observed_binds: Vec<ObservedBind>,
    call_log: Vec<CallOp>,
    connect_requests: Vec<(String, String)>,
    stats: MemoryStats,
    fail_on_prepare: bool,
    fail_on_close: bool,
}

fn statement_key(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A scriptable database shared by every connection opened from it.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
}

impl std::fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryDatabase")
            .field("queries", &state.queries.len())
            .field("procedures", &state.procedures.len())
            .field("stats", &state.stats)
            .finish()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `sql` with a handler receiving the positional binds (1-based
    /// positions map to slice index + 1)
    pub fn register_query<F>(&self, sql: &str, handler: F)
    where
        F: Fn(&[BindValue]) -> DriverResult<MemoryTable> + Send + Sync + 'static,
    {
        self.state
            .lock()
            .queries
            .insert(statement_key(sql), Arc::new(handler));
    }

    /// Serve a call text with a handler producing values for out positions.
    /// Registered out positions the handler does not produce come back null.
    pub fn register_procedure<F>(&self, call: &str, handler: F)
    where
        F: Fn(&CallInvocation) -> DriverResult<BTreeMap<usize, MemoryValue>>
            + Send
            + Sync
            + 'static,
    {
        self.state
            .lock()
            .procedures
            .insert(statement_key(call), Arc::new(handler));
    }

    pub fn connect(&self) -> Arc<MemoryConnection> {
        self.state.lock().stats.connections_opened += 1;
        Arc::new(MemoryConnection {
            db: self.clone(),
            closed: AtomicBool::new(false),
        })
    }

    /// Make every subsequent prepare fail as if the server rejected it
    pub fn set_fail_on_prepare(&self, fail: bool) {
        self.state.lock().fail_on_prepare = fail;
    }

    /// Make every subsequent statement/cursor close report a failure (after
    /// releasing the resource)
    pub fn set_fail_on_close(&self, fail: bool) {
        self.state.lock().fail_on_close = fail;
    }

    pub fn stats(&self) -> MemoryStats {
        self.state.lock().stats.clone()
    }

    pub fn observed_binds(&self) -> Vec<ObservedBind> {
        self.state.lock().observed_binds.clone()
    }

    pub fn call_log(&self) -> Vec<CallOp> {
        self.state.lock().call_log.clone()
    }

    /// `(url, user)` pairs passed to [`Connector::connect`]
    pub fn connect_requests(&self) -> Vec<(String, String)> {
        self.state.lock().connect_requests.clone()
    }

    pub fn clear_logs(&self) {
        let mut state = self.state.lock();
        state.observed_binds.clear();
        state.call_log.clear();
    }

    fn observe_bind(&self, statement: &str, position: usize, value: &BindValue) {
        self.state.lock().observed_binds.push(ObservedBind {
            statement: statement.to_string(),
            position,
            value: value.clone(),
        });
    }

    fn log_call_op(&self, op: CallOp) {
        self.state.lock().call_log.push(op);
    }

    fn open_cursor(&self, table: MemoryTable) -> MemoryCursor {
        self.state.lock().stats.open_cursors += 1;
        MemoryCursor {
            db: self.clone(),
            table,
            next: 0,
            closed: false,
        }
    }

    fn release(&self, cursor: bool) -> DriverResult<()> {
        let mut state = self.state.lock();
        if cursor {
            state.stats.open_cursors = state.stats.open_cursors.saturating_sub(1);
            state.stats.cursors_closed += 1;
        } else {
            state.stats.statements_closed += 1;
        }
        if state.fail_on_close {
            return Err(DriverError::Database("simulated close failure".to_string()));
        }
        Ok(())
    }

    fn to_fetched(&self, value: MemoryValue) -> DriverResult<Fetched> {
        Ok(match value {
            MemoryValue::Null => Fetched::Null,
            MemoryValue::Scalar(v) => Fetched::Scalar(v),
            MemoryValue::Table(t) => Fetched::Cursor(Box::new(self.open_cursor(t))),
            MemoryValue::Clob(text) => Fetched::Clob(Clob::from_string(text)),
            MemoryValue::FetchError(message) => return Err(DriverError::Database(message)),
        })
    }
}

fn check_bind(position: usize, value: &BindValue) -> DriverResult<()> {
    if position == 0 {
        return Err(DriverError::InvalidPosition {
            position,
            reason: "positions start at 1".to_string(),
        });
    }
    if let BindValue::Temporal(dt) = value {
        return Err(DriverError::UnsupportedType {
            type_name: "unclassified date/time".to_string(),
            context: format!("parameter #{position} ({dt})"),
        });
    }
    Ok(())
}

/// A connection to a [`MemoryDatabase`]
pub struct MemoryConnection {
    db: MemoryDatabase,
    closed: AtomicBool,
}

impl MemoryConnection {
    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::ConnectionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl DbConnection for MemoryConnection {
    async fn prepare(&self, sql: &str) -> DriverResult<Box<dyn PreparedStatement>> {
        self.ensure_open()?;
        let handler = {
            let mut state = self.db.state.lock();
            if state.fail_on_prepare {
                return Err(DriverError::Database("simulated prepare failure".to_string()));
            }
            let handler = state.queries.get(&statement_key(sql)).cloned();
            if handler.is_some() {
                state.stats.statements_prepared += 1;
            }
            handler
        }
        .ok_or_else(|| DriverError::Database(format!("no query registered for: {sql}")))?;

        debug!(sql = %sql, "Prepared in-memory statement");
        Ok(Box::new(MemoryStatement {
            db: self.db.clone(),
            sql: sql.to_string(),
            handler,
            binds: BTreeMap::new(),
            closed: false,
        }))
    }

    async fn prepare_call(&self, call: &str) -> DriverResult<Box<dyn PreparedCall>> {
        self.ensure_open()?;
        let handler = {
            let mut state = self.db.state.lock();
            if state.fail_on_prepare {
                return Err(DriverError::Database("simulated prepare failure".to_string()));
            }
            let handler = state.procedures.get(&statement_key(call)).cloned();
            if handler.is_some() {
                state.stats.calls_prepared += 1;
            }
            handler
        }
        .ok_or_else(|| DriverError::Database(format!("no procedure registered for: {call}")))?;

        debug!(call = %call, "Prepared in-memory call");
        Ok(Box::new(MemoryCall {
            db: self.db.clone(),
            call: call.to_string(),
            handler,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            results: BTreeMap::new(),
            registering: false,
            closed: false,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct MemoryStatement {
    db: MemoryDatabase,
    sql: String,
    handler: QueryHandler,
    binds: BTreeMap<usize, BindValue>,
    closed: bool,
}

#[async_trait]
impl PreparedStatement for MemoryStatement {
    fn bind(&mut self, position: usize, value: BindValue) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::StatementClosed);
        }
        check_bind(position, &value)?;
        self.db.observe_bind(&self.sql, position, &value);
        self.binds.insert(position, value);
        Ok(())
    }

    async fn execute_query(&mut self) -> DriverResult<Box<dyn RowCursor>> {
        if self.closed {
            return Err(DriverError::StatementClosed);
        }
        let mut values = Vec::with_capacity(self.binds.len());
        for (expected, (position, value)) in (1..).zip(&self.binds) {
            if *position != expected {
                return Err(DriverError::MissingBind(expected));
            }
            values.push(value.clone());
        }

        let table = (self.handler)(&values)?;
        self.db.state.lock().stats.executions += 1;
        Ok(Box::new(self.db.open_cursor(table)))
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.db.release(false)
    }
}

struct MemoryCursor {
    db: MemoryDatabase,
    table: MemoryTable,
    next: usize,
    closed: bool,
}

#[async_trait]
impl RowCursor for MemoryCursor {
    async fn columns(&mut self) -> DriverResult<Vec<ColumnDescriptor>> {
        Ok(self.table.columns.clone())
    }

    async fn next_row(&mut self) -> DriverResult<Option<Vec<Fetched>>> {
        if self.closed {
            return Err(DriverError::Protocol("fetch from closed cursor".to_string()));
        }
        let Some(row) = self.table.rows.get(self.next).cloned() else {
            return Ok(None);
        };
        self.next += 1;
        if let Some(MemoryValue::FetchError(message)) =
            row.iter().find(|v| matches!(v, MemoryValue::FetchError(_)))
        {
            return Err(DriverError::Database(message.clone()));
        }
        row.into_iter()
            .map(|value| self.db.to_fetched(value))
            .collect::<DriverResult<Vec<_>>>()
            .map(Some)
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.db.release(true)
    }
}

struct MemoryCall {
    db: MemoryDatabase,
    call: String,
    handler: ProcedureHandler,
    inputs: BTreeMap<usize, BindValue>,
    outputs: BTreeMap<usize, OutParameter>,
    results: BTreeMap<usize, Fetched>,
    registering: bool,
    closed: bool,
}

impl MemoryCall {
    async fn discard_results(&mut self) {
        for (_, value) in std::mem::take(&mut self.results) {
            if let Fetched::Cursor(mut cursor) = value {
                let _ = cursor.close().await;
            }
        }
    }
}

#[async_trait]
impl PreparedCall for MemoryCall {
    fn bind(&mut self, position: usize, value: BindValue) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::StatementClosed);
        }
        if self.registering {
            return Err(DriverError::Protocol(format!(
                "input #{position} bound after out parameters were registered"
            )));
        }
        check_bind(position, &value)?;
        self.db.log_call_op(CallOp::Bind(position));
        self.db.observe_bind(&self.call, position, &value);
        self.inputs.insert(position, value);
        Ok(())
    }

    fn register_out(
        &mut self,
        position: usize,
        type_code: i32,
        user_type: Option<&str>,
    ) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::StatementClosed);
        }
        if position == 0 {
            return Err(DriverError::InvalidPosition {
                position,
                reason: "positions start at 1".to_string(),
            });
        }
        self.registering = true;
        self.db.log_call_op(CallOp::Register(position));
        self.outputs.insert(
            position,
            OutParameter {
                type_code,
                user_type: user_type.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn execute(&mut self) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::StatementClosed);
        }
        self.discard_results().await;
        self.registering = false;
        self.db.log_call_op(CallOp::Execute);

        let invocation = CallInvocation {
            call: self.call.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        };
        let mut produced = (self.handler)(&invocation)?;
        self.db.state.lock().stats.executions += 1;

        for (position, parameter) in &self.outputs {
            let value = produced.remove(position).unwrap_or(MemoryValue::Null);
            let value = match (value, parameter.type_code) {
                (MemoryValue::Scalar(Value::Text(text)), sql_types::CLOB | sql_types::NCLOB) => {
                    MemoryValue::Clob(text)
                }
                (other, _) => other,
            };
            let fetched = self.db.to_fetched(value)?;
            self.results.insert(*position, fetched);
        }
        Ok(())
    }

    fn take_out(&mut self, position: usize) -> DriverResult<Fetched> {
        if !self.outputs.contains_key(&position) {
            return Err(DriverError::OutParameterNotRegistered(position));
        }
        self.results
            .remove(&position)
            .ok_or(DriverError::OutParameterUnavailable(position))
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.discard_results().await;
        self.closed = true;
        self.db.release(false)
    }
}

/// [`Connector`] opening connections to one shared [`MemoryDatabase`]
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    db: MemoryDatabase,
}

impl MemoryConnector {
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect_default(&self) -> DriverResult<Arc<dyn DbConnection>> {
        Ok(self.db.connect())
    }

    async fn connect(
        &self,
        url: &str,
        user: &str,
        _password: &str,
    ) -> DriverResult<Arc<dyn DbConnection>> {
        if url.trim().is_empty() {
            return Err(DriverError::Database("connection url is blank".to_string()));
        }
        self.db
            .state
            .lock()
            .connect_requests
            .push((url.to_string(), user.to_string()));
        Ok(self.db.connect())
    }
}
