//! # PostgreSQL Backend
//!
//! sqlx-based implementation of the driver SPI over a single `PgConnection`.
//!
//! ## Statement text
//!
//! JDBC-style `?` placeholders are rewritten to `$1, $2, ...` (quoted literals
//! and identifiers are left alone, so text without `?` passes through as is).
//! Call escapes are translated:
//!
//! - `{call p(?, ?)}` becomes `CALL p($1, $2)`
//! - `{? = call f(?)}` becomes `SELECT f($1)`; position 1 is the return value
//!
//! ## Parameters
//!
//! Values are coerced to the parameter types the server inferred when the
//! statement was prepared: text binds are parsed into numeric, boolean,
//! temporal, json and uuid parameters, and scalars bound to text parameters
//! are sent in their display form. A value that cannot be converted fails
//! with `UnsupportedType`. Parameters that are registered as outputs but not
//! bound as inputs are sent as NULL (procedure OUT arguments).
//!
//! ## Results
//!
//! Scalar columns decode through the table of supported types. Arrays of
//! those types, composite values and anonymous records become
//! [`Value::Array`]; enum labels become text. Any other column type is
//! refused with `UnsupportedType`.
//!
//! ## Outputs
//!
//! The single result row of a call is assigned to the registered outputs in
//! ascending position order. `refcursor` values are served as nested cursors
//! fetched with `FETCH FORWARD n` in batches of the configured fetch size and
//! released with `CLOSE`. Because PostgreSQL cursors live only inside a
//! transaction, a statement that returns cursors runs inside `BEGIN` ...
//! `COMMIT`, committed when the statement is closed.
//!
//! A function whose parameter types the server cannot infer may need explicit
//! casts in the call text (`f($1::int)`), and a `?` used as the jsonb
//! operator must be written in the `$n` style.

use super::driver::{
    Clob, Connector, DbConnection, Fetched, OutParameter, PreparedCall, PreparedStatement,
    RowCursor,
};
use crate::config::DatabaseConfig;
use crate::constants::{oracle_types, sql_types};
use crate::error::{DriverError, DriverResult};
use crate::tabular::ColumnDescriptor;
use crate::types::{BindValue, Value};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::types::PgRecordDecoder;
use sqlx::postgres::{
    PgArguments, PgConnectOptions, PgConnection, PgRow, PgTypeInfo, PgTypeKind, PgValueFormat,
};
use sqlx::types::BigDecimal;
use sqlx::{
    Arguments, Column, Connection, Either, Executor, Row, Statement, TypeInfo, ValueRef,
};
use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

struct PgShared {
    conn: Mutex<Option<PgConnection>>,
    closed: AtomicBool,
    fetch_size: u32,
}

/// A driver connection backed by one sqlx `PgConnection`
pub struct PgDbConnection {
    shared: Arc<PgShared>,
}

impl PgDbConnection {
    pub async fn connect(url: &str, fetch_size: u32) -> DriverResult<Self> {
        let conn = PgConnection::connect(url).await?;
        Ok(Self::from_connection(conn, fetch_size))
    }

    pub async fn connect_with(options: &PgConnectOptions, fetch_size: u32) -> DriverResult<Self> {
        let conn = PgConnection::connect_with(options).await?;
        Ok(Self::from_connection(conn, fetch_size))
    }

    pub fn from_connection(conn: PgConnection, fetch_size: u32) -> Self {
        Self {
            shared: Arc::new(PgShared {
                conn: Mutex::new(Some(conn)),
                closed: AtomicBool::new(false),
                fetch_size: fetch_size.max(1),
            }),
        }
    }
}

struct Prepared {
    param_types: Vec<String>,
    columns: Vec<ColumnDescriptor>,
}

async fn describe(shared: &PgShared, sql: &str) -> DriverResult<Prepared> {
    let mut guard = shared.conn.lock().await;
    let conn = guard.as_mut().ok_or(DriverError::ConnectionClosed)?;
    let statement = (&mut *conn).prepare(sql).await?;

    let param_types = match statement.parameters() {
        Some(Either::Left(types)) => types
            .iter()
            .map(|t| t.name().to_ascii_uppercase())
            .collect(),
        Some(Either::Right(count)) => vec![String::new(); count],
        None => Vec::new(),
    };
    let columns = statement
        .columns()
        .iter()
        .map(|c| ColumnDescriptor::new(c.ordinal() + 1, c.name(), c.type_info().name()))
        .collect();

    Ok(Prepared {
        param_types,
        columns,
    })
}

#[async_trait]
impl DbConnection for PgDbConnection {
    async fn prepare(&self, sql: &str) -> DriverResult<Box<dyn PreparedStatement>> {
        let translated = translate_placeholders(sql);
        let prepared = describe(&self.shared, &translated).await?;
        debug!(sql = %translated, params = prepared.param_types.len(), "Prepared PostgreSQL query");

        let needs_transaction = prepared.columns.iter().any(is_cursor_column);
        Ok(Box::new(PgQuery {
            shared: self.shared.clone(),
            sql: translated,
            prepared,
            needs_transaction,
            binds: BTreeMap::new(),
            transaction_open: false,
            closed: false,
        }))
    }

    async fn prepare_call(&self, call: &str) -> DriverResult<Box<dyn PreparedCall>> {
        let translated = translate_call(call)?;
        let prepared = describe(&self.shared, &translated.sql).await?;
        debug!(call = %call, sql = %translated.sql, "Prepared PostgreSQL call");

        Ok(Box::new(PgCall {
            shared: self.shared.clone(),
            translated,
            prepared,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            results: BTreeMap::new(),
            transaction_open: false,
            closed: false,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.shared.closed.store(true, Ordering::Release);
        let conn = self.shared.conn.lock().await.take();
        if let Some(conn) = conn {
            conn.close().await?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

fn is_cursor_column(column: &ColumnDescriptor) -> bool {
    column.type_name.eq_ignore_ascii_case("REFCURSOR")
}

fn is_cursor_type(type_code: i32) -> bool {
    matches!(
        type_code,
        sql_types::REF_CURSOR | sql_types::OTHER | oracle_types::CURSOR
    )
}

async fn run_command(conn: &mut PgConnection, command: &str) -> DriverResult<()> {
    (&mut *conn).execute(sqlx::raw_sql(command)).await?;
    Ok(())
}

/// Commit an open statement-scoped transaction
async fn finish_transaction(shared: &PgShared, open: &mut bool) -> DriverResult<()> {
    if !*open {
        return Ok(());
    }
    *open = false;
    let mut guard = shared.conn.lock().await;
    let conn = guard.as_mut().ok_or(DriverError::ConnectionClosed)?;
    run_command(conn, "COMMIT").await
}

struct PgQuery {
    shared: Arc<PgShared>,
    sql: String,
    prepared: Prepared,
    needs_transaction: bool,
    binds: BTreeMap<usize, BindValue>,
    transaction_open: bool,
    closed: bool,
}

#[async_trait]
impl PreparedStatement for PgQuery {
    fn bind(&mut self, position: usize, value: BindValue) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::StatementClosed);
        }
        check_position(position, self.prepared.param_types.len())?;
        self.binds.insert(position, value);
        Ok(())
    }

    async fn execute_query(&mut self) -> DriverResult<Box<dyn RowCursor>> {
        if self.closed {
            return Err(DriverError::StatementClosed);
        }
        finish_transaction(&self.shared, &mut self.transaction_open).await?;

        let mut args = PgArguments::default();
        for (i, param_type) in self.prepared.param_types.iter().enumerate() {
            let position = i + 1;
            let value = self
                .binds
                .get(&position)
                .ok_or(DriverError::MissingBind(position))?;
            encode_bind(&mut args, value, param_type)?;
        }

        let shared = self.shared.clone();
        let rows = {
            let mut guard = shared.conn.lock().await;
            let conn = guard.as_mut().ok_or(DriverError::ConnectionClosed)?;
            if self.needs_transaction {
                run_command(conn, "BEGIN").await?;
                self.transaction_open = true;
            }
            sqlx::query_with(&self.sql, args).fetch_all(&mut *conn).await?
        };

        let rows = rows
            .iter()
            .map(|row| decode_row(row, &self.shared))
            .collect::<DriverResult<VecDeque<_>>>()?;
        Ok(Box::new(PgBufferedCursor {
            columns: self.prepared.columns.clone(),
            rows,
        }))
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        finish_transaction(&self.shared, &mut self.transaction_open).await
    }
}

fn check_position(position: usize, param_count: usize) -> DriverResult<()> {
    if position == 0 || position > param_count {
        return Err(DriverError::InvalidPosition {
            position,
            reason: format!("statement has {param_count} parameters"),
        });
    }
    Ok(())
}

/// Rows already pulled from the server
struct PgBufferedCursor {
    columns: Vec<ColumnDescriptor>,
    rows: VecDeque<Vec<Fetched>>,
}

#[async_trait]
impl RowCursor for PgBufferedCursor {
    async fn columns(&mut self) -> DriverResult<Vec<ColumnDescriptor>> {
        Ok(self.columns.clone())
    }

    async fn next_row(&mut self) -> DriverResult<Option<Vec<Fetched>>> {
        Ok(self.rows.pop_front())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.rows.clear();
        Ok(())
    }
}

/// A server-side `refcursor`, fetched in batches
struct PgNamedCursor {
    shared: Arc<PgShared>,
    name: String,
    columns: Option<Vec<ColumnDescriptor>>,
    buffer: VecDeque<Vec<Fetched>>,
    exhausted: bool,
    closed: bool,
}

impl PgNamedCursor {
    fn new(shared: Arc<PgShared>, name: String) -> Self {
        Self {
            shared,
            name,
            columns: None,
            buffer: VecDeque::new(),
            exhausted: false,
            closed: false,
        }
    }

    async fn fetch_batch(&mut self) -> DriverResult<()> {
        let fetch_size = self.shared.fetch_size;
        let command = format!("FETCH FORWARD {fetch_size} FROM {}", quote_ident(&self.name));
        let rows = {
            let mut guard = self.shared.conn.lock().await;
            let conn = guard.as_mut().ok_or(DriverError::ConnectionClosed)?;
            (&mut *conn).fetch_all(sqlx::raw_sql(&command)).await?
        };

        if self.columns.is_none() {
            // An empty cursor reports no column metadata.
            self.columns = Some(rows.first().map(row_columns).unwrap_or_default());
        }
        if rows.len() < fetch_size as usize {
            self.exhausted = true;
        }
        for row in &rows {
            self.buffer.push_back(decode_row(row, &self.shared)?);
        }
        debug!(cursor = %self.name, rows = rows.len(), "Fetched cursor batch");
        Ok(())
    }
}

#[async_trait]
impl RowCursor for PgNamedCursor {
    async fn columns(&mut self) -> DriverResult<Vec<ColumnDescriptor>> {
        if self.columns.is_none() && !self.exhausted {
            self.fetch_batch().await?;
        }
        Ok(self.columns.clone().unwrap_or_default())
    }

    async fn next_row(&mut self) -> DriverResult<Option<Vec<Fetched>>> {
        if self.closed {
            return Err(DriverError::Protocol(format!(
                "fetch from closed cursor {}",
                self.name
            )));
        }
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_batch().await?;
        }
        Ok(self.buffer.pop_front())
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buffer.clear();
        let command = format!("CLOSE {}", quote_ident(&self.name));
        let mut guard = self.shared.conn.lock().await;
        let conn = guard.as_mut().ok_or(DriverError::ConnectionClosed)?;
        run_command(conn, &command).await
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

struct PgCall {
    shared: Arc<PgShared>,
    translated: TranslatedCall,
    prepared: Prepared,
    inputs: BTreeMap<usize, BindValue>,
    outputs: BTreeMap<usize, OutParameter>,
    results: BTreeMap<usize, Fetched>,
    transaction_open: bool,
    closed: bool,
}

impl PgCall {
    async fn discard_results(&mut self) {
        for (_, value) in std::mem::take(&mut self.results) {
            if let Fetched::Cursor(mut cursor) = value {
                if let Err(e) = cursor.close().await {
                    warn!(error = %e, "Failed to close unconsumed output cursor");
                }
            }
        }
    }

    fn needs_transaction(&self) -> bool {
        self.prepared.columns.iter().any(is_cursor_column)
            || self.outputs.values().any(|o| is_cursor_type(o.type_code))
    }
}

#[async_trait]
impl PreparedCall for PgCall {
    fn bind(&mut self, position: usize, value: BindValue) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::StatementClosed);
        }
        if self
            .translated
            .sql_index(position, self.prepared.param_types.len())
            .is_none()
        {
            return Err(DriverError::InvalidPosition {
                position,
                reason: "not an argument placeholder of the call".to_string(),
            });
        }
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
        finish_transaction(&self.shared, &mut self.transaction_open).await?;

        let mut args = PgArguments::default();
        for (i, param_type) in self.prepared.param_types.iter().enumerate() {
            let position = self.translated.call_position(i);
            match self.inputs.get(&position) {
                Some(value) => encode_bind(&mut args, value, param_type)?,
                None if self.outputs.contains_key(&position) => {
                    encode_bind(&mut args, &BindValue::Null, param_type)?
                }
                None => return Err(DriverError::MissingBind(position)),
            }
        }

        let needs_transaction = self.needs_transaction();
        let shared = self.shared.clone();
        let row = {
            let mut guard = shared.conn.lock().await;
            let conn = guard.as_mut().ok_or(DriverError::ConnectionClosed)?;
            if needs_transaction {
                run_command(conn, "BEGIN").await?;
                self.transaction_open = true;
            }
            sqlx::query_with(&self.translated.sql, args)
                .fetch_optional(&mut *conn)
                .await?
        };

        let values = match row {
            Some(row) => decode_row(&row, &self.shared)?,
            None => Vec::new(),
        };
        for ((position, parameter), value) in self.outputs.iter().zip(values) {
            let value = match (value, parameter.type_code) {
                (Fetched::Scalar(Value::Text(text)), sql_types::CLOB | sql_types::NCLOB) => {
                    Fetched::Clob(Clob::from_string(text))
                }
                (other, _) => other,
            };
            self.results.insert(*position, value);
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
        finish_transaction(&self.shared, &mut self.transaction_open).await
    }
}

/// Backend SQL for a call text, plus how call positions map onto it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TranslatedCall {
    pub sql: String,
    /// Call position of the first SQL parameter (`$1`)
    pub first_param_position: usize,
}

impl TranslatedCall {
    /// Call position bound to the 0-based SQL parameter `index`
    fn call_position(&self, index: usize) -> usize {
        index + self.first_param_position
    }

    fn sql_index(&self, position: usize, param_count: usize) -> Option<usize> {
        position
            .checked_sub(self.first_param_position)
            .filter(|i| *i < param_count)
    }
}

fn bad_call(call: &str) -> DriverError {
    DriverError::Protocol(format!("unsupported call syntax: {call}"))
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &text[keyword.len()..];
    rest.starts_with(char::is_whitespace).then_some(rest)
}

pub(crate) fn translate_call(call: &str) -> DriverResult<TranslatedCall> {
    let trimmed = call.trim();
    let Some(inner) = trimmed.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
        return Ok(TranslatedCall {
            sql: translate_placeholders(trimmed),
            first_param_position: 1,
        });
    };

    let inner = inner.trim();
    let (body, returns_value) = match inner.strip_prefix('?') {
        Some(rest) => {
            let rest = rest
                .trim_start()
                .strip_prefix('=')
                .ok_or_else(|| bad_call(call))?;
            (rest.trim_start(), true)
        }
        None => (inner, false),
    };

    let target = strip_keyword(body, "call")
        .ok_or_else(|| bad_call(call))?
        .trim();
    if target.is_empty() {
        return Err(bad_call(call));
    }
    let target = if target.contains('(') {
        target.to_string()
    } else {
        format!("{target}()")
    };

    let target = translate_placeholders(&target);
    Ok(if returns_value {
        TranslatedCall {
            sql: format!("SELECT {target}"),
            first_param_position: 2,
        }
    } else {
        TranslatedCall {
            sql: format!("CALL {target}"),
            first_param_position: 1,
        }
    })
}

fn for_each_unquoted(sql: &str, mut f: impl FnMut(char, bool)) {
    let mut quote: Option<char> = None;
    for ch in sql.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                f(ch, true);
            }
            None => {
                if ch == '\'' || ch == '"' {
                    quote = Some(ch);
                }
                f(ch, quote.is_some());
            }
        }
    }
}

/// Rewrite unquoted `?` placeholders to `$n`
pub(crate) fn translate_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut next = 0;
    for_each_unquoted(sql, |ch, quoted| {
        if ch == '?' && !quoted {
            next += 1;
            out.push('$');
            out.push_str(&next.to_string());
        } else {
            out.push(ch);
        }
    });
    out
}

fn encode_error(e: sqlx::error::BoxDynError) -> DriverError {
    DriverError::Sqlx(sqlx::Error::Encode(e))
}

fn decode_error(e: sqlx::error::BoxDynError) -> DriverError {
    DriverError::Sqlx(sqlx::Error::Decode(e))
}

fn conversion_error(value: &Value, target: &str) -> DriverError {
    DriverError::UnsupportedType {
        type_name: value.kind().to_string(),
        context: format!("parameter of type {target}"),
    }
}

/// A bind coerced to the wire type of its parameter
#[derive(Debug, Clone, PartialEq)]
enum PgParam {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(BigDecimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
    Uuid(Uuid),
}

impl PgParam {
    fn add_to(self, args: &mut PgArguments, target: &str) -> DriverResult<()> {
        let result = match self {
            PgParam::Null => return encode_null(args, target),
            PgParam::Bool(v) => args.add(v),
            PgParam::Int2(v) => args.add(v),
            PgParam::Int4(v) => args.add(v),
            PgParam::Int8(v) => args.add(v),
            PgParam::Float4(v) => args.add(v),
            PgParam::Float8(v) => args.add(v),
            PgParam::Numeric(v) => args.add(v),
            PgParam::Text(v) => args.add(v),
            PgParam::Bytes(v) => args.add(v),
            PgParam::Date(v) => args.add(v),
            PgParam::Time(v) => args.add(v),
            PgParam::Timestamp(v) => args.add(v),
            PgParam::TimestampTz(v) => args.add(v),
            PgParam::Json(v) => args.add(v),
            PgParam::Uuid(v) => args.add(v),
        };
        result.map_err(encode_error)
    }
}

/// Encode one bind against the parameter type the server inferred
fn encode_bind(args: &mut PgArguments, value: &BindValue, target: &str) -> DriverResult<()> {
    coerce_bind(value, target)?.add_to(args, target)
}

/// Convert a bind to the wire type of `target`, the upper-cased parameter
/// type name (empty when the server did not report one)
fn coerce_bind(value: &BindValue, target: &str) -> DriverResult<PgParam> {
    let value = match value {
        BindValue::Null => return Ok(PgParam::Null),
        BindValue::Scalar(v) => v,
        BindValue::Temporal(dt) => {
            return Err(DriverError::UnsupportedType {
                type_name: "unclassified date/time".to_string(),
                context: format!("parameter value {dt}"),
            })
        }
    };
    let fail = || conversion_error(value, target);

    Ok(match target {
        "BOOL" => PgParam::Bool(to_bool(value).ok_or_else(fail)?),
        "INT2" => PgParam::Int2(to_i64(value).and_then(|i| i16::try_from(i).ok()).ok_or_else(fail)?),
        "INT4" => PgParam::Int4(to_i64(value).and_then(|i| i32::try_from(i).ok()).ok_or_else(fail)?),
        "INT8" => PgParam::Int8(to_i64(value).ok_or_else(fail)?),
        "FLOAT4" => PgParam::Float4(to_f64(value).ok_or_else(fail)? as f32),
        "FLOAT8" => PgParam::Float8(to_f64(value).ok_or_else(fail)?),
        "NUMERIC" => PgParam::Numeric(to_decimal(value).ok_or_else(fail)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => match value {
            Value::Text(s) => PgParam::Text(s.clone()),
            Value::Array(_) => return Err(fail()),
            other => PgParam::Text(other.to_string()),
        },
        "BYTEA" => match value {
            Value::Bytes(b) => PgParam::Bytes(b.clone()),
            Value::Text(s) => PgParam::Bytes(s.as_bytes().to_vec()),
            _ => return Err(fail()),
        },
        "DATE" => PgParam::Date(to_date(value).ok_or_else(fail)?),
        "TIME" => PgParam::Time(to_time(value).ok_or_else(fail)?),
        "TIMESTAMP" => PgParam::Timestamp(to_timestamp(value).ok_or_else(fail)?),
        "TIMESTAMPTZ" => PgParam::TimestampTz(to_timestamptz(value).ok_or_else(fail)?),
        "JSON" | "JSONB" => PgParam::Json(match value {
            Value::Json(j) => j.clone(),
            Value::Text(s) => serde_json::from_str(s).map_err(|_| fail())?,
            other => serde_json::to_value(other).map_err(|_| fail())?,
        }),
        "UUID" => PgParam::Uuid(match value {
            Value::Uuid(u) => *u,
            Value::Text(s) => Uuid::parse_str(s.trim()).map_err(|_| fail())?,
            _ => return Err(fail()),
        }),
        "" => native_param(value).ok_or_else(fail)?,
        // Enum values travel as their label
        _ => match value {
            Value::Text(s) => PgParam::Text(s.clone()),
            _ => return Err(fail()),
        },
    })
}

/// The parameter a value maps to when the target type is unknown
fn native_param(value: &Value) -> Option<PgParam> {
    Some(match value {
        Value::Bool(b) => PgParam::Bool(*b),
        Value::Int(i) => PgParam::Int8(*i),
        Value::Float(f) => PgParam::Float8(*f),
        Value::Decimal(d) => PgParam::Numeric(d.clone()),
        Value::Text(s) => PgParam::Text(s.clone()),
        Value::Bytes(b) => PgParam::Bytes(b.clone()),
        Value::Date(d) => PgParam::Date(*d),
        Value::Time(t) => PgParam::Time(*t),
        Value::Timestamp(ts) => PgParam::Timestamp(*ts),
        Value::TimestampTz(ts) => PgParam::TimestampTz(*ts),
        Value::Json(j) => PgParam::Json(j.clone()),
        Value::Uuid(u) => PgParam::Uuid(*u),
        Value::Array(_) => return None,
    })
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(0) => Some(false),
        Value::Int(1) => Some(true),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Some(*f as i64),
        Value::Decimal(d) if d.is_integer() => i64::from_str(&d.with_scale(0).to_string()).ok(),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Decimal(d) => d.to_string().parse().ok(),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Int(i) => Some(BigDecimal::from(*i)),
        Value::Float(f) => BigDecimal::from_str(&f.to_string()).ok(),
        Value::Decimal(d) => Some(d.clone()),
        Value::Text(s) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn to_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Timestamp(ts) => Some(ts.date()),
        Value::TimestampTz(ts) => Some(ts.date_naive()),
        Value::Text(s) => NaiveDate::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn to_time(value: &Value) -> Option<NaiveTime> {
    match value {
        Value::Time(t) => Some(*t),
        Value::Timestamp(ts) => Some(ts.time()),
        Value::Text(s) => NaiveTime::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn to_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Some(*ts),
        Value::Date(d) => Some(d.and_time(NaiveTime::MIN)),
        Value::TimestampTz(ts) => Some(ts.naive_utc()),
        Value::Text(s) => parse_timestamp_text(s.trim()),
        _ => None,
    }
}

fn to_timestamptz(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::TimestampTz(ts) => Some(*ts),
        Value::Timestamp(ts) => Some(ts.and_utc()),
        Value::Date(d) => Some(d.and_time(NaiveTime::MIN).and_utc()),
        Value::Text(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| parse_timestamp_text(s).map(|ts| ts.and_utc()))
        }
        _ => None,
    }
}

/// `2024-01-02T03:04:05`, `2024-01-02 03:04:05.123` or a bare date
fn parse_timestamp_text(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::from_str(s)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| NaiveDate::from_str(s).ok().map(|d| d.and_time(NaiveTime::MIN)))
}

fn encode_null(args: &mut PgArguments, target: &str) -> DriverResult<()> {
    let result = match target {
        "BOOL" => args.add(None::<bool>),
        "INT2" => args.add(None::<i16>),
        "INT4" => args.add(None::<i32>),
        "INT8" => args.add(None::<i64>),
        "FLOAT4" => args.add(None::<f32>),
        "FLOAT8" => args.add(None::<f64>),
        "NUMERIC" => args.add(None::<BigDecimal>),
        "BYTEA" => args.add(None::<Vec<u8>>),
        "DATE" => args.add(None::<NaiveDate>),
        "TIME" => args.add(None::<NaiveTime>),
        "TIMESTAMP" => args.add(None::<NaiveDateTime>),
        "TIMESTAMPTZ" => args.add(None::<DateTime<Utc>>),
        "JSON" | "JSONB" => args.add(None::<serde_json::Value>),
        "UUID" => args.add(None::<Uuid>),
        _ => args.add(None::<String>),
    };
    result.map_err(encode_error)
}

fn row_columns(row: &PgRow) -> Vec<ColumnDescriptor> {
    row.columns()
        .iter()
        .map(|c| ColumnDescriptor::new(c.ordinal() + 1, c.name(), c.type_info().name()))
        .collect()
}

fn decode_row(row: &PgRow, shared: &Arc<PgShared>) -> DriverResult<Vec<Fetched>> {
    (0..row.len())
        .map(|index| decode_cell(row, index, shared))
        .collect()
}

fn unsupported_column(type_name: &str, index: usize) -> DriverError {
    DriverError::UnsupportedType {
        type_name: type_name.to_string(),
        context: format!("result column #{}", index + 1),
    }
}

/// Expand `$decode!(rust_type, wrap)` for the scalar type named by `$name`,
/// or evaluate `$otherwise` when the type has no scalar mapping
macro_rules! match_scalar_type {
    ($name:expr, $decode:ident, $otherwise:expr) => {
        match $name {
            "BOOL" => $decode!(bool, Value::Bool),
            "INT2" => $decode!(i16, |v: i16| Value::Int(v.into())),
            "INT4" => $decode!(i32, |v: i32| Value::Int(v.into())),
            "INT8" => $decode!(i64, Value::Int),
            "FLOAT4" => $decode!(f32, |v: f32| Value::Float(v.into())),
            "FLOAT8" => $decode!(f64, Value::Float),
            "NUMERIC" => $decode!(BigDecimal, Value::Decimal),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => $decode!(String, Value::Text),
            "BYTEA" => $decode!(Vec<u8>, Value::Bytes),
            "DATE" => $decode!(NaiveDate, Value::Date),
            "TIME" => $decode!(NaiveTime, Value::Time),
            "TIMESTAMP" => $decode!(NaiveDateTime, Value::Timestamp),
            "TIMESTAMPTZ" => $decode!(DateTime<Utc>, Value::TimestampTz),
            "JSON" | "JSONB" => $decode!(serde_json::Value, Value::Json),
            "UUID" => $decode!(Uuid, Value::Uuid),
            _ => $otherwise,
        }
    };
}

fn decode_cell(row: &PgRow, index: usize, shared: &Arc<PgShared>) -> DriverResult<Fetched> {
    let type_info = row.columns()[index].type_info();
    let type_name = type_info.name().to_ascii_uppercase();

    if type_name == "VOID" {
        return Ok(Fetched::Null);
    }
    if type_name == "REFCURSOR" {
        return Ok(match row.try_get_unchecked::<Option<String>, _>(index)? {
            Some(name) => Fetched::Cursor(Box::new(PgNamedCursor::new(shared.clone(), name))),
            None => Fetched::Null,
        });
    }

    macro_rules! scalar {
        ($ty:ty, $wrap:expr) => {
            row.try_get::<Option<$ty>, _>(index)?.map($wrap)
        };
    }

    let value: Option<Value> = match_scalar_type!(
        type_name.as_str(),
        scalar,
        decode_structured(row, index, type_info, &type_name)?
    );
    Ok(value.map_or(Fetched::Null, Fetched::Scalar))
}

/// Arrays, composites and enums; anything else is refused rather than read
/// as text, because results arrive in the binary wire format
fn decode_structured(
    row: &PgRow,
    index: usize,
    type_info: &PgTypeInfo,
    type_name: &str,
) -> DriverResult<Option<Value>> {
    // Custom types from a plain FETCH are not resolved by the driver
    if type_name == "?" {
        return Err(unsupported_column(type_name, index));
    }
    match type_info.kind() {
        PgTypeKind::Array(element) => {
            decode_array(row, index, &element.name().to_ascii_uppercase(), type_name)
        }
        PgTypeKind::Composite(fields) => {
            let field_types = fields
                .iter()
                .map(|(_, ty)| ty.name().to_ascii_uppercase())
                .collect();
            decode_record(row, index, Some(field_types), type_name)
        }
        PgTypeKind::Simple if type_name == "RECORD" => decode_record(row, index, None, type_name),
        PgTypeKind::Enum(_) => Ok(row
            .try_get_unchecked::<Option<String>, _>(index)?
            .map(Value::Text)),
        PgTypeKind::Domain(base) => {
            let base_name = base.name().to_ascii_uppercase();
            macro_rules! domain {
                ($ty:ty, $wrap:expr) => {
                    row.try_get_unchecked::<Option<$ty>, _>(index)?.map($wrap)
                };
            }
            Ok(match_scalar_type!(
                base_name.as_str(),
                domain,
                return Err(unsupported_column(type_name, index))
            ))
        }
        _ => Err(unsupported_column(type_name, index)),
    }
}

fn decode_array(
    row: &PgRow,
    index: usize,
    element: &str,
    type_name: &str,
) -> DriverResult<Option<Value>> {
    macro_rules! array {
        ($ty:ty, $wrap:expr) => {
            row.try_get::<Option<Vec<Option<$ty>>>, _>(index)?
                .map(|items| Value::Array(items.into_iter().map(|v| v.map($wrap)).collect()))
        };
    }
    Ok(match_scalar_type!(
        element,
        array,
        return Err(unsupported_column(type_name, index))
    ))
}

/// Decode a composite value into an [`Value::Array`] of its fields.
///
/// `field_types` comes from the column's type metadata for named composites;
/// anonymous records carry a type oid per field in the binary format.
fn decode_record(
    row: &PgRow,
    index: usize,
    field_types: Option<Vec<String>>,
    type_name: &str,
) -> DriverResult<Option<Value>> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(None);
    }
    let field_types = match field_types {
        Some(types) => types,
        None if raw.format() == PgValueFormat::Binary => {
            record_field_oids(raw.as_bytes().map_err(decode_error)?)
                .ok_or_else(|| unsupported_column(type_name, index))?
                .into_iter()
                .map(|oid| scalar_name_for_oid(oid).unwrap_or("?").to_string())
                .collect()
        }
        None => return Err(unsupported_column(type_name, index)),
    };

    let mut decoder = PgRecordDecoder::new(raw).map_err(decode_error)?;
    let mut fields = Vec::with_capacity(field_types.len());
    for field_type in &field_types {
        macro_rules! field {
            ($ty:ty, $wrap:expr) => {
                decoder
                    .try_decode::<Option<$ty>>()
                    .map_err(decode_error)?
                    .map($wrap)
            };
        }
        let value: Option<Value> = match_scalar_type!(
            field_type.as_str(),
            field,
            return Err(unsupported_column(type_name, index))
        );
        fields.push(value);
    }
    Ok(Some(Value::Array(fields)))
}

/// Field type oids of a binary record: a field count, then per field an oid,
/// a length (-1 for null) and the payload
fn record_field_oids(bytes: &[u8]) -> Option<Vec<u32>> {
    fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
        let chunk = bytes.get(at..at + 4)?;
        Some(u32::from_be_bytes(chunk.try_into().ok()?))
    }

    let count = read_u32(bytes, 0)? as usize;
    let mut oids = Vec::with_capacity(count.min(1024));
    let mut at = 4;
    for _ in 0..count {
        oids.push(read_u32(bytes, at)?);
        let len = read_u32(bytes, at + 4)? as i32;
        at += 8 + usize::try_from(len).unwrap_or(0);
    }
    Some(oids)
}

fn scalar_name_for_oid(oid: u32) -> Option<&'static str> {
    Some(match oid {
        16 => "BOOL",
        17 => "BYTEA",
        19 => "NAME",
        20 => "INT8",
        21 => "INT2",
        23 => "INT4",
        25 => "TEXT",
        114 => "JSON",
        700 => "FLOAT4",
        701 => "FLOAT8",
        705 => "UNKNOWN",
        1042 => "BPCHAR",
        1043 => "VARCHAR",
        1082 => "DATE",
        1083 => "TIME",
        1114 => "TIMESTAMP",
        1184 => "TIMESTAMPTZ",
        1700 => "NUMERIC",
        2950 => "UUID",
        3802 => "JSONB",
        _ => return None,
    })
}

/// [`Connector`] for PostgreSQL; the zero-argument strategy connects to the
/// configured database url
#[derive(Debug, Clone)]
pub struct PgConnector {
    url: String,
    username: Option<String>,
    password: Option<String>,
    fetch_size: u32,
}

impl PgConnector {
    pub fn new(url: impl Into<String>, fetch_size: u32) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            fetch_size,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            fetch_size: config.fetch_size,
        }
    }

    fn options(&self, url: &str) -> DriverResult<PgConnectOptions> {
        Ok(PgConnectOptions::from_str(url)?)
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect_default(&self) -> DriverResult<Arc<dyn DbConnection>> {
        let mut options = self.options(&self.url)?;
        if let Some(username) = &self.username {
            options = options.username(username);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        let connection = PgDbConnection::connect_with(&options, self.fetch_size).await?;
        Ok(Arc::new(connection))
    }

    async fn connect(
        &self,
        url: &str,
        user: &str,
        password: &str,
    ) -> DriverResult<Arc<dyn DbConnection>> {
        let options = self.options(url)?.username(user).password(password);
        let connection = PgDbConnection::connect_with(&options, self.fetch_size).await?;
        Ok(Arc::new(connection))
    }
}
