//! # Driver SPI
//!
//! The seam between the execution layer (query runner, call binder, template
//! source) and a concrete database backend. A backend provides connections
//! that prepare statements and calls; executing a statement yields a
//! forward-only [`RowCursor`]; executing a call makes registered out
//! parameters available through [`PreparedCall::take_out`].
//!
//! Positions are 1-based throughout, matching the call text placeholders.

use crate::error::DriverResult;
use crate::tabular::ColumnDescriptor;
use crate::types::{BindValue, Value};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

/// A large character object, readable once as a stream.
pub struct Clob {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    length: Option<u64>,
}

impl Clob {
    /// Wrap text that is already in memory
    pub fn from_string(text: impl Into<String>) -> Self {
        let bytes = text.into().into_bytes();
        let length = Some(bytes.len() as u64);
        Self {
            reader: Box::new(std::io::Cursor::new(bytes)),
            length,
        }
    }

    /// Wrap an arbitrary UTF-8 byte stream
    pub fn from_reader(reader: Box<dyn AsyncRead + Send + Unpin>, length: Option<u64>) -> Self {
        Self { reader, length }
    }

    /// Byte length, when the backend knows it up front
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    pub fn into_reader(self) -> Box<dyn AsyncRead + Send + Unpin> {
        self.reader
    }

    /// Drain the stream into a string
    pub async fn read_to_string(mut self) -> std::io::Result<String> {
        let mut text = String::new();
        self.reader.read_to_string(&mut text).await?;
        Ok(text)
    }
}

impl fmt::Debug for Clob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clob").field("length", &self.length).finish()
    }
}

/// A raw value as produced by a backend, before materialization.
pub enum Fetched {
    Null,
    Scalar(Value),
    Cursor(Box<dyn RowCursor>),
    Clob(Clob),
}

impl fmt::Debug for Fetched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fetched::Null => f.write_str("Null"),
            Fetched::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            Fetched::Cursor(_) => f.write_str("Cursor(..)"),
            Fetched::Clob(c) => f.debug_tuple("Clob").field(c).finish(),
        }
    }
}

impl From<Value> for Fetched {
    fn from(v: Value) -> Self {
        Fetched::Scalar(v)
    }
}

/// Registration of an out parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutParameter {
    pub type_code: i32,
    pub user_type: Option<String>,
}

/// A live, forward-only result cursor, consumed exactly once.
#[async_trait]
pub trait RowCursor: Send {
    /// Column metadata in positional order
    async fn columns(&mut self) -> DriverResult<Vec<ColumnDescriptor>>;

    /// Advance to the next row; `None` once the cursor is exhausted
    async fn next_row(&mut self) -> DriverResult<Option<Vec<Fetched>>>;

    /// Release the server-side resources held by the cursor
    async fn close(&mut self) -> DriverResult<()>;
}

/// A prepared query with positional inputs.
#[async_trait]
pub trait PreparedStatement: Send {
    fn bind(&mut self, position: usize, value: BindValue) -> DriverResult<()>;

    async fn execute_query(&mut self) -> DriverResult<Box<dyn RowCursor>>;

    async fn close(&mut self) -> DriverResult<()>;
}

/// A prepared stored-procedure call with positional inputs and outputs.
///
/// Callers bind every input, then register every output, then execute, then
/// take outputs. A handle may be executed again after re-binding; registered
/// outputs persist across executions, produced values do not.
#[async_trait]
pub trait PreparedCall: Send {
    fn bind(&mut self, position: usize, value: BindValue) -> DriverResult<()>;

    fn register_out(
        &mut self,
        position: usize,
        type_code: i32,
        user_type: Option<&str>,
    ) -> DriverResult<()>;

    async fn execute(&mut self) -> DriverResult<()>;

    /// Move the value produced for an out parameter out of the handle
    fn take_out(&mut self, position: usize) -> DriverResult<Fetched>;

    async fn close(&mut self) -> DriverResult<()>;
}

/// A single logical database connection.
#[async_trait]
pub trait DbConnection: Send + Sync {
    async fn prepare(&self, sql: &str) -> DriverResult<Box<dyn PreparedStatement>>;

    async fn prepare_call(&self, call: &str) -> DriverResult<Box<dyn PreparedCall>>;

    async fn close(&self) -> DriverResult<()>;

    fn is_closed(&self) -> bool;

    /// Backend name for diagnostics
    fn backend(&self) -> &'static str;
}

/// Backend-specific connection strategies.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The zero-argument strategy used for the default connection
    async fn connect_default(&self) -> DriverResult<Arc<dyn DbConnection>>;

    async fn connect(
        &self,
        url: &str,
        user: &str,
        password: &str,
    ) -> DriverResult<Arc<dyn DbConnection>>;
}
