//! Error types for dbtemplate-core.
//!
//! Errors are layered: [`DriverError`] is what a backend reports,
//! [`SqlError`] covers query/call execution and result access,
//! [`TemplateSourceError`] wraps data-access failures with the template being
//! resolved or loaded, and [`DbTemplateError`] aggregates all of them.

use crate::config::ConfigurationError;
use std::fmt;
use thiserror::Error;

/// Failures reported by a database backend.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Connection is closed")]
    ConnectionClosed,
    #[error("Statement is closed")]
    StatementClosed,
    #[error("No value bound for parameter #{0}")]
    MissingBind(usize),
    #[error("Invalid parameter position #{position}: {reason}")]
    InvalidPosition { position: usize, reason: String },
    #[error("Out parameter #{0} was not registered")]
    OutParameterNotRegistered(usize),
    #[error("Out parameter #{0} has already been consumed or was never produced")]
    OutParameterUnavailable(usize),
    #[error("Unsupported type {type_name} for {context}")]
    UnsupportedType { type_name: String, context: String },
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Kind of statement text being validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Call,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatementKind::Query => write!(f, "query"),
            StatementKind::Call => write!(f, "call"),
        }
    }
}

/// Direction of a positional bind variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindDirection {
    In,
    Out,
}

impl fmt::Display for BindDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindDirection::In => write!(f, "in"),
            BindDirection::Out => write!(f, "out"),
        }
    }
}

/// Query/call execution and result access failures.
#[derive(Debug, Error)]
pub enum SqlError {
    #[error("Unable to execute empty {0}")]
    EmptyStatement(StatementKind),
    #[error("Wrong {direction} bind variable index: expected positive int, got {key:?}")]
    BadBindIndex { direction: BindDirection, key: String },
    #[error("Unknown SQL type of out bind variable #{position}: {type_name}")]
    UnknownOutputType {
        position: usize,
        type_name: String,
        #[source]
        source: Box<SqlError>,
    },
    #[error("Unknown SQL type {name}: {reason}")]
    UnknownType { name: String, reason: String },
    #[error("No column labeled {0:?}")]
    UnknownColumn(String),
    #[error("Cell ({row}, {column}) is out of range for a {row_count}x{column_count} result")]
    IndexOutOfRange {
        row: usize,
        column: usize,
        row_count: usize,
        column_count: usize,
    },
    #[error("{statement}: {source}")]
    Database {
        statement: String,
        #[source]
        source: DriverError,
    },
}

impl SqlError {
    /// Attach the failing statement text to a backend error
    pub fn database(statement: &str, source: DriverError) -> Self {
        SqlError::Database {
            statement: statement.trim().to_string(),
            source,
        }
    }
}

pub type SqlResult<T> = std::result::Result<T, SqlError>;

/// Template source protocol failures, each carrying the template it concerns.
#[derive(Debug, Error)]
pub enum TemplateSourceError {
    #[error("Unable to find template named {name}: {source}")]
    SourceResolution {
        name: String,
        #[source]
        source: DriverError,
    },
    #[error("Unable to load template from {locator}: {source}")]
    SourceLoad {
        locator: String,
        #[source]
        source: DriverError,
    },
    #[error("Unable to check timestamp for template container {locator}: {source}")]
    FreshnessCheck {
        locator: String,
        #[source]
        source: DriverError,
    },
}

pub type TemplateSourceResult<T> = std::result::Result<T, TemplateSourceError>;

/// Top-level error for callers that do not care which layer failed.
#[derive(Debug, Error)]
pub enum DbTemplateError {
    #[error(transparent)]
    Sql(#[from] SqlError),
    #[error(transparent)]
    TemplateSource(#[from] TemplateSourceError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type Result<T> = std::result::Result<T, DbTemplateError>;
