//! # Database Operations
//!
//! Execution of ad-hoc queries and stored-procedure calls over a single
//! connection, plus the connection plumbing around them.
//!
//! ## Key Components
//!
//! - [`driver`] - backend SPI (connections, statements, calls, cursors)
//! - [`postgres`] - sqlx backend
//! - [`memory`] - scriptable in-process backend
//! - [`QueryRunner`] - positional-bind query into a [`TabularResult`](crate::tabular::TabularResult)
//! - [`CallBinder`] - stored-procedure call with keyed in/out parameter maps
//! - [`ConnectionFacade`] - one connection with its runner and binder
//! - [`ConnectionRegistry`] - default-connection slot and fresh connections
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use dbtemplate_core::config::DatabaseConfig;
//! use dbtemplate_core::database::{ConnectionRegistry, PgConnector};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ConnectionRegistry::new(Arc::new(PgConnector::from_config(&DatabaseConfig::default())));
//! let db = registry.default_connection().await?;
//! let result = db.query("SELECT name FROM templates").await?;
//! println!("{}", result.render_as_text());
//! # Ok(())
//! # }
//! ```

pub mod call_binder;
pub mod connection;
pub mod driver;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query_runner;
pub mod registry;

pub use call_binder::CallBinder;
pub use connection::ConnectionFacade;
pub use driver::{Clob, Connector, DbConnection, Fetched, PreparedCall, PreparedStatement, RowCursor};
pub use memory::{MemoryConnector, MemoryDatabase};
#[cfg(feature = "postgres")]
pub use postgres::{PgConnector, PgDbConnection};
pub use query_runner::QueryRunner;
pub use registry::ConnectionRegistry;
