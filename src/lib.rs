#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # dbtemplate-core
//!
//! Database-backed template storage and tabular query results for template
//! engines.
//!
//! ## Overview
//!
//! Two pieces that a template engine plugs into:
//!
//! - a **template source** that resolves template names, checks their
//!   modification time and streams their text through stored procedures or
//!   functions in the database;
//! - an **execution layer** that runs ad-hoc queries and stored-procedure calls
//!   from templates and snapshots every result cursor, nested cursors
//!   included, into an immutable [`TabularResult`].
//!
//! ## Module Organization
//!
//! - [`template_source`] - [`RemoteTemplateSource`] and the [`TemplateLoader`] contract
//! - [`database`] - driver SPI, backends, query runner, call binder, connections
//! - [`tabular`] - materialized results and their row, map and column views
//! - [`types`] - scalar and bind values, SQL type-name resolution
//! - [`config`] - layered configuration
//! - [`logging`] - structured logging setup
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dbtemplate_core::config::ConfigManager;
//! use dbtemplate_core::database::{ConnectionRegistry, PgConnector};
//! use dbtemplate_core::template_source::{RemoteTemplateSource, TemplateLoader};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! dbtemplate_core::logging::init_structured_logging();
//! let manager = ConfigManager::load()?;
//! let config = manager.config();
//!
//! let registry = ConnectionRegistry::new(Arc::new(PgConnector::from_config(&config.database)));
//! let source = RemoteTemplateSource::with_default_connection(&registry, &config.template_source).await?;
//!
//! if let Some(found) = source.find_template_source("orders/summary.ftl").await? {
//!     let modified = source.last_modified(&found).await?;
//!     println!("{found} modified at {modified}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod logging;
pub mod tabular;
pub mod template_source;
pub mod types;
pub mod validation;

pub use config::{ConfigManager, DatabaseConfig, DbTemplateConfig, TemplateSourceConfig};
pub use database::{CallBinder, ConnectionFacade, ConnectionRegistry, QueryRunner};
pub use error::{DbTemplateError, DriverError, Result, SqlError, TemplateSourceError};
pub use tabular::{Cell, ColumnDescriptor, TabularResult};
pub use template_source::{
    LocationDescriptor, RemoteTemplateSource, SourceVariant, TemplateLoader, TemplateLocator,
};
pub use types::{BindValue, TypeCodec, Value};
