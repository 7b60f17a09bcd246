//! # Structured Logging Module
//!
//! Environment-aware console logging using the tracing ecosystem.
//!
//! - The environment is read from `DBTEMPLATE_ENV`, then `APP_ENV`
//!   (default `development`)
//! - The filter comes from `LOG_LEVEL`, then `RUST_LOG`, then a per-environment
//!   default
//! - Output is human readable, or JSON lines when configured or when running
//!   in `production`
//!
//! Initialization is idempotent and never panics when another subscriber is
//! already installed (for example by an embedding template engine).

use crate::config::{LogFormat, LoggingConfig};
use crate::constants::system;
use chrono::Utc;
use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging from the environment alone
pub fn init_structured_logging() {
    init_logging(&LoggingConfig::default());
}

/// Initialize structured logging; explicit settings in `config` win over the
/// environment defaults
pub fn init_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let environment = get_environment_with(&vars);
        let log_level = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level_with(&environment, &vars));
        let format = config
            .format
            .unwrap_or_else(|| default_format(&environment));
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let console_layer = match format {
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&log_level))
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(EnvFilter::new(&log_level))
                .boxed(),
        };

        if tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                level = %log_level,
                format = ?format,
                ansi_colors = use_ansi,
                "Structured logging initialized"
            );
        }
    });
}

/// Current environment name
pub fn get_environment() -> String {
    get_environment_with(&std::env::vars().collect())
}

/// Environment name as seen through `vars` instead of the process environment
pub fn get_environment_with(vars: &HashMap<String, String>) -> String {
    vars.get(system::ENV_VAR)
        .or_else(|| vars.get("APP_ENV"))
        .cloned()
        .unwrap_or_else(|| system::DEFAULT_ENVIRONMENT.to_string())
}

fn get_log_level_with(environment: &str, vars: &HashMap<String, String>) -> String {
    if let Some(level) = vars.get("LOG_LEVEL").or_else(|| vars.get("RUST_LOG")) {
        return level.to_lowercase();
    }

    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn default_format(environment: &str) -> LogFormat {
    match environment {
        "production" => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

/// Log one completed statement execution
pub fn log_database_operation(
    operation: &str,
    statement: Option<&str>,
    rows: Option<usize>,
    duration: Option<Duration>,
) {
    tracing::debug!(
        operation = %operation,
        statement = statement,
        rows = rows,
        duration_ms = duration.map(|d| d.as_millis() as u64),
        "DATABASE_OPERATION"
    );
}

/// Log one template source protocol step
pub fn log_template_operation(
    operation: &str,
    template: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        template = %template,
        status = %status,
        details = details,
        "TEMPLATE_OPERATION"
    );
}

/// Generic error logging with unified format
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR: {} failed in {}: {}", operation, component, error
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<const N: usize>(entries: [(&str, &str); N]) -> HashMap<String, String> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_environment_detection() {
        assert_eq!(get_environment_with(&vars([])), system::DEFAULT_ENVIRONMENT);
        assert_eq!(get_environment_with(&vars([("APP_ENV", "staging")])), "staging");
        assert_eq!(
            get_environment_with(&vars([(system::ENV_VAR, "test"), ("APP_ENV", "staging")])),
            "test"
        );
    }

    #[test]
    fn test_log_level_detection() {
        assert_eq!(get_log_level_with("test", &vars([])), "debug");
        assert_eq!(get_log_level_with("production", &vars([])), "info");
        assert_eq!(get_log_level_with("production", &vars([("RUST_LOG", "Trace")])), "trace");
        assert_eq!(
            get_log_level_with("production", &vars([("LOG_LEVEL", "WARN"), ("RUST_LOG", "trace")])),
            "warn"
        );
    }

    #[test]
    fn test_default_format() {
        assert_eq!(default_format("production"), LogFormat::Json);
        assert_eq!(default_format("development"), LogFormat::Pretty);
    }

    #[test]
    fn test_initialization_is_idempotent() {
        init_structured_logging();
        init_logging(&LoggingConfig {
            level: Some("trace".to_string()),
            format: Some(LogFormat::Json),
        });
        log_template_operation("resolve", "orders/header", "found", None);
    }
}
