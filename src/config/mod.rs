//! # Configuration
//!
//! Typed settings for the database connection, the remote template source and
//! logging. [`ConfigManager`] layers them from built-in defaults, optional TOML
//! files and environment variables:
//!
//! 1. [`DbTemplateConfig::default`]
//! 2. `config/dbtemplate.toml`
//! 3. `config/dbtemplate.{environment}.toml`
//! 4. `DBTEMPLATE__SECTION__KEY` variables (for example
//!    `DBTEMPLATE__DATABASE__FETCH_SIZE=500`)
//! 5. `DATABASE_URL`
//!
//! ```toml
//! [database]
//! url = "postgresql://localhost/templates"
//! fetch_size = 500
//!
//! [template_source]
//! variant = "locator"
//! resolver_call = "tmpl.resolve"
//! loader_call = "tmpl.load"
//! ```

mod error;
mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::system;
use crate::template_source::SourceVariant;
use serde::{Deserialize, Serialize};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbTemplateConfig {
    pub database: DatabaseConfig,
    pub template_source: TemplateSourceConfig,
    pub logging: LoggingConfig,
}

impl DbTemplateConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.database.validate()?;
        self.template_source.validate()
    }
}

/// Connection settings for the default connection strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Rows pulled per round trip when reading server-side cursors
    pub fetch_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: system::DEFAULT_DATABASE_URL.to_string(),
            username: None,
            password: None,
            fetch_size: system::DEFAULT_FETCH_SIZE,
        }
    }
}

impl DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "url",
                "database configuration",
            ));
        }
        if self.fetch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "fetch_size",
                "0",
                "fetch size must be positive",
            ));
        }
        Ok(())
    }
}

/// Calls used by the remote template source.
///
/// For the object variant these are complete call texts; for the locator
/// variant they are function names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateSourceConfig {
    pub variant: SourceVariant,
    pub resolver_call: String,
    pub loader_call: String,
    pub checker_call: Option<String>,
}

impl Default for TemplateSourceConfig {
    fn default() -> Self {
        Self {
            variant: SourceVariant::Object,
            resolver_call: "{call dbtemplate_api.resolve_template(?, ?, ?, ?, ?, ?)}".to_string(),
            loader_call: "{call dbtemplate_api.load_template(?, ?, ?, ?, ?, ?)}".to_string(),
            checker_call: None,
        }
    }
}

impl TemplateSourceConfig {
    fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("resolver_call", &self.resolver_call),
            ("loader_call", &self.loader_call),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    field,
                    "template source configuration",
                ));
            }
        }
        if matches!(&self.checker_call, Some(call) if call.trim().is_empty()) {
            return Err(ConfigurationError::invalid_value(
                "checker_call",
                "",
                "omit the checker instead of leaving it blank",
            ));
        }
        Ok(())
    }
}

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging overrides; unset fields fall back to environment detection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DbTemplateConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.database.fetch_size, system::DEFAULT_FETCH_SIZE);
        assert!(config.template_source.checker_call.is_none());
    }

    #[test]
    fn test_validation_rejects_blank_calls_and_zero_fetch_size() {
        let mut config = DbTemplateConfig::default();
        config.template_source.loader_call = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { ref field, .. }) if field == "loader_call"
        ));

        let mut config = DbTemplateConfig::default();
        config.database.fetch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "fetch_size"
        ));

        let mut config = DbTemplateConfig::default();
        config.template_source.checker_call = Some(String::new());
        assert!(config.validate().is_err());
    }
}
