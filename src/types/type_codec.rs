//! # Type Codec
//!
//! Resolves symbolic SQL type names to numeric type codes and classifies
//! generic temporal values before they are bound.
//!
//! Bare names (`VARCHAR`, `CLOB`) resolve against the static table in
//! [`crate::constants::STANDARD_TYPE_NAMES`]. Dotted names
//! (`oracle.jdbc.OracleTypes.CURSOR`) resolve against the extension registry,
//! which starts out seeded with [`crate::constants::VENDOR_TYPE_NAMES`] and can
//! be extended with [`TypeCodec::register_extension`]. Resolution is strict:
//! an unknown name is an error, never a silent "unknown" code.

use crate::constants::{STANDARD_TYPES_VERSION, STANDARD_TYPE_NAMES, VENDOR_TYPE_NAMES};
use crate::error::{SqlError, SqlResult};
use crate::types::{BindValue, Value};
use chrono::Timelike;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::debug;

fn standard_table() -> &'static HashMap<&'static str, i32> {
    static TABLE: OnceLock<HashMap<&'static str, i32>> = OnceLock::new();
    TABLE.get_or_init(|| STANDARD_TYPE_NAMES.iter().copied().collect())
}

/// Type name resolution and temporal normalization.
///
/// Cloning a codec is not supported; share it behind an `Arc` so extension
/// registrations are visible to every binder using it.
#[derive(Debug)]
pub struct TypeCodec {
    extensions: DashMap<String, i32>,
}

impl Default for TypeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeCodec {
    /// Create a codec with the vendor extensions pre-registered
    pub fn new() -> Self {
        let codec = Self::without_vendor_types();
        for (name, code) in VENDOR_TYPE_NAMES {
            codec.extensions.insert((*name).to_string(), *code);
        }
        codec
    }

    /// Create a codec that only knows the standard table
    pub fn without_vendor_types() -> Self {
        Self {
            extensions: DashMap::new(),
        }
    }

    /// Version tag of the standard type table
    pub fn table_version(&self) -> &'static str {
        STANDARD_TYPES_VERSION
    }

    /// Register (or replace) an extension type name.
    ///
    /// Bare names registered here are consulted after the standard table, so
    /// standard names cannot be shadowed.
    pub fn register_extension(&self, name: impl Into<String>, code: i32) {
        let name = name.into();
        debug!(type_name = %name, code, "Registered SQL type extension");
        self.extensions.insert(name, code);
    }

    /// Resolve a type name to its numeric code
    pub fn code_of(&self, type_name: &str) -> SqlResult<i32> {
        let name = type_name.trim();
        if name.is_empty() {
            return Err(SqlError::UnknownType {
                name: type_name.to_string(),
                reason: "type name is blank".to_string(),
            });
        }

        if let Some(code) = standard_table().get(name) {
            return Ok(*code);
        }
        if let Some(code) = self.extensions.get(name) {
            return Ok(*code);
        }

        let reason = match name.rfind('.') {
            Some(pos) if pos > 0 && pos < name.len() - 1 => {
                format!(
                    "constant {} is not registered for {}",
                    &name[pos + 1..],
                    &name[..pos]
                )
            }
            _ => format!(
                "not a standard type ({STANDARD_TYPES_VERSION}) and not a fully specified extension name"
            ),
        };
        Err(SqlError::UnknownType {
            name: name.to_string(),
            reason,
        })
    }

    /// Classify a generic temporal as a timestamp (non-zero time of day) or a
    /// date (midnight). Other values pass through unchanged.
    pub fn normalize_temporal(&self, value: BindValue) -> BindValue {
        normalize_temporal(value)
    }
}

/// Free-function form of [`TypeCodec::normalize_temporal`]
pub fn normalize_temporal(value: BindValue) -> BindValue {
    match value {
        BindValue::Temporal(dt) => {
            let time = dt.time();
            let has_time_part = time.hour() != 0
                || time.minute() != 0
                || time.second() != 0
                || time.nanosecond() != 0;
            if has_time_part {
                BindValue::Scalar(Value::Timestamp(dt))
            } else {
                BindValue::Scalar(Value::Date(dt.date()))
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{oracle_types, sql_types};
    use chrono::NaiveDate;

    #[test]
    fn test_standard_names_resolve() {
        let codec = TypeCodec::new();
        assert_eq!(codec.code_of("VARCHAR").unwrap(), sql_types::VARCHAR);
        assert_eq!(codec.code_of(" CLOB ").unwrap(), sql_types::CLOB);
        assert_eq!(codec.code_of("BIGINT").unwrap(), sql_types::BIGINT);
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let codec = TypeCodec::new();
        assert!(matches!(
            codec.code_of("varchar"),
            Err(SqlError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_vendor_names_resolve() {
        let codec = TypeCodec::new();
        assert_eq!(
            codec.code_of("oracle.jdbc.OracleTypes.CURSOR").unwrap(),
            oracle_types::CURSOR
        );
        let bare = TypeCodec::without_vendor_types();
        assert!(bare.code_of("oracle.jdbc.OracleTypes.CURSOR").is_err());
    }

    #[test]
    fn test_unknown_dotted_name_reports_member() {
        let codec = TypeCodec::new();
        let err = codec.code_of("com.acme.Types.WIDGET").unwrap_err();
        match err {
            SqlError::UnknownType { name, reason } => {
                assert_eq!(name, "com.acme.Types.WIDGET");
                assert!(reason.contains("WIDGET"));
                assert!(reason.contains("com.acme.Types"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_register_extension() {
        let codec = TypeCodec::new();
        codec.register_extension("com.acme.Types.WIDGET", 9001);
        assert_eq!(codec.code_of("com.acme.Types.WIDGET").unwrap(), 9001);
    }

    #[test]
    fn test_standard_names_cannot_be_shadowed() {
        let codec = TypeCodec::new();
        codec.register_extension("VARCHAR", 1);
        assert_eq!(codec.code_of("VARCHAR").unwrap(), sql_types::VARCHAR);
    }

    #[test]
    fn test_normalize_temporal() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let midnight = date.and_hms_opt(0, 0, 0).unwrap();
        let afternoon = date.and_hms_opt(14, 30, 0).unwrap();
        let one_milli = date.and_hms_milli_opt(0, 0, 0, 1).unwrap();

        assert_eq!(
            normalize_temporal(BindValue::Temporal(midnight)),
            BindValue::Scalar(Value::Date(date))
        );
        assert_eq!(
            normalize_temporal(BindValue::Temporal(afternoon)),
            BindValue::Scalar(Value::Timestamp(afternoon))
        );
        assert_eq!(
            normalize_temporal(BindValue::Temporal(one_milli)),
            BindValue::Scalar(Value::Timestamp(one_milli))
        );
        assert_eq!(normalize_temporal(BindValue::Null), BindValue::Null);
    }
}
