use serde::{Deserialize, Serialize};

/// Whether a column admits nulls, as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// 1-based ordinal position
    pub position: usize,
    pub name: String,
    /// Database-native type name
    pub type_name: String,
    pub precision: Option<u32>,
    pub scale: Option<i32>,
    pub nullability: Nullability,
}

impl ColumnDescriptor {
    pub fn new(position: usize, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            position,
            name: name.into(),
            type_name: type_name.into(),
            precision: None,
            scale: None,
            nullability: Nullability::Unknown,
        }
    }

    pub fn with_precision(mut self, precision: u32, scale: i32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn with_nullability(mut self, nullability: Nullability) -> Self {
        self.nullability = nullability;
        self
    }

    /// 0-based index into a row
    pub fn index(&self) -> usize {
        self.position.saturating_sub(1)
    }
}
