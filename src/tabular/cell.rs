use super::TabularResult;
use crate::types::Value;
use serde::{Serialize, Serializer};
use std::fmt;

/// One materialized cell: a scalar, a nested result (the source cell was a
/// cursor), or null.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Scalar(Value),
    Nested(TabularResult),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Cell::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&TabularResult> {
        match self {
            Cell::Nested(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_scalar().and_then(Value::as_i64)
    }
}

impl From<Value> for Cell {
    fn from(v: Value) -> Self {
        Cell::Scalar(v)
    }
}

impl From<TabularResult> for Cell {
    fn from(t: TabularResult) -> Self {
        Cell::Nested(t)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(v: Option<T>) -> Self {
        v.map_or(Cell::Null, Into::into)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("null"),
            Cell::Scalar(v) => write!(f, "{v}"),
            Cell::Nested(t) => write!(
                f,
                "TabularResult(rows={}, columns={})",
                t.row_count(),
                t.column_count()
            ),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_none(),
            Cell::Scalar(v) => v.serialize(serializer),
            Cell::Nested(t) => t.serialize(serializer),
        }
    }
}
