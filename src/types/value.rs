//! Scalar values exchanged with the database.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Serialize, Serializer};
use sqlx::types::BigDecimal;
use std::fmt;
use uuid::Uuid;

/// A non-null scalar read from or written to the database.
///
/// `Array` carries SQL collections and the fields of composite (struct)
/// values in order; `None` marks a null element.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
    Uuid(Uuid),
    Array(Vec<Option<Value>>),
}

impl Value {
    /// Short name of the variant, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::TimestampTz(_) => "timestamptz",
            Value::Json(_) => "json",
            Value::Uuid(_) => "uuid",
            Value::Array(_) => "array",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Option<Value>]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(bytes) => {
                f.write_str("0x")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Value::Date(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Timestamp(ts) => write!(f, "{ts}"),
            Value::TimestampTz(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Json(j) => write!(f, "{j}"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match item {
                        Some(v) => write!(f, "{v}")?,
                        None => f.write_str("null")?,
                    }
                }
                f.write_str("]")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Bytes(bytes) => serializer.serialize_bytes(bytes),
            Value::Json(j) => j.serialize(serializer),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Array(items) => serializer.collect_seq(items),
            // Decimals and temporals keep their exact textual form
            other => serializer.collect_str(other),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from!(
    bool => Bool,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    f32 => Float,
    f64 => Float,
    BigDecimal => Decimal,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
    NaiveDate => Date,
    NaiveTime => Time,
    DateTime<Utc> => TimestampTz,
    serde_json::Value => Json,
    Uuid => Uuid,
);

/// A value bound to a positional parameter.
///
/// `Temporal` is a generic date/time that has not yet been classified as a
/// date or a timestamp; it must pass through
/// [`TypeCodec::normalize_temporal`](crate::types::TypeCodec::normalize_temporal)
/// before it reaches a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Scalar(Value),
    Temporal(NaiveDateTime),
}

impl BindValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            BindValue::Scalar(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for BindValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindValue::Null => f.write_str("null"),
            BindValue::Scalar(v) => write!(f, "{v}"),
            BindValue::Temporal(dt) => write!(f, "{dt}"),
        }
    }
}

impl<T: Into<Value>> From<Vec<Option<T>>> for Value {
    fn from(items: Vec<Option<T>>) -> Self {
        Value::Array(items.into_iter().map(|v| v.map(Into::into)).collect())
    }
}

impl From<Value> for BindValue {
    fn from(v: Value) -> Self {
        BindValue::Scalar(v)
    }
}

impl From<NaiveDateTime> for BindValue {
    fn from(dt: NaiveDateTime) -> Self {
        BindValue::Temporal(dt)
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(BindValue::Null, Into::into)
    }
}

macro_rules! bind_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for BindValue {
                fn from(v: $ty) -> Self {
                    BindValue::Scalar(Value::from(v))
                }
            }
        )*
    };
}

bind_from!(
    bool,
    i16,
    i32,
    i64,
    f32,
    f64,
    BigDecimal,
    String,
    &str,
    Vec<u8>,
    NaiveDate,
    NaiveTime,
    DateTime<Utc>,
    serde_json::Value,
    Uuid,
);
