//! Scalar values, bind values and SQL type-name resolution.

pub mod type_codec;
pub mod value;

pub use type_codec::{normalize_temporal, TypeCodec};
pub use value::{BindValue, Value};
