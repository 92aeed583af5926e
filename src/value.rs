//! In-memory value tree
//!
//! Only the JSON → MessagePack direction materializes documents as [`Value`]
//! trees, since MessagePack needs each container's size before its
//! contents. The other direction streams tag by tag.

use crate::error::{Error, Location, Result};

/// One decoded MessagePack value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    /// Unsigned integer. Decoders produce this only above `i64::MAX`.
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    /// Opaque bytes with no JSON equivalent
    Bin(Vec<u8>),
    /// Application-defined type code plus opaque bytes
    Ext(i8, Vec<u8>),
    Array(Vec<Value>),
    /// Key/value pairs in source order; duplicates are kept
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Build an ext value, rejecting type codes outside the signed 8-bit range
    pub fn ext(exttype: i64, data: impl Into<Vec<u8>>) -> Result<Value> {
        let exttype = i8::try_from(exttype).map_err(|_| {
            Error::data(
                Location::Path("$".into()),
                format!("ext type {} is out of bounds (-128..=127)", exttype),
            )
        })?;
        Ok(Value::Ext(exttype, data.into()))
    }

    /// Name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "nil",
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int",
            Value::UInt64(_) => "uint",
            Value::Float32(_) => "float",
            Value::Float64(_) => "double",
            Value::String(_) => "str",
            Value::Bin(_) => "bin",
            Value::Ext(..) => "ext",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Keys that came from a JSON string: plain strings and tagged bin/ext
    pub fn is_string_like(&self) -> bool {
        matches!(self, Value::String(_) | Value::Bin(_) | Value::Ext(..))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => Value::Int64(n),
            Err(_) => Value::UInt64(n),
        }
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float64(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}
