//! Semantic values accepted by the encoder
//!
//! `Value` is the closed set of shapes a metric column can take on its way
//! into SQL. Only text, numbers, timestamps and objects have a literal form;
//! the remaining variants exist so upstream data can be represented faithfully
//! and rejected with a typed error instead of being coerced.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// A numeric value tagged with its source width and signedness
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl Number {
    /// Short type tag, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Number::I32(_) => "i32",
            Number::I64(_) => "i64",
            Number::U32(_) => "u32",
            Number::U64(_) => "u64",
            Number::F32(_) => "f32",
            Number::F64(_) => "f64",
        }
    }

    /// True for NaN and infinities
    pub fn is_non_finite(&self) -> bool {
        match self {
            Number::F32(v) => !v.is_finite(),
            Number::F64(v) => !v.is_finite(),
            _ => false,
        }
    }
}

/// A value that may appear in a metric column
///
/// Objects use a `BTreeMap` so keys always enumerate in ascending byte order,
/// whatever order the caller inserted them in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum Value {
    Text(String),
    Number(Number),
    Timestamp(DateTime<Utc>),
    Object(BTreeMap<String, Value>),
    /// Not encodable
    Bool(bool),
    /// Not encodable
    List(Vec<Value>),
    /// Not encodable
    Null,
}

impl Value {
    /// Short type tag, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Number(n) => n.type_name(),
            Value::Timestamp(_) => "timestamp",
            Value::Object(_) => "object",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Null => "null",
        }
    }

    /// Build an object from any iterator of key/value pairs
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Number(Number::$variant(v))
                }
            }
        )*
    };
}

impl_from_number! {
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

impl<V: Into<Value>> From<HashMap<String, V>> for Value {
    fn from(map: HashMap<String, V>) -> Self {
        Value::object(map)
    }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
    fn from(items: Vec<V>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Number(Number::I64(i))
                } else if let Some(u) = n.as_u64() {
                    Value::Number(Number::U64(u))
                } else {
                    n.as_f64()
                        .map(|f| Value::Number(Number::F64(f)))
                        .unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
