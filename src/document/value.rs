//! Tagged document values

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// A node of a parsed document tree
#[derive(Debug, Clone, PartialEq)]
pub enum DocValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Binary(Vec<u8>),
    Array(Vec<DocValue>),
    /// Object fields in source order
    Object(Vec<(String, DocValue)>),
}

impl DocValue {
    /// Source kind of this node
    pub fn kind(&self) -> ValueKind {
        match self {
            DocValue::Null => ValueKind::Null,
            DocValue::Bool(_) => ValueKind::Bool,
            DocValue::Int(_) => ValueKind::Int,
            DocValue::Float(_) => ValueKind::Double,
            DocValue::String(_) => ValueKind::String,
            DocValue::Timestamp(_) => ValueKind::Timestamp,
            DocValue::Binary(_) => ValueKind::Binary,
            DocValue::Array(_) => ValueKind::Array,
            DocValue::Object(_) => ValueKind::Struct,
        }
    }

    /// Look up a top-level field of an object
    pub fn get(&self, key: &str) -> Option<&DocValue> {
        match self {
            DocValue::Object(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Convert a leaf into a scalar; containers are rendered as JSON text
    pub fn into_scalar(self) -> Scalar {
        match self {
            DocValue::Null => Scalar::Null,
            DocValue::Bool(b) => Scalar::Bool(b),
            DocValue::Int(i) => Scalar::Int(i),
            DocValue::Float(f) => Scalar::Float(f),
            DocValue::String(s) => Scalar::String(s),
            DocValue::Timestamp(ts) => Scalar::Timestamp(ts),
            DocValue::Binary(b) => Scalar::Binary(b),
            container @ (DocValue::Array(_) | DocValue::Object(_)) => {
                Scalar::String(container.to_json().to_string())
            }
        }
    }

    /// Render back to plain JSON (timestamps as RFC 3339, binary as base64)
    pub fn to_json(&self) -> Value {
        match self {
            DocValue::Null => Value::Null,
            DocValue::Bool(b) => Value::Bool(*b),
            DocValue::Int(i) => Value::Number((*i).into()),
            DocValue::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            DocValue::String(s) => Value::String(s.clone()),
            DocValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            DocValue::Binary(b) => Value::String(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                b,
            )),
            DocValue::Array(items) => Value::Array(items.iter().map(DocValue::to_json).collect()),
            DocValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// A flattened leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Binary(Vec<u8>),
}

impl Scalar {
    /// Source kind of this scalar
    pub fn kind(&self) -> ValueKind {
        match self {
            Scalar::Null => ValueKind::Null,
            Scalar::Bool(_) => ValueKind::Bool,
            Scalar::Int(_) => ValueKind::Int,
            Scalar::Float(_) => ValueKind::Double,
            Scalar::String(_) => ValueKind::String,
            Scalar::Timestamp(_) => ValueKind::Timestamp,
            Scalar::Binary(_) => ValueKind::Binary,
        }
    }

    /// Check if this is a null
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Render as text, used for string columns and for dedup keys
    pub fn to_text(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(f.to_string()),
            Scalar::String(s) => Some(s.clone()),
            Scalar::Timestamp(ts) => Some(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Scalar::Binary(b) => Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                b,
            )),
        }
    }
}

/// Kind of a source value, as seen before any type coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Double,
    String,
    Timestamp,
    Binary,
    Array,
    Struct,
}

impl ValueKind {
    /// Suffix used when a column name collides across kinds
    pub fn suffix(self) -> &'static str {
        match self {
            ValueKind::Null => "NULL",
            ValueKind::Bool => "BOOL",
            ValueKind::Int => "INT",
            ValueKind::Double => "DOUBLE",
            ValueKind::String => "STRING",
            ValueKind::Timestamp => "TIMESTAMP",
            ValueKind::Binary => "BINARY",
            ValueKind::Array => "ARRAY",
            ValueKind::Struct => "STRUCT",
        }
    }

    /// Kinds in the same class never collide with each other
    ///
    /// Integers and doubles merge into one numeric column, and nulls carry
    /// no type information at all.
    pub fn collision_class(self) -> Option<ValueKind> {
        match self {
            ValueKind::Null => None,
            ValueKind::Int | ValueKind::Double => Some(ValueKind::Double),
            other => Some(other),
        }
    }

    /// Check if this is a container kind
    pub fn is_container(self) -> bool {
        matches!(self, ValueKind::Array | ValueKind::Struct)
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.suffix().to_lowercase())
    }
}
