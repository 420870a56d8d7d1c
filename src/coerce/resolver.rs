//! Column type resolution and casting

use super::rules::{default_rules, rule_for, TypeRule};
use super::sniff::{float_to_int, parse_bool, parse_float, parse_int, parse_timestamp, sniff};
use crate::document::{Scalar, TabularRow, ValueKind};
use crate::types::TargetType;
use arrow::array::{
    ArrayRef, BinaryArray, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::Field;
use chrono::DateTime;
use std::sync::Arc;

/// A column after type resolution
#[derive(Debug, Clone)]
pub struct CoercedColumn {
    pub name: String,
    pub target: TargetType,
    pub array: ArrayRef,
}

impl CoercedColumn {
    /// Nullable Arrow field for this column
    pub fn field(&self) -> Field {
        Field::new(&self.name, self.array.data_type().clone(), true)
    }
}

/// Resolves and casts column types
#[derive(Debug, Clone)]
pub struct TypeResolver {
    rules: Vec<TypeRule>,
    sniff_strings: bool,
}

impl Default for TypeResolver {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            sniff_strings: false,
        }
    }
}

impl TypeResolver {
    /// Create a resolver with the standard rule table
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the rule table
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<TypeRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Also type rule-less string columns by their content
    #[must_use]
    pub fn with_sniff_strings(mut self, enabled: bool) -> Self {
        self.sniff_strings = enabled;
        self
    }

    /// Decide the target type of a column
    pub fn resolve(&self, column: &str, values: &[Option<&Scalar>]) -> TargetType {
        if let Some(rule) = rule_for(&self.rules, column) {
            return rule.target;
        }

        let native = values
            .iter()
            .flatten()
            .filter_map(|v| native_target(v.kind()))
            .reduce(merge_targets)
            .unwrap_or(TargetType::String);

        if native == TargetType::String && self.sniff_strings {
            if let Some(sniffed) = sniff_column(values) {
                return sniffed;
            }
        }
        native
    }

    /// Resolve and cast one column
    pub fn coerce_column(&self, column: &str, values: &[Option<&Scalar>]) -> CoercedColumn {
        let target = self.resolve(column, values);
        CoercedColumn {
            name: column.to_string(),
            target,
            array: build_array(values, target),
        }
    }

    /// Resolve and cast every listed column over the rows
    ///
    /// A column missing from a row is a null cell.
    pub fn coerce(&self, columns: &[String], rows: &[TabularRow]) -> Vec<CoercedColumn> {
        columns
            .iter()
            .map(|column| {
                let values: Vec<Option<&Scalar>> = rows.iter().map(|row| row.get(column)).collect();
                self.coerce_column(column, &values)
            })
            .collect()
    }
}

fn native_target(kind: ValueKind) -> Option<TargetType> {
    match kind {
        ValueKind::Null => None,
        ValueKind::Bool => Some(TargetType::Boolean),
        ValueKind::Int => Some(TargetType::Integer),
        ValueKind::Double => Some(TargetType::Double),
        ValueKind::Timestamp => Some(TargetType::Timestamp),
        ValueKind::Binary => Some(TargetType::Binary),
        ValueKind::String | ValueKind::Array | ValueKind::Struct => Some(TargetType::String),
    }
}

/// Merge two column types into a compatible type
pub(crate) fn merge_targets(a: TargetType, b: TargetType) -> TargetType {
    match (a, b) {
        (a, b) if a == b => a,
        (TargetType::Integer, TargetType::Double) | (TargetType::Double, TargetType::Integer) => {
            TargetType::Double
        }
        // Different types -> fall back to String
        _ => TargetType::String,
    }
}

/// Common sniffed type of a string-only column
fn sniff_column(values: &[Option<&Scalar>]) -> Option<TargetType> {
    let mut merged: Option<TargetType> = None;
    for value in values.iter().flatten() {
        let sniffed = match value {
            Scalar::Null => continue,
            Scalar::String(text) => sniff(text)?,
            _ => return None,
        };
        merged = Some(match merged {
            None => sniffed,
            Some(current) => {
                let next = merge_targets(current, sniffed);
                if next == TargetType::String {
                    return None;
                }
                next
            }
        });
    }
    merged
}

// ============================================================================
// Casting
// ============================================================================

fn cast_int(value: &Scalar) -> Option<i64> {
    match value {
        Scalar::Int(i) => Some(*i),
        Scalar::Float(f) => float_to_int(*f),
        Scalar::Bool(b) => Some(i64::from(*b)),
        Scalar::String(s) => parse_int(s),
        Scalar::Timestamp(ts) => Some(ts.timestamp()),
        Scalar::Null | Scalar::Binary(_) => None,
    }
}

fn cast_float(value: &Scalar) -> Option<f64> {
    match value {
        Scalar::Int(i) => Some(*i as f64),
        Scalar::Float(f) => Some(*f),
        Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Scalar::String(s) => parse_float(s),
        Scalar::Null | Scalar::Timestamp(_) | Scalar::Binary(_) => None,
    }
}

fn cast_bool(value: &Scalar) -> Option<bool> {
    match value {
        Scalar::Bool(b) => Some(*b),
        Scalar::Int(i) => Some(*i != 0),
        Scalar::Float(f) => Some(*f != 0.0),
        Scalar::String(s) => parse_bool(s),
        Scalar::Null | Scalar::Timestamp(_) | Scalar::Binary(_) => None,
    }
}

/// Microseconds since the epoch
fn cast_timestamp(value: &Scalar) -> Option<i64> {
    match value {
        Scalar::Timestamp(ts) => Some(ts.timestamp_micros()),
        Scalar::Int(secs) => DateTime::from_timestamp(*secs, 0).map(|ts| ts.timestamp_micros()),
        Scalar::Float(secs) if secs.is_finite() => float_to_int(secs * 1_000_000.0),
        Scalar::String(s) => parse_timestamp(s).map(|ts| ts.timestamp_micros()),
        _ => None,
    }
}

fn cast_binary(value: &Scalar) -> Option<Vec<u8>> {
    match value {
        Scalar::Binary(bytes) => Some(bytes.clone()),
        other => other.to_text().map(String::into_bytes),
    }
}

/// Build an Arrow array of the target type, nulling cells that do not cast
pub(crate) fn build_array(values: &[Option<&Scalar>], target: TargetType) -> ArrayRef {
    match target {
        TargetType::Integer => {
            let arr: Int64Array = values.iter().map(|v| v.and_then(cast_int)).collect();
            Arc::new(arr)
        }
        TargetType::Double => {
            let arr: Float64Array = values.iter().map(|v| v.and_then(cast_float)).collect();
            Arc::new(arr)
        }
        TargetType::Boolean => {
            let arr: BooleanArray = values.iter().map(|v| v.and_then(cast_bool)).collect();
            Arc::new(arr)
        }
        TargetType::Timestamp => {
            let micros: Vec<Option<i64>> =
                values.iter().map(|v| v.and_then(cast_timestamp)).collect();
            Arc::new(TimestampMicrosecondArray::from(micros).with_timezone("UTC"))
        }
        TargetType::String => {
            let arr: StringArray = values.iter().map(|v| v.and_then(Scalar::to_text)).collect();
            Arc::new(arr)
        }
        TargetType::Binary => {
            let arr: BinaryArray = values.iter().map(|v| v.and_then(cast_binary)).collect();
            Arc::new(arr)
        }
    }
}
