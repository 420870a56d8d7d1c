//! Common types used throughout docflow
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use arrow::datatypes::{DataType, TimeUnit};
use serde::{Deserialize, Serialize};

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// Column Types
// ============================================================================

/// Target type of a coerced column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Integer,
    Double,
    Boolean,
    Timestamp,
    String,
    Binary,
}

impl TargetType {
    /// Arrow type used for this column
    pub fn to_arrow(self) -> DataType {
        match self {
            TargetType::Integer => DataType::Int64,
            TargetType::Double => DataType::Float64,
            TargetType::Boolean => DataType::Boolean,
            TargetType::Timestamp => timestamp_type(),
            TargetType::String => DataType::Utf8,
            TargetType::Binary => DataType::Binary,
        }
    }

    /// Map an Arrow type back, falling back to string for anything else
    pub fn from_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                TargetType::Integer
            }
            DataType::Float16 | DataType::Float32 | DataType::Float64 => TargetType::Double,
            DataType::Boolean => TargetType::Boolean,
            DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => {
                TargetType::Timestamp
            }
            DataType::Binary | DataType::LargeBinary => TargetType::Binary,
            _ => TargetType::String,
        }
    }

    /// SQL type used when a warehouse table is created from a batch
    pub fn sql_type(self) -> &'static str {
        match self {
            TargetType::Integer => "BIGINT",
            TargetType::Double => "DOUBLE",
            TargetType::Boolean => "BOOLEAN",
            TargetType::Timestamp => "TIMESTAMP",
            TargetType::String => "VARCHAR",
            TargetType::Binary => "BLOB",
        }
    }
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TargetType::Integer => "integer",
            TargetType::Double => "double",
            TargetType::Boolean => "boolean",
            TargetType::Timestamp => "timestamp",
            TargetType::String => "string",
            TargetType::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// Arrow type of every timestamp column: microseconds, UTC
pub fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
}

// ============================================================================
// Write Mode
// ============================================================================

/// How a sink treats data already at the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Replace existing data
    #[default]
    Overwrite,
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}
