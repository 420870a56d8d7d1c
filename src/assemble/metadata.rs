//! Pipeline metadata columns

use crate::types::{timestamp_type, TargetType};
use arrow::array::{ArrayRef, BooleanArray, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const ETL_CREATED_DATE: &str = "ETL_CREATED_DATE";
pub const ETL_LAST_UPDATE_DATE: &str = "ETL_LAST_UPDATE_DATE";
pub const CREATED_BY: &str = "CREATED_BY";
pub const EDW_EXTERNAL_SOURCE_SYSTEM: &str = "EDW_EXTERNAL_SOURCE_SYSTEM";
pub const ETL_BATCH_ID: &str = "ETL_BATCH_ID";
pub const TO_PROCESS: &str = "TO_PROCESS";

/// Metadata columns in output order
pub const METADATA_COLUMNS: [&str; 6] = [
    ETL_CREATED_DATE,
    ETL_LAST_UPDATE_DATE,
    CREATED_BY,
    EDW_EXTERNAL_SOURCE_SYSTEM,
    ETL_BATCH_ID,
    TO_PROCESS,
];

/// Check if a column name is reserved for metadata
pub fn is_metadata_column(name: &str) -> bool {
    METADATA_COLUMNS.iter().any(|m| m.eq_ignore_ascii_case(name))
}

/// Static metadata values from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Value of `CREATED_BY`
    #[serde(default = "default_actor")]
    pub actor: String,

    /// Value of `EDW_EXTERNAL_SOURCE_SYSTEM`
    #[serde(default = "default_source_system")]
    pub source_system: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            actor: default_actor(),
            source_system: default_source_system(),
        }
    }
}

fn default_actor() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "docflow".to_string())
}

fn default_source_system() -> String {
    "docflow".to_string()
}

/// Identity of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Unique id, also usable in sink paths
    pub run_id: String,
    /// Run start, written to `ETL_CREATED_DATE`
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    /// Start a run now
    pub fn start() -> Self {
        let started_at = Utc::now();
        Self {
            run_id: started_at.format("%Y%m%dT%H%M%S%3fZ").to_string(),
            started_at,
        }
    }

    /// Run with an explicit id and start time
    pub fn new(run_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at,
        }
    }
}

/// Build the metadata columns for `batch_ids.len()` rows
pub(crate) fn metadata_columns(
    config: &MetadataConfig,
    run: &RunContext,
    flushed_at: DateTime<Utc>,
    batch_ids: &[i64],
) -> Vec<(Field, ArrayRef)> {
    let rows = batch_ids.len();
    let timestamp = |ts: DateTime<Utc>| -> ArrayRef {
        Arc::new(
            TimestampMicrosecondArray::from(vec![ts.timestamp_micros(); rows]).with_timezone("UTC"),
        )
    };
    let text = |value: &str| -> ArrayRef { Arc::new(StringArray::from(vec![value; rows])) };

    vec![
        (field(ETL_CREATED_DATE, timestamp_type()), timestamp(run.started_at)),
        (field(ETL_LAST_UPDATE_DATE, timestamp_type()), timestamp(flushed_at)),
        (field(CREATED_BY, DataType::Utf8), text(&config.actor)),
        (
            field(EDW_EXTERNAL_SOURCE_SYSTEM, DataType::Utf8),
            text(&config.source_system),
        ),
        (
            field(ETL_BATCH_ID, TargetType::Integer.to_arrow()),
            Arc::new(Int64Array::from(batch_ids.to_vec())),
        ),
        (
            field(TO_PROCESS, DataType::Boolean),
            Arc::new(BooleanArray::from(vec![true; rows])),
        ),
    ]
}

fn field(name: &str, data_type: DataType) -> Field {
    Field::new(name, data_type, true)
}
