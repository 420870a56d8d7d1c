//! Versioned file sink
//!
//! Each table lives under its own path:
//!
//! ```text
//! <table_path>/data.parquet    current contents, replaced on every write
//! <table_path>/_schema.json    stored column list and types, plus a version
//! ```
//!
//! The manifest is what makes schema evolution possible without reading the
//! data back: with `merge_schema` every stored column survives a write even
//! when the incoming batch lacks it.

use super::cloud::CloudDestination;
use super::writer::{encode_parquet, ParquetWriterConfig};
use crate::error::{Error, Result};
use crate::types::{TargetType, WriteMode};
use arrow::array::{new_null_array, ArrayRef};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Data file name within a table path
pub const DATA_FILE: &str = "data.parquet";

/// Manifest file name within a table path
pub const MANIFEST_FILE: &str = "_schema.json";

/// Options for a file sink write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    #[serde(default)]
    pub mode: WriteMode,

    /// Keep stored columns that the batch does not carry
    #[serde(default = "default_true")]
    pub merge_schema: bool,

    /// Let an incoming column type replace the stored one
    #[serde(default = "default_true")]
    pub overwrite_schema: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            mode: WriteMode::Overwrite,
            merge_schema: true,
            overwrite_schema: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Result of a file sink write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWriteResult {
    /// Full location of the data file
    pub location: String,
    /// Manifest version after the write
    pub version: u64,
    pub rows: usize,
    pub columns: usize,
}

/// A destination for whole-table columnar writes
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Write `batch` as the new contents of `table_path`
    async fn write(
        &self,
        table_path: &str,
        batch: &RecordBatch,
        options: &WriteOptions,
    ) -> Result<FileWriteResult>;
}

/// One column of a stored schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub target: TargetType,
}

/// Stored schema of a table path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaManifest {
    pub version: u64,
    pub columns: Vec<ManifestColumn>,
    pub updated_at: DateTime<Utc>,
}

impl SchemaManifest {
    /// Look up a stored column
    pub fn column(&self, name: &str) -> Option<&ManifestColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// [`FileSink`] over any [`CloudDestination`]
#[derive(Debug, Clone)]
pub struct ObjectStoreFileSink {
    destination: CloudDestination,
    parquet: ParquetWriterConfig,
}

impl ObjectStoreFileSink {
    /// Create a sink rooted at a destination
    pub fn new(destination: CloudDestination) -> Self {
        Self {
            destination,
            parquet: ParquetWriterConfig::default(),
        }
    }

    /// Create a sink from a base URL (local path, `s3://`, `gs://`, ...)
    pub fn from_url(url: &str) -> Result<Self> {
        CloudDestination::parse(url).map(Self::new)
    }

    #[must_use]
    pub fn with_parquet_config(mut self, parquet: ParquetWriterConfig) -> Self {
        self.parquet = parquet;
        self
    }

    /// Read the stored schema of a table path
    pub async fn manifest(&self, table_path: &str) -> Result<Option<SchemaManifest>> {
        let Some(raw) = self.destination.read(&join(table_path, MANIFEST_FILE)).await? else {
            return Ok(None);
        };
        let manifest = serde_json::from_slice(&raw)
            .map_err(|e| Error::output(format!("Corrupt schema manifest at {table_path}: {e}")))?;
        Ok(Some(manifest))
    }

    /// Read the current data file of a table path
    pub async fn read_data(&self, table_path: &str) -> Result<Option<Bytes>> {
        self.destination.read(&join(table_path, DATA_FILE)).await
    }
}

#[async_trait]
impl FileSink for ObjectStoreFileSink {
    async fn write(
        &self,
        table_path: &str,
        batch: &RecordBatch,
        options: &WriteOptions,
    ) -> Result<FileWriteResult> {
        let stored = self.manifest(table_path).await?;
        let merged = reconcile(batch, stored.as_ref(), options)?;

        let data = encode_parquet(&merged, &self.parquet)?;
        let location = self
            .destination
            .write(&join(table_path, DATA_FILE), data)
            .await?;

        let manifest = SchemaManifest {
            version: stored.map_or(0, |m| m.version) + 1,
            columns: merged
                .schema()
                .fields()
                .iter()
                .map(|f| ManifestColumn {
                    name: f.name().clone(),
                    target: TargetType::from_arrow(f.data_type()),
                })
                .collect(),
            updated_at: Utc::now(),
        };
        let encoded = serde_json::to_vec_pretty(&manifest)?;
        self.destination
            .write(&join(table_path, MANIFEST_FILE), Bytes::from(encoded))
            .await?;

        tracing::info!(
            location = %location,
            version = manifest.version,
            rows = merged.num_rows(),
            columns = merged.num_columns(),
            "Wrote file sink table"
        );

        Ok(FileWriteResult {
            location,
            version: manifest.version,
            rows: merged.num_rows(),
            columns: merged.num_columns(),
        })
    }
}

/// Shape an incoming batch against the stored schema
///
/// Stored columns come first in stored order, then new columns in batch
/// order. A column whose type disagrees with the stored one keeps the
/// incoming type under `overwrite_schema` and becomes a string otherwise.
pub fn reconcile(
    batch: &RecordBatch,
    stored: Option<&SchemaManifest>,
    options: &WriteOptions,
) -> Result<RecordBatch> {
    let Some(stored) = stored else {
        return Ok(batch.clone());
    };

    let schema = batch.schema();
    let rows = batch.num_rows();
    let mut fields: Vec<Field> = Vec::new();
    let mut arrays: Vec<ArrayRef> = Vec::new();

    if options.merge_schema {
        for column in &stored.columns {
            if schema.index_of(&column.name).is_err() {
                let data_type = column.target.to_arrow();
                arrays.push(new_null_array(&data_type, rows));
                fields.push(Field::new(&column.name, data_type, true));
            }
        }
    }

    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        let incoming = TargetType::from_arrow(field.data_type());
        let target = match stored.column(field.name()) {
            Some(existing) if existing.target != incoming && !options.overwrite_schema => {
                DataType::Utf8
            }
            _ => field.data_type().clone(),
        };
        let array = if &target == field.data_type() {
            Arc::clone(array)
        } else {
            cast(array, &target)?
        };
        fields.push(Field::new(field.name(), target, true));
        arrays.push(array);
    }

    if options.merge_schema {
        let order: Vec<usize> = order_by_stored(&fields, stored);
        fields = order.iter().map(|&i| fields[i].clone()).collect();
        arrays = order.iter().map(|&i| Arc::clone(&arrays[i])).collect();
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Stored columns in stored order, then the rest in their current order
fn order_by_stored(fields: &[Field], stored: &SchemaManifest) -> Vec<usize> {
    let position = |name: &str| stored.columns.iter().position(|c| c.name == name);
    let mut indices: Vec<usize> = (0..fields.len()).collect();
    indices.sort_by_key(|&i| match position(fields[i].name()) {
        Some(p) => (0, p, i),
        None => (1, 0, i),
    });
    indices
}

fn join(table_path: &str, file: &str) -> String {
    let table_path = table_path.trim_matches('/');
    if table_path.is_empty() {
        file.to_string()
    } else {
        format!("{table_path}/{file}")
    }
}
