//! Pipeline configuration
//!
//! A pipeline is described by one YAML file:
//!
//! ```yaml
//! collections: [orders, users]
//! batch_size: 5000
//! worker_concurrency: 4
//! source:
//!   type: data_api
//!   url: https://data.example.com/app/abc/endpoint/data/v1
//!   data_source: Cluster0
//!   database: shop
//!   api_key: { key: data-api-key, env: DATA_API_KEY }
//! file_sink:
//!   base: s3://lake/raw/
//! warehouse:
//!   path: warehouse.duckdb
//!   schema: staging
//! ```
//!
//! Everything is validated before any I/O happens.

use crate::coerce::{default_rules, TypeRule};
use crate::assemble::MetadataConfig;
use crate::error::{Error, Result};
use crate::flatten::DEFAULT_MAX_DEPTH;
use crate::http::RateLimiterConfig;
use crate::output::{ParquetWriterConfig, WriteOptions};
use crate::retry::RetryPolicy;
use crate::secrets::SecretRef;
use crate::source::DEFAULT_RECORDS_PATH;
use crate::template;
use crate::warehouse::DEFAULT_GENERIC_TYPE;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-Level Pipeline Config
// ============================================================================

/// Complete pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Collections to ingest, in order
    pub collections: Vec<String>,

    /// Documents per source page (and per batch)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batches flattened concurrently within a collection
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Collections processed concurrently
    #[serde(default = "default_collection_concurrency")]
    pub collection_concurrency: usize,

    /// Field the source is paged on
    #[serde(default = "default_sort_key")]
    pub sort_key: String,

    /// Cap the documents read per collection
    #[serde(default)]
    pub test_mode: bool,

    /// Cap used in test mode
    #[serde(default)]
    pub test_limit: Option<usize>,

    /// Directory of secret files, consulted before the environment
    #[serde(default)]
    pub secrets_dir: Option<PathBuf>,

    pub source: SourceConfig,

    #[serde(default)]
    pub file_sink: Option<FileSinkConfig>,

    #[serde(default)]
    pub warehouse: Option<WarehouseConfig>,

    /// Retry policy of both sinks
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub coerce: CoerceConfig,

    #[serde(default)]
    pub flatten: FlattenConfig,
}

fn default_batch_size() -> usize {
    100_000
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_collection_concurrency() -> usize {
    1
}

fn default_sort_key() -> String {
    "_id".to_string()
}

// ============================================================================
// Source Config
// ============================================================================

/// Where documents come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Atlas Data API endpoint
    DataApi {
        url: String,
        data_source: String,
        database: String,
        /// API key secret
        api_key: SecretRef,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
        #[serde(default)]
        rate_limit: Option<RateLimiterConfig>,
        /// Dotted path or JSONPath to the documents of a response
        #[serde(default = "default_records_path")]
        records_path: String,
    },
    /// `<dir>/<collection>.jsonl` exports
    Jsonl { dir: PathBuf },
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_records_path() -> String {
    DEFAULT_RECORDS_PATH.to_string()
}

// ============================================================================
// Sink Configs
// ============================================================================

/// Versioned file sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSinkConfig {
    /// Base URL: local directory, `s3://`, `r2://`, `gs://` or `az://`
    pub base: String,

    /// Table path under the base
    #[serde(default = "default_path_template")]
    pub path: String,

    /// Append `/<run_id>` to every table path
    #[serde(default)]
    pub run_suffix: bool,

    #[serde(default)]
    pub options: WriteOptions,

    #[serde(default)]
    pub parquet: ParquetWriterConfig,
}

fn default_path_template() -> String {
    "{{ collection }}".to_string()
}

/// Relational warehouse sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Database file; `:memory:` for a throwaway database
    pub path: String,

    #[serde(default = "default_schema")]
    pub schema: String,

    /// Table name; rendered and uppercased
    #[serde(default = "default_table_template")]
    pub table: String,

    /// Idle connections kept for reuse
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// SQL type of columns added to existing tables
    #[serde(default = "default_generic_type")]
    pub generic_type: String,
}

fn default_schema() -> String {
    "main".to_string()
}

fn default_table_template() -> String {
    "{{ collection }}".to_string()
}

fn default_pool_size() -> usize {
    4
}

fn default_generic_type() -> String {
    DEFAULT_GENERIC_TYPE.to_string()
}

// ============================================================================
// Stage Configs
// ============================================================================

/// Deduplication settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Candidate id columns; the first present one is used
    #[serde(default = "default_id_columns")]
    pub id_columns: Vec<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            id_columns: default_id_columns(),
        }
    }
}

fn default_id_columns() -> Vec<String> {
    crate::assemble::DEFAULT_ID_COLUMNS
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Type coercion settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoerceConfig {
    /// Infer types of string columns no rule matches
    #[serde(default)]
    pub sniff_strings: bool,

    /// Name rules, first match wins
    #[serde(default = "default_rules")]
    pub rules: Vec<TypeRule>,
}

impl Default for CoerceConfig {
    fn default() -> Self {
        Self {
            sniff_strings: false,
            rules: default_rules(),
        }
    }
}

/// Flattening settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenConfig {
    /// Containers nested deeper than this are kept as JSON text
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

// ============================================================================
// Loading and Validation
// ============================================================================

impl PipelineConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::config(format!(
                    "Failed to read config file '{}': {e}",
                    path.display()
                ))
            }
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse pipeline YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting that can be checked without I/O
    pub fn validate(&self) -> Result<()> {
        if self.collections.is_empty() {
            return Err(Error::missing_field("collections"));
        }
        let mut seen = HashSet::new();
        for name in &self.collections {
            if name.trim().is_empty() {
                return Err(Error::invalid_value("collections", "collection names cannot be empty"));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::invalid_value(
                    "collections",
                    format!("duplicate collection '{name}'"),
                ));
            }
        }

        positive("batch_size", self.batch_size)?;
        positive("worker_concurrency", self.worker_concurrency)?;
        positive("collection_concurrency", self.collection_concurrency)?;
        if self.sort_key.trim().is_empty() {
            return Err(Error::invalid_value("sort_key", "cannot be empty"));
        }

        if self.test_mode {
            match self.test_limit {
                None => return Err(Error::missing_field("test_limit")),
                Some(limit) => positive("test_limit", limit)?,
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::invalid_value("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(Error::invalid_value(
                "retry.initial_backoff_ms",
                "cannot exceed retry.max_backoff_ms",
            ));
        }

        self.validate_source()?;

        if self.file_sink.is_none() && self.warehouse.is_none() {
            return Err(Error::config("At least one of file_sink or warehouse is required"));
        }
        if let Some(file_sink) = &self.file_sink {
            if file_sink.base.trim().is_empty() {
                return Err(Error::missing_field("file_sink.base"));
            }
            check_env_template("file_sink.base", &file_sink.base)?;
            check_template("file_sink.path", &file_sink.path)?;
            positive("file_sink.parquet.row_group_size", file_sink.parquet.row_group_size())?;
        }
        if let Some(warehouse) = &self.warehouse {
            if warehouse.path.trim().is_empty() {
                return Err(Error::missing_field("warehouse.path"));
            }
            check_env_template("warehouse.path", &warehouse.path)?;
            if warehouse.schema.trim().is_empty() {
                return Err(Error::invalid_value("warehouse.schema", "cannot be empty"));
            }
            check_template("warehouse.table", &warehouse.table)?;
            positive("warehouse.pool_size", warehouse.pool_size)?;
            if warehouse.generic_type.trim().is_empty() {
                return Err(Error::invalid_value("warehouse.generic_type", "cannot be empty"));
            }
        }

        if self.dedup.id_columns.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::invalid_value("dedup.id_columns", "column names cannot be empty"));
        }
        if self.coerce.rules.iter().any(|r| r.tokens.is_empty()) {
            return Err(Error::invalid_value("coerce.rules", "every rule needs a token"));
        }
        positive("flatten.max_depth", self.flatten.max_depth)?;

        Ok(())
    }

    fn validate_source(&self) -> Result<()> {
        match &self.source {
            SourceConfig::DataApi {
                url,
                data_source,
                database,
                records_path,
                ..
            } => {
                url::Url::parse(url)
                    .map_err(|e| Error::invalid_value("source.url", e.to_string()))?;
                if data_source.trim().is_empty() {
                    return Err(Error::missing_field("source.data_source"));
                }
                if database.trim().is_empty() {
                    return Err(Error::missing_field("source.database"));
                }
                if records_path.trim().is_empty() {
                    return Err(Error::missing_field("source.records_path"));
                }
            }
            SourceConfig::Jsonl { dir } => {
                if dir.as_os_str().is_empty() {
                    return Err(Error::missing_field("source.dir"));
                }
            }
        }
        Ok(())
    }

    /// Documents to read from one collection, `None` for all
    pub fn record_cap(&self) -> Option<usize> {
        if self.test_mode {
            self.test_limit
        } else {
            None
        }
    }

    /// Keep only the named collections, in config order
    pub fn select_collections(&mut self, names: &[String]) -> Result<()> {
        for name in names {
            if !self.collections.contains(name) {
                return Err(Error::invalid_value(
                    "collections",
                    format!("'{name}' is not a configured collection"),
                ));
            }
        }
        self.collections.retain(|c| names.contains(c));
        Ok(())
    }
}

fn positive(field: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(Error::invalid_value(field, "must be greater than zero"));
    }
    Ok(())
}

/// Per-collection templates: `collection`, `run_id` and `env.*`
fn check_template(field: &str, value: &str) -> Result<()> {
    check_variables(field, value, &["collection", "run_id"])
}

/// Templates rendered once per pipeline: `env.*` only
fn check_env_template(field: &str, value: &str) -> Result<()> {
    check_variables(field, value, &[])
}

fn check_variables(field: &str, value: &str, known: &[&str]) -> Result<()> {
    for variable in template::extract_variables(value) {
        if !known.contains(&variable.as_str()) && !variable.starts_with("env.") {
            return Err(Error::invalid_value(
                field,
                format!("unknown template variable '{variable}'"),
            ));
        }
    }
    Ok(())
}
