//! Error types for docflow
//!
//! This module defines the error hierarchy for the whole pipeline.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! The variants follow the pipeline's failure taxonomy:
//! - document errors are recovered by skipping the document
//! - transient sink errors are retried with backoff
//! - fatal sink errors (including exhausted retries) fail the collection
//! - configuration errors fail before any I/O happens

use std::time::Duration;
use thiserror::Error;

/// The main error type for docflow
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Missing secret '{key}' (env fallback '{env}' is empty)")]
    MissingSecret { key: String, env: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Source Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSONPath error: {message}")]
    JsonPath { message: String },

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("Source error for collection '{collection}': {message}")]
    Source { collection: String, message: String },

    // ============================================================================
    // Document / Schema Errors
    // ============================================================================
    #[error("Malformed document: {message}")]
    Document { message: String },

    // ============================================================================
    // Arrow/Parquet Errors
    // ============================================================================
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Output error: {message}")]
    Output { message: String },

    // ============================================================================
    // Sink Errors
    // ============================================================================
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] duckdb::Error),

    #[error("Transient failure in {sink} sink: {message}")]
    SinkTransient { sink: String, message: String },

    #[error("Fatal failure in {sink} sink: {message}")]
    SinkFatal { sink: String, message: String },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    // ============================================================================
    // Pipeline Errors
    // ============================================================================
    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    // ============================================================================
    // Template Errors
    // ============================================================================
    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a source error
    pub fn source_error(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Create a document error
    pub fn document(message: impl Into<String>) -> Self {
        Self::Document {
            message: message.into(),
        }
    }

    /// Create an output error
    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Create a transient sink error
    pub fn sink_transient(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkTransient {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Create a fatal sink error
    pub fn sink_fatal(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkFatal {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    /// Check if this error is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_)
            | Error::RateLimited { .. }
            | Error::Timeout { .. }
            | Error::SinkTransient { .. }
            | Error::Io(_) => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            Error::ObjectStore(e) => is_retryable_object_store(e),
            Error::Warehouse(e) => is_retryable_warehouse(e),
            _ => false,
        }
    }

    /// Delay the server asked for before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after_seconds } => {
                Some(Duration::from_secs(*retry_after_seconds))
            }
            _ => None,
        }
    }

    /// Check if this error is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config { .. }
                | Error::MissingConfigField { .. }
                | Error::InvalidConfigValue { .. }
                | Error::MissingSecret { .. }
        )
    }
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Object store failures are network-bound unless they describe a bad request
fn is_retryable_object_store(err: &object_store::Error) -> bool {
    !matches!(
        err,
        object_store::Error::NotFound { .. }
            | object_store::Error::InvalidPath { .. }
            | object_store::Error::NotSupported { .. }
            | object_store::Error::UnknownConfigurationKey { .. }
    )
}

/// DuckDB reports lock contention and I/O trouble only through the message text
fn is_retryable_warehouse(err: &duckdb::Error) -> bool {
    let message = err.to_string().to_lowercase();
    ["could not set lock", "conflict", "io error", "timeout", "connection"]
        .iter()
        .any(|needle| message.contains(needle))
}

/// Result type alias for docflow
pub type Result<T> = std::result::Result<T, Error>;
