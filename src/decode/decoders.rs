//! Decoder implementations

use crate::error::{Error, Result};
use serde_json::Value;

/// Records decoded from one body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRecords {
    pub records: Vec<Value>,
    /// Lines or entries that could not be decoded and were skipped
    pub skipped: usize,
}

/// Trait for decoding payloads into records
pub trait RecordDecoder: Send + Sync {
    /// Decode a body into records
    fn decode(&self, body: &str) -> Result<DecodedRecords>;
}

// ============================================================================
// JSON Decoder
// ============================================================================

/// JSON decoder with optional record path extraction
#[derive(Debug, Clone, Default)]
pub struct JsonDecoder {
    /// Path to the record array, dotted (`documents`) or JSONPath (`$.data[*]`)
    record_path: Option<String>,
}

impl JsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JSON decoder with a record path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            record_path: Some(path.into()),
        }
    }

    pub fn record_path(&self) -> Option<&str> {
        self.record_path.as_deref()
    }

    /// Check that a dotted record path leads somewhere in `value`
    ///
    /// JSONPath expressions and the no-path case always resolve; an
    /// expression without matches simply yields no records.
    pub fn resolves(&self, value: &Value) -> bool {
        match &self.record_path {
            Some(path) if !path.contains('*') => lookup_simple_path(value, path).is_some(),
            _ => true,
        }
    }

    /// Extract records from an already parsed value
    pub fn extract(&self, value: Value) -> Result<Vec<Value>> {
        match &self.record_path {
            Some(path) if path.contains('*') => extract_with_jsonpath(&value, path),
            Some(path) => match extract_simple_path(value, path) {
                Some(Value::Array(items)) => Ok(items),
                Some(Value::Null) | None => Ok(Vec::new()),
                Some(other) => Ok(vec![other]),
            },
            None => match value {
                Value::Array(items) => Ok(items),
                other => Ok(vec![other]),
            },
        }
    }
}

impl RecordDecoder for JsonDecoder {
    fn decode(&self, body: &str) -> Result<DecodedRecords> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| Error::decode(format!("Failed to parse JSON: {e}")))?;
        Ok(DecodedRecords {
            records: self.extract(value)?,
            skipped: 0,
        })
    }
}

// ============================================================================
// JSONL Decoder
// ============================================================================

/// JSON Lines decoder (one document per line)
///
/// A line that fails to parse is a malformed document: it is logged and
/// skipped unless the decoder is strict.
#[derive(Debug, Clone, Default)]
pub struct JsonlDecoder {
    strict: bool,
}

impl JsonlDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail on the first malformed line instead of skipping it
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

impl RecordDecoder for JsonlDecoder {
    fn decode(&self, body: &str) -> Result<DecodedRecords> {
        let mut decoded = DecodedRecords::default();

        for (line_num, line) in body.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(line) {
                Ok(value) => decoded.records.push(value),
                Err(e) if self.strict => {
                    return Err(Error::decode(format!(
                        "Failed to parse JSONL at line {}: {e}",
                        line_num + 1
                    )));
                }
                Err(e) => {
                    tracing::warn!(line = line_num + 1, error = %e, "Skipping malformed JSONL line");
                    decoded.skipped += 1;
                }
            }
        }

        Ok(decoded)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Follow a dotted path such as `data.items` or `$.documents`
fn extract_simple_path(value: Value, path: &str) -> Option<Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    let mut current = value;
    for part in path.split('.').filter(|p| !p.is_empty()) {
        current = match current {
            Value::Object(mut map) => map.remove(part)?,
            _ => return None,
        };
    }
    Some(current)
}

fn lookup_simple_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    path.split('.')
        .filter(|p| !p.is_empty())
        .try_fold(value, |current, part| current.get(part))
}

/// Extract records using jsonpath-rust
fn extract_with_jsonpath(value: &Value, path: &str) -> Result<Vec<Value>> {
    use jsonpath_rust::JsonPath;

    let jp = JsonPath::try_from(path).map_err(|e| Error::JsonPath {
        message: format!("Invalid JSONPath: {e}"),
    })?;

    match jp.find(value) {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Ok(vec![other]),
    }
}
