//! Find queries and their in-memory evaluation

use crate::document::{decode_value, DocValue, RawDocument};
use crate::error::{Error, Result};
use crate::types::{JsonObject, JsonValue};
use serde_json::json;
use std::cmp::Ordering;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Single-field sort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    /// Sort document, e.g. `{"_id": 1}`
    pub fn to_json(&self) -> JsonValue {
        let direction = match self.order {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        };
        let mut map = JsonObject::new();
        map.insert(self.field.clone(), json!(direction));
        JsonValue::Object(map)
    }
}

/// Arguments of a `find` call
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    /// Filter document; an empty object matches everything
    pub filter: JsonValue,
    pub sort: Option<SortKey>,
    pub limit: Option<usize>,
}

impl Default for FindQuery {
    fn default() -> Self {
        Self {
            filter: JsonValue::Object(JsonObject::new()),
            sort: None,
            limit: None,
        }
    }
}

impl FindQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next page after `last_seen`, ascending on `sort_key`
    pub fn page(sort_key: &str, last_seen: Option<&JsonValue>, limit: usize) -> Self {
        let mut filter = JsonObject::new();
        if let Some(value) = last_seen {
            filter.insert(sort_key.to_string(), json!({ "$gt": value }));
        }
        Self {
            filter: JsonValue::Object(filter),
            sort: Some(SortKey::ascending(sort_key)),
            limit: Some(limit),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: JsonValue) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluate against documents held in memory
    pub fn apply(&self, docs: &[RawDocument]) -> Result<Vec<RawDocument>> {
        let mut matched = Vec::new();
        for doc in docs {
            if matches_filter(doc, &self.filter)? {
                matched.push(doc.clone());
            }
        }

        if let Some(sort) = &self.sort {
            let mut indexed: Vec<(Option<DocValue>, RawDocument)> = Vec::with_capacity(matched.len());
            for doc in matched {
                match sort_value(&doc, &sort.field) {
                    Ok(key) => indexed.push((key, doc)),
                    Err(e) => {
                        tracing::warn!(field = %sort.field, error = %e, "Skipping document with malformed sort key");
                    }
                }
            }
            indexed.sort_by(|(a, _), (b, _)| {
                let ordering = compare_optional(a.as_ref(), b.as_ref());
                match sort.order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
            matched = indexed.into_iter().map(|(_, doc)| doc).collect();
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}

/// Check a document against a filter of field conditions
///
/// Supports equality and `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte` on
/// top-level fields. A document field that fails to decode never matches;
/// a malformed filter is an error.
pub fn matches_filter(doc: &RawDocument, filter: &JsonValue) -> Result<bool> {
    let Some(conditions) = filter.as_object() else {
        return Err(Error::invalid_value("filter", "filter must be an object"));
    };

    for (field, condition) in conditions {
        let actual = match doc.get(field).map(decode_value).transpose() {
            Ok(actual) => actual,
            Err(e) => {
                tracing::warn!(field = %field, error = %e, "Skipping document with malformed field");
                return Ok(false);
            }
        };
        if !matches_condition(actual.as_ref(), condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_condition(actual: Option<&DocValue>, condition: &JsonValue) -> Result<bool> {
    let operators = match condition.as_object() {
        Some(map) if map.keys().any(|k| is_operator(k)) => map,
        _ => {
            let expected = decode_value(condition)?;
            return Ok(actual == Some(&expected));
        }
    };

    for (op, operand) in operators {
        let operand = decode_value(operand)?;
        let ordering = actual.and_then(|a| compare_values(a, &operand));
        let pass = match op.as_str() {
            "$eq" => actual == Some(&operand),
            "$ne" => actual != Some(&operand),
            "$gt" => ordering == Some(Ordering::Greater),
            "$gte" => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            "$lt" => ordering == Some(Ordering::Less),
            "$lte" => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            other => {
                return Err(Error::invalid_value(
                    "filter",
                    format!("unsupported operator {other}"),
                ))
            }
        };
        if !pass {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Comparison operators, as opposed to Extended JSON wrappers like `$oid`
fn is_operator(key: &str) -> bool {
    matches!(key, "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte")
}

/// Order two values of comparable kinds
///
/// Integers and doubles compare numerically; values of unrelated kinds
/// have no order.
pub fn compare_values(a: &DocValue, b: &DocValue) -> Option<Ordering> {
    match (a, b) {
        (DocValue::Int(x), DocValue::Int(y)) => Some(x.cmp(y)),
        (DocValue::Int(x), DocValue::Float(y)) => (*x as f64).partial_cmp(y),
        (DocValue::Float(x), DocValue::Int(y)) => x.partial_cmp(&(*y as f64)),
        (DocValue::Float(x), DocValue::Float(y)) => x.partial_cmp(y),
        (DocValue::String(x), DocValue::String(y)) => Some(x.cmp(y)),
        (DocValue::Timestamp(x), DocValue::Timestamp(y)) => Some(x.cmp(y)),
        (DocValue::Bool(x), DocValue::Bool(y)) => Some(x.cmp(y)),
        (DocValue::Binary(x), DocValue::Binary(y)) => Some(x.cmp(y)),
        (DocValue::Null, DocValue::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn sort_value(doc: &RawDocument, field: &str) -> Result<Option<DocValue>> {
    doc.get(field).map(decode_value).transpose()
}

/// Missing values sort first, as nulls do in a document store
fn compare_optional(a: Option<&DocValue>, b: Option<&DocValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
    }
}
