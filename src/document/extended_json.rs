//! Extended JSON decoding
//!
//! Document stores export typed values (object ids, dates, 64-bit integers,
//! binary) as single-key wrapper objects such as `{"$oid": "..."}` or
//! `{"$date": {"$numberLong": "..."}}`. Both the relaxed and the canonical
//! forms are accepted.

use super::value::DocValue;
use crate::error::{Error, Result};
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

/// Convert a source document into a tagged tree
///
/// The root must be an object; anything else is a malformed document.
pub fn from_extended_json(raw: &Value) -> Result<DocValue> {
    match raw {
        Value::Object(_) => convert(raw),
        other => Err(Error::document(format!(
            "document root must be an object, got {}",
            json_type_name(other)
        ))),
    }
}

/// Convert any value, such as a filter operand, into a tagged tree
pub fn decode_value(value: &Value) -> Result<DocValue> {
    convert(value)
}

fn convert(value: &Value) -> Result<DocValue> {
    match value {
        Value::Null => Ok(DocValue::Null),
        Value::Bool(b) => Ok(DocValue::Bool(*b)),
        Value::Number(n) => Ok(number_to_doc(n)),
        Value::String(s) => Ok(DocValue::String(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(convert)
            .collect::<Result<Vec<_>>>()
            .map(DocValue::Array),
        Value::Object(map) => {
            if let Some(wrapped) = convert_wrapper(map)? {
                return Ok(wrapped);
            }
            let mut fields = Vec::with_capacity(map.len());
            for (key, val) in map {
                fields.push((key.clone(), convert(val)?));
            }
            Ok(DocValue::Object(fields))
        }
    }
}

fn number_to_doc(n: &serde_json::Number) -> DocValue {
    if let Some(i) = n.as_i64() {
        DocValue::Int(i)
    } else if let Some(u) = n.as_u64() {
        // Above i64::MAX: keep precision as text rather than wrapping
        DocValue::String(u.to_string())
    } else {
        DocValue::Float(n.as_f64().unwrap_or(f64::NAN))
    }
}

/// Decode a single-key `$type` wrapper, or `None` for an ordinary object
fn convert_wrapper(map: &Map<String, Value>) -> Result<Option<DocValue>> {
    let Some((key, inner)) = single_dollar_key(map) else {
        // $binary in the legacy form carries a sibling $type key
        if map.len() == 2 && map.contains_key("$binary") && map.contains_key("$type") {
            return decode_binary(&map["$binary"]).map(Some);
        }
        return Ok(None);
    };

    let value = match key {
        "$oid" | "$symbol" | "$uuid" => DocValue::String(expect_str(key, inner)?.to_string()),
        "$numberLong" | "$numberInt" => {
            let text = expect_str(key, inner)?;
            let parsed = text
                .parse::<i64>()
                .map_err(|e| Error::document(format!("invalid {key} '{text}': {e}")))?;
            DocValue::Int(parsed)
        }
        "$numberDouble" | "$numberDecimal" => {
            let text = expect_str(key, inner)?;
            let parsed = match text {
                "Infinity" => f64::INFINITY,
                "-Infinity" => f64::NEG_INFINITY,
                "NaN" => f64::NAN,
                _ => text
                    .parse::<f64>()
                    .map_err(|e| Error::document(format!("invalid {key} '{text}': {e}")))?,
            };
            DocValue::Float(parsed)
        }
        "$date" => DocValue::Timestamp(decode_date(inner)?),
        "$timestamp" => {
            let secs = inner
                .get("t")
                .and_then(Value::as_i64)
                .ok_or_else(|| Error::document("$timestamp requires integer field 't'"))?;
            let ts = DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| Error::document(format!("$timestamp out of range: {secs}")))?;
            DocValue::Timestamp(ts)
        }
        "$binary" => decode_binary(inner)?,
        "$regularExpression" => DocValue::String(
            inner
                .get("pattern")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        "$minKey" | "$maxKey" | "$undefined" => DocValue::Null,
        // Any other dollar key is kept as a regular field
        _ => return Ok(None),
    };

    Ok(Some(value))
}

fn single_dollar_key(map: &Map<String, Value>) -> Option<(&str, &Value)> {
    if map.len() != 1 {
        return None;
    }
    let (key, value) = map.iter().next()?;
    key.starts_with('$').then_some((key.as_str(), value))
}

fn expect_str<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::document(format!("{key} expects a string, got {}", json_type_name(value))))
}

fn decode_date(inner: &Value) -> Result<DateTime<Utc>> {
    match inner {
        Value::String(s) => parse_datetime(s)
            .ok_or_else(|| Error::document(format!("invalid $date string '{s}'"))),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| Error::document(format!("invalid $date millis {n}"))),
        Value::Object(map) => {
            let millis = map
                .get("$numberLong")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| Error::document("$date object requires $numberLong"))?;
            DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| Error::document(format!("invalid $date millis {millis}")))
        }
        other => Err(Error::document(format!(
            "invalid $date payload of type {}",
            json_type_name(other)
        ))),
    }
}

fn decode_binary(inner: &Value) -> Result<DocValue> {
    let encoded = match inner {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map
            .get("base64")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::document("$binary requires a base64 field"))?,
        other => {
            return Err(Error::document(format!(
                "invalid $binary payload of type {}",
                json_type_name(other)
            )))
        }
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map(DocValue::Binary)
        .map_err(|e| Error::document(format!("invalid $binary base64: {e}")))
}

/// Parse the date-time spellings seen in exported documents
pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
