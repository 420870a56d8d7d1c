//! Content sniffing for string cells

use crate::document::parse_datetime;
use crate::types::TargetType;
use chrono::{DateTime, Utc};

const TRUE_TOKENS: [&str; 3] = ["true", "1", "yes"];
const FALSE_TOKENS: [&str; 3] = ["false", "0", "no"];

/// Keep the numeric part of a cell
///
/// Everything but digits, the decimal point and signs is dropped, so
/// `"$1,200"`, `"7 pts"` and `"abc123"` all read as numbers. Text without a
/// digit has no numeric part.
fn numeric_part(text: &str) -> Option<String> {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
        .collect();
    kept.chars().any(|c| c.is_ascii_digit()).then_some(kept)
}

/// Read a cell as an integer; fractional values are truncated
pub fn parse_int(text: &str) -> Option<i64> {
    let numeric = numeric_part(text)?;
    if let Ok(i) = numeric.parse::<i64>() {
        return Some(i);
    }
    let f = numeric.parse::<f64>().ok()?;
    float_to_int(f)
}

/// Read a cell as a double
pub fn parse_float(text: &str) -> Option<f64> {
    numeric_part(text)?.parse::<f64>().ok()
}

/// Read a cell as a boolean token (`true/1/yes`, `false/0/no`)
pub fn parse_bool(text: &str) -> Option<bool> {
    let token = text.trim().to_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Some(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Read a cell as a timestamp; a bare integer is epoch seconds
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Some(ts) = parse_datetime(text) {
        return Some(ts);
    }
    text.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Guess the type of a string cell, `None` if it is plain text
///
/// Numbers win over the `1`/`0` boolean tokens.
pub fn sniff(text: &str) -> Option<TargetType> {
    if let Some(numeric) = numeric_part(text) {
        if numeric.parse::<i64>().is_ok() {
            return Some(TargetType::Integer);
        }
        if numeric.parse::<f64>().is_ok() {
            return Some(TargetType::Double);
        }
    }
    parse_bool(text).map(|_| TargetType::Boolean)
}

pub(crate) fn float_to_int(f: f64) -> Option<i64> {
    (f.is_finite() && f >= i64::MIN as f64 && f <= i64::MAX as f64).then(|| f.trunc() as i64)
}
