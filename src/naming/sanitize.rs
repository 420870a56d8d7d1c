//! Key sanitization

use regex::Regex;
use std::sync::LazyLock;

/// Name used when a key sanitizes to nothing
pub const BLANK_NAME: &str = "BLANK";

/// Prefix for names that would otherwise start with a digit
pub const DIGIT_PREFIX: &str = "COL_";

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9A-Za-z_]").unwrap());

/// Lowercase letter or digit followed by an uppercase letter
static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").unwrap());

static UNDERSCORE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{2,}").unwrap());

/// Map a raw key or field path to a canonical column name
///
/// Pure and idempotent: `sanitize(&sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw: &str) -> String {
    let name = NON_WORD.replace_all(raw, "_");
    let name = CAMEL_BOUNDARY.replace_all(&name, "${1}_${2}");
    let name = name.to_uppercase();
    let name = UNDERSCORE_RUN.replace_all(&name, "_");
    let name = name.trim_matches('_');

    if name.is_empty() {
        return BLANK_NAME.to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("{DIGIT_PREFIX}{name}");
    }
    name.to_string()
}
