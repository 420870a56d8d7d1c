//! Column naming
//!
//! Turns raw field paths into canonical column identifiers and keeps them
//! unique within a scope.
//!
//! # Rules
//!
//! A column name is uppercase, only uses `[0-9A-Z_]`, never starts with a
//! digit and is never empty. camelCase boundaries become underscores while
//! acronyms stay together:
//!
//! ```
//! use docflow::naming::sanitize;
//!
//! assert_eq!(sanitize("leadScore"), "LEAD_SCORE");
//! assert_eq!(sanitize("UUIDField"), "UUIDFIELD");
//! assert_eq!(sanitize("2fa.enabled"), "COL_2FA_ENABLED");
//! ```

mod registry;
mod sanitize;

pub use registry::NameRegistry;
pub use sanitize::{sanitize, BLANK_NAME, DIGIT_PREFIX};

/// Sanitize then uniquify in one step
pub fn unique_name(raw: &str, registry: &mut NameRegistry) -> String {
    registry.uniquify(&sanitize(raw))
}
