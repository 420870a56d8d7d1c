//! Document flattening
//!
//! Turns one nested document into a single-level mapping of column name to
//! scalar value. Object keys and sequence indices are joined with `.` and the
//! composed path is sanitized right away:
//!
//! ```text
//! {"a": {"b": 1}, "items": [{"sku": "x"}]}   ->   A_B = 1, ITEMS_0_SKU = "x"
//! ```
//!
//! Besides the leaves, a [`FlatDocument`] records every container it walked
//! through (name and struct/array kind) and, per leaf, the containers the leaf
//! descends from. The batch assembler needs both to rename shape collisions.

mod flattener;

pub use flattener::{flatten, FlatDocument, FlatField, Flattener, DEFAULT_MAX_DEPTH};

#[cfg(test)]
mod tests;
