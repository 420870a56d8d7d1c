//! Type resolution
//!
//! Decides the type of every column in an assembled batch and casts the
//! cells to it. Two strategies are combined:
//!
//! - **Name rules** - an ordered table of name tokens (`_COUNT`, `_DATE`,
//!   `_AMOUNT`, `_FLAG`, ...); the first rule whose token occurs in the
//!   uppercased column name decides the type
//! - **Content sniffing** - string cells are read as numbers or booleans
//!   when they look like one
//!
//! Columns without a rule keep the merged type of their values. Casting is
//! permissive: a cell that cannot be read as the target type becomes null.

mod resolver;
mod rules;
mod sniff;

pub use resolver::{CoercedColumn, TypeResolver};
pub use rules::{default_rules, TypeRule};
pub use sniff::{parse_bool, parse_float, parse_int, parse_timestamp, sniff};
