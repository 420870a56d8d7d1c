//! Document model
//!
//! Raw documents arrive from the source as Extended JSON
//! ([`RawDocument`]). Before flattening they are converted into a tagged
//! [`DocValue`] tree so that every later stage switches on an explicit type
//! tag instead of relying on implicit JSON coercion.
//!
//! # Overview
//!
//! - [`DocValue`] - nested document tree (objects keep their source key order)
//! - [`Scalar`] - a leaf value produced by flattening
//! - [`ValueKind`] - the source kind of a value, used for collision suffixes
//! - [`TabularRow`] - one assembled row, column name to leaf value

mod extended_json;
mod value;

pub use extended_json::{decode_value, from_extended_json};
pub(crate) use extended_json::parse_datetime;
pub use value::{DocValue, Scalar, ValueKind};

/// A document exactly as the source returned it
pub type RawDocument = serde_json::Value;

/// One row after flattening and collision renaming
pub type TabularRow = std::collections::HashMap<String, Scalar>;
