//! Schema unification
//!
//! Two pieces live here:
//!
//! - [`SchemaUnifier`] - the set of column names seen so far for one
//!   collection, shared by every batch task of that collection
//! - [`resolve_collisions`] - the per-batch pass that gives a column name
//!   which occurs with different shapes or types one name per kind
//!
//! # Example
//!
//! ```text
//! doc 1: {"x": 1}          ->  X      ->  X_INT
//! doc 2: {"x": {"a": 2}}   ->  X_A    ->  X_STRUCT_A
//! ```

mod collision;
mod unifier;

pub use collision::{resolve_collisions, CollisionReport};
pub use unifier::{SchemaUnifier, SharedSchema};
