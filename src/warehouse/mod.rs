//! Warehouse sink
//!
//! Loads assembled batches into relational tables whose schema evolves with
//! the data. One load is a single unit of work on one pooled connection:
//!
//! ```text
//!   CREATE SCHEMA IF NOT EXISTS
//!   introspect columns ──► none:   CREATE TABLE (typed) + INSERT
//!                     └──► some:   ALTER TABLE ADD (new columns, generic type)
//!                                  BEGIN; DELETE; INSERT (aligned); COMMIT
//! ```
//!
//! The unit is retried as a whole, which is safe because every load
//! replaces the table contents.

mod connection;
mod duckdb;
mod pool;
mod sink;

pub use self::duckdb::{DuckDbConnection, DuckDbConnector};
pub use connection::{quote_ident, LoadMode, TableRef, WarehouseConnection, WarehouseConnector};
pub use pool::ConnectionPool;
pub use sink::{align_to_table, new_columns, WarehouseSink, WarehouseWriteResult, DEFAULT_GENERIC_TYPE};
