// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # docflow
//!
//! Schema-normalizing ingestion for semi-structured documents. Collections
//! are paged out of a document store, flattened into single-level rows,
//! unified into one evolving column set and written to a versioned file
//! sink and a relational warehouse.
//!
//! ## Features
//!
//! - **Flattening**: nested objects and arrays become sanitized `A_B_0_C` columns
//! - **Schema Unification**: every batch of a collection shares one growing column set
//! - **Collision Suffixing**: a name seen with several shapes becomes `X_INT`, `X_STRUCT_A`, ...
//! - **Type Coercion**: name rules and content sniffing produce typed Arrow columns
//! - **Schema Evolution**: new columns are added to warehouse tables in place
//! - **Retry**: sink writes are idempotent units with bounded exponential backoff
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docflow::{PipelineConfig, Pipeline, RunContext};
//! use docflow::engine::shutdown_channel;
//!
//! #[tokio::main]
//! async fn main() -> docflow::Result<()> {
//!     let config = PipelineConfig::load("pipeline.yaml")?;
//!     let pipeline = Pipeline::from_config(&config)?;
//!
//!     let (_stop, signal) = shutdown_channel();
//!     let report = pipeline.run(&config.collections, &RunContext::start(), signal).await;
//!     println!("{} rows written", report.total_rows());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          Pipeline Driver                          │
//! │   page source ─► worker pool ─► barrier ─► assemble ─► sinks      │
//! └───────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌──────────┬───────────┬─────────┴─────┬─────────────┬──────────────┐
//! │  Source  │  Flatten  │    Schema     │   Coerce    │    Sinks     │
//! ├──────────┼───────────┼───────────────┼─────────────┼──────────────┤
//! │ Data API │ Sanitize  │ Unifier       │ Name rules  │ Parquet file │
//! │ JSONL    │ Uniquify  │ Collisions    │ Sniffing    │ DuckDB       │
//! │ Memory   │ Max depth │               │ Metadata    │ Retry, Pool  │
//! └──────────┴───────────┴───────────────┴─────────────┴──────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Tagged document model and Extended JSON decoding
pub mod document;

/// Column name sanitizing and uniquifying
pub mod naming;

/// Document flattening
pub mod flatten;

/// Schema unification and collision renaming
pub mod schema;

/// Column type resolution
pub mod coerce;

/// Batch assembly and metadata columns
pub mod assemble;

/// Retry and timing wrappers
pub mod retry;

/// HTTP client with retry and rate limiting
pub mod http;

/// Response decoders (JSON, JSON lines)
pub mod decode;

/// Document sources
pub mod source;

/// Versioned file sink
pub mod output;

/// Relational warehouse sink
pub mod warehouse;

/// Secret lookup
pub mod secrets;

/// Template interpolation
pub mod template;

/// Pipeline configuration
pub mod config;

/// Pipeline driver
pub mod engine;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use assemble::{BatchAssembler, RunContext};
pub use config::PipelineConfig;
pub use engine::{Pipeline, RunReport};
pub use flatten::Flattener;
pub use naming::sanitize;
pub use schema::SchemaUnifier;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
