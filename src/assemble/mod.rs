//! Batch assembly
//!
//! Takes raw source batches to one Arrow `RecordBatch` per flush. The work is
//! split in two halves so the flattening can fan out over a worker pool while
//! the schema-dependent steps run once, after every batch has been seen:
//!
//! ```text
//!   prepare (per batch, in a worker)      assemble (per flush)
//!   ---------------------------------     ------------------------------
//!   decode + flatten each document        backfill to the unified schema
//!   rename shape/type collisions          dedup on the id column
//!   local schema -> SchemaUnifier         coerce types
//!                                         attach metadata columns
//! ```

mod assembler;
mod metadata;

pub use assembler::{AssembledBatch, BatchAssembler, PreparedBatch, DEFAULT_ID_COLUMNS};
pub use metadata::{MetadataConfig, RunContext, METADATA_COLUMNS};

#[cfg(test)]
mod tests;
