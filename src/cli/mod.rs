//! CLI module
//!
//! Command-line interface for running pipelines.
//!
//! # Commands
//!
//! - `run` - Ingest the configured collections
//! - `validate` - Check a pipeline file
//! - `flatten` - Print flattened rows of a JSON lines file

mod commands;
mod runner;

pub use commands::{parse_list, Cli, Commands, OutputFormat};
pub use runner::Runner;
