//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// docflow: flatten document collections into evolving tables
#[derive(Parser, Debug)]
#[command(name = "docflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline
    Run {
        /// Pipeline file (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Collections to run (comma-separated, empty = all configured)
        #[arg(long)]
        collections: Option<String>,

        /// Read at most this many documents per collection
        #[arg(long)]
        test_limit: Option<usize>,
    },

    /// Validate a pipeline file without touching the source or sinks
    Validate {
        /// Pipeline file (YAML)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the flattened rows of a JSON lines file
    Flatten {
        /// Input file, one document per line
        file: PathBuf,

        /// Containers nested deeper than this are kept as JSON text
        #[arg(long)]
        max_depth: Option<usize>,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

/// Split a comma-separated list, dropping blanks
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
