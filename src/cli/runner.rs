//! CLI runner - executes commands

use crate::assemble::RunContext;
use crate::cli::commands::{parse_list, Cli, Commands, OutputFormat};
use crate::config::PipelineConfig;
use crate::decode::{JsonlDecoder, RecordDecoder};
use crate::engine::{shutdown_channel, CollectionReport, Pipeline, RunReport};
use crate::error::{Error, Result};
use crate::flatten::Flattener;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run {
                config,
                collections,
                test_limit,
            } => {
                self.run_pipeline(config, collections.as_deref(), *test_limit)
                    .await
            }
            Commands::Validate { config } => self.validate(config),
            Commands::Flatten { file, max_depth } => self.flatten(file, *max_depth),
        }
    }

    /// Load a pipeline file and apply command-line overrides
    fn load_config(
        &self,
        path: &Path,
        collections: Option<&str>,
        test_limit: Option<usize>,
    ) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(path)?;
        if let Some(collections) = collections {
            let selected = parse_list(collections);
            if !selected.is_empty() {
                config.select_collections(&selected)?;
            }
        }
        if let Some(limit) = test_limit {
            config.test_mode = true;
            config.test_limit = Some(limit);
            config.validate()?;
        }
        Ok(config)
    }

    /// Ingest every selected collection
    async fn run_pipeline(
        &self,
        path: &Path,
        collections: Option<&str>,
        test_limit: Option<usize>,
    ) -> Result<()> {
        let config = self.load_config(path, collections, test_limit)?;
        let pipeline = Pipeline::from_config(&config)?;
        let run = RunContext::start();

        let (shutdown, signal) = shutdown_channel();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after in-flight writes");
                let _ = shutdown.send(true);
            }
        });

        let report = pipeline.run(&config.collections, &run, signal).await;
        for collection in &report.collections {
            self.output_message(&collection_message(collection));
        }
        self.output_message(&run_message(&report));

        let failed = report.failed().count();
        if failed > 0 {
            return Err(Error::Other(format!(
                "{failed} of {} collections failed",
                report.collections.len()
            )));
        }
        Ok(())
    }

    /// Validate a pipeline file
    fn validate(&self, path: &Path) -> Result<()> {
        let config = PipelineConfig::load(path)?;

        let mut sinks = Vec::new();
        if config.file_sink.is_some() {
            sinks.push("file");
        }
        if config.warehouse.is_some() {
            sinks.push("warehouse");
        }

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Pipeline is valid with {} collections and sinks: {}",
                    config.collections.len(),
                    sinks.join(", ")
                )
            }
        }));

        Ok(())
    }

    /// Print one flattened row per document
    fn flatten(&self, file: &Path, max_depth: Option<usize>) -> Result<()> {
        let content = fs::read_to_string(file).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: file.display().to_string(),
                }
            } else {
                Error::Io(e)
            }
        })?;

        let decoded = JsonlDecoder::new().decode(&content)?;
        let mut flattener = Flattener::new();
        if let Some(depth) = max_depth {
            flattener = flattener.with_max_depth(depth);
        }

        let mut skipped = decoded.skipped;
        for (index, doc) in decoded.records.iter().enumerate() {
            match flattener.flatten_raw(doc) {
                Ok(flat) => self.output_message(&flat.to_json()),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Skipping malformed document");
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, "Some documents could not be flattened");
        }
        Ok(())
    }

    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

fn collection_message(report: &CollectionReport) -> Value {
    let stats = &report.stats;
    json!({
        "type": "COLLECTION",
        "collection": report.collection,
        "state": report.state.to_string(),
        "stats": {
            "documents_total": stats.documents_total,
            "documents_read": stats.documents_read,
            "pages": stats.pages,
            "batches": stats.batches,
            "skipped": stats.skipped,
            "renamed": stats.renamed,
            "duplicates": stats.duplicates,
            "rows": stats.rows,
            "columns": stats.columns,
            "duration_ms": stats.duration_ms,
        },
        "file": report.file.as_ref().map(|f| json!({
            "location": f.location,
            "version": f.version,
        })),
        "warehouse": report.warehouse.as_ref().map(|w| json!({
            "table": w.table.to_string(),
            "created": w.created,
            "added_columns": w.added_columns,
        })),
        "error": report.error.as_ref().map(ToString::to_string),
        "secondary_error": report.secondary_error.as_ref().map(ToString::to_string),
    })
}

fn run_message(report: &RunReport) -> Value {
    json!({
        "type": "RUN",
        "run_id": report.run_id,
        "success": report.is_success(),
        "collections": report.collections.len(),
        "failed": report.failed().map(|c| c.collection.as_str()).collect::<Vec<_>>(),
        "rows": report.total_rows(),
        "duration_ms": report.duration_ms,
    })
}
