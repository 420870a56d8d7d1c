//! Pipeline driver
//!
//! Pages every collection out of the source, prepares the pages on a
//! bounded worker pool and flushes each collection to the sinks once.
//!
//! # Flow per collection
//!
//! ```text
//!            find(_id > last, limit)          spawn_blocking(prepare)
//!  source ───────────────────────────► page ─────────────────────────► PreparedBatch
//!    ▲                                   │                                   │
//!    └──────────── next page ◄───────────┘            coordinator: observe() │
//!                                                                            ▼
//!  empty page ──► wait for every worker ──► snapshot ──► assemble ──► file sink
//!                                                                 └─► warehouse
//! ```
//!
//! Within a collection the flush waits for every batch, so the snapshot it
//! backfills against holds every column any batch produced. Collections run
//! concurrently up to `collection_concurrency` and fail independently.

mod build;
mod types;

pub use types::{
    CollectionReport, CollectionState, CollectionStats, PipelineSettings, RunReport,
};

use crate::assemble::{AssembledBatch, BatchAssembler, PreparedBatch, RunContext};
use crate::error::{Error, Result};
use crate::output::{FileSink, FileWriteResult, WriteOptions};
use crate::retry::{retry, timed, RetryPolicy};
use crate::schema::{SchemaUnifier, SharedSchema};
use crate::source::{DocumentSource, FindQuery};
use crate::template::{self, TemplateContext};
use crate::types::{JsonObject, JsonValue};
use crate::warehouse::{TableRef, WarehouseSink, WarehouseWriteResult};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

/// Default table path and table name template
pub const DEFAULT_TABLE_TEMPLATE: &str = "{{ collection }}";

/// Sender half used to stop a running pipeline
pub type ShutdownSender = watch::Sender<bool>;

/// Receiver half handed to [`Pipeline::run`]
pub type ShutdownSignal = watch::Receiver<bool>;

/// Create a shutdown channel; send `true` to stop
pub fn shutdown_channel() -> (ShutdownSender, ShutdownSignal) {
    watch::channel(false)
}

// ============================================================================
// Sink Targets
// ============================================================================

/// File sink and the table path each collection is written to
#[derive(Clone)]
pub struct FileTarget {
    sink: Arc<dyn FileSink>,
    path: String,
    run_suffix: bool,
    options: WriteOptions,
}

impl FileTarget {
    pub fn new(sink: Arc<dyn FileSink>) -> Self {
        Self {
            sink,
            path: DEFAULT_TABLE_TEMPLATE.to_string(),
            run_suffix: false,
            options: WriteOptions::default(),
        }
    }

    /// Set the table path template
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Append `/<run_id>` to every table path
    #[must_use]
    pub fn with_run_suffix(mut self, enabled: bool) -> Self {
        self.run_suffix = enabled;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    /// Table path of one collection
    pub fn table_path(&self, ctx: &TemplateContext, run_id: &str) -> Result<String> {
        let path = template::render(&self.path, ctx)?;
        if self.run_suffix {
            Ok(format!("{}/{run_id}", path.trim_end_matches('/')))
        } else {
            Ok(path)
        }
    }
}

/// Warehouse sink and the table each collection is loaded into
#[derive(Debug, Clone)]
pub struct WarehouseTarget {
    sink: Arc<WarehouseSink>,
    schema: String,
    table: String,
}

impl WarehouseTarget {
    pub fn new(sink: Arc<WarehouseSink>, schema: impl Into<String>) -> Self {
        Self {
            sink,
            schema: schema.into(),
            table: DEFAULT_TABLE_TEMPLATE.to_string(),
        }
    }

    /// Set the table name template
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Table of one collection; names are uppercased
    pub fn table_ref(&self, ctx: &TemplateContext) -> Result<TableRef> {
        let name = template::render(&self.table, ctx)?;
        Ok(TableRef::new(self.schema.clone(), name.to_uppercase()))
    }

    pub fn sink(&self) -> &Arc<WarehouseSink> {
        &self.sink
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Drives collections from a source into the configured sinks
pub struct Pipeline {
    source: Arc<dyn DocumentSource>,
    assembler: Arc<BatchAssembler>,
    settings: PipelineSettings,
    file: Option<FileTarget>,
    warehouse: Option<WarehouseTarget>,
    retry: RetryPolicy,
    /// Sequence number of the last dispatched batch, shared by all collections
    batch_counter: AtomicU64,
}

impl Pipeline {
    /// Create a pipeline with default settings and no sinks
    pub fn new(source: Arc<dyn DocumentSource>) -> Self {
        Self {
            source,
            assembler: Arc::new(BatchAssembler::new()),
            settings: PipelineSettings::default(),
            file: None,
            warehouse: None,
            retry: RetryPolicy::default(),
            batch_counter: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_assembler(mut self, assembler: BatchAssembler) -> Self {
        self.assembler = Arc::new(assembler);
        self
    }

    #[must_use]
    pub fn with_file_target(mut self, target: FileTarget) -> Self {
        self.file = Some(target);
        self
    }

    #[must_use]
    pub fn with_warehouse_target(mut self, target: WarehouseTarget) -> Self {
        self.warehouse = Some(target);
        self
    }

    /// Retry policy of file sink writes
    ///
    /// The warehouse sink carries its own policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Check if any sink is configured
    pub fn has_sinks(&self) -> bool {
        self.file.is_some() || self.warehouse.is_some()
    }

    /// Run the given collections to completion or until `shutdown` fires
    ///
    /// A failing collection is reported and does not stop the others.
    pub async fn run(
        &self,
        collections: &[String],
        run: &RunContext,
        shutdown: ShutdownSignal,
    ) -> RunReport {
        let start = Instant::now();
        tracing::info!(
            run_id = %run.run_id,
            collections = collections.len(),
            concurrency = self.settings.collection_concurrency,
            "Starting pipeline run"
        );

        let mut reports: Vec<CollectionReport> = stream::iter(collections.iter().cloned())
            .map(|collection| self.run_collection(collection, run, shutdown.clone()))
            .buffer_unordered(self.settings.collection_concurrency.max(1))
            .collect()
            .await;
        reports.sort_by_key(|r| collections.iter().position(|c| *c == r.collection));

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        let report = RunReport {
            run_id: run.run_id.clone(),
            collections: reports,
            duration_ms,
        };
        tracing::info!(
            run_id = %report.run_id,
            rows = report.total_rows(),
            failed = report.failed().count(),
            duration_ms = report.duration_ms,
            "Finished pipeline run"
        );
        report
    }

    async fn run_collection(
        &self,
        collection: String,
        run: &RunContext,
        mut shutdown: ShutdownSignal,
    ) -> CollectionReport {
        let start = Instant::now();
        let mut report = CollectionReport::new(collection);
        let outcome = self.ingest(&mut report, run, &mut shutdown).await;
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        report.stats.duration_ms = duration_ms;

        match outcome {
            Ok(()) => {
                report.transition(CollectionState::Done);
                tracing::info!(
                    collection = %report.collection,
                    read = report.stats.documents_read,
                    rows = report.stats.rows,
                    duplicates = report.stats.duplicates,
                    skipped = report.stats.skipped,
                    duration_ms = report.stats.duration_ms,
                    "Collection done"
                );
            }
            Err(e) => {
                tracing::error!(
                    collection = %report.collection,
                    state = %report.state,
                    error = %e,
                    "Collection failed"
                );
                report.fail(e);
            }
        }
        report
    }

    async fn ingest(
        &self,
        report: &mut CollectionReport,
        run: &RunContext,
        shutdown: &mut ShutdownSignal,
    ) -> Result<()> {
        report.transition(CollectionState::Paging);
        let collection = report.collection.clone();
        let total = self
            .source
            .count(&collection, &JsonValue::Object(JsonObject::new()))
            .await?;
        report.stats.documents_total = total;
        tracing::info!(
            collection = %collection,
            total,
            cap = ?self.settings.record_cap,
            "Reading collection"
        );

        let schema = SchemaUnifier::shared();
        let prepared = self.page_and_prepare(report, &schema, shutdown).await?;

        let rows: usize = prepared.iter().map(|b| b.rows.len()).sum();
        if rows == 0 {
            tracing::info!(collection = %collection, "No rows to write");
            return Ok(());
        }

        report.transition(CollectionState::Flushing);
        if *shutdown.borrow() {
            return Err(Error::Cancelled);
        }
        let snapshot = schema.snapshot().await;
        let assembler = Arc::clone(&self.assembler);
        let run_ctx = run.clone();
        let assembled =
            tokio::task::spawn_blocking(move || assembler.assemble(prepared, &snapshot, &run_ctx))
                .await??;
        report.stats.duplicates = assembled.duplicates;
        report.stats.rows = assembled.num_rows();
        report.stats.columns = assembled.batch.num_columns();

        let ctx = TemplateContext::for_collection(&collection, &run.run_id);
        let (file, warehouse) = tokio::join!(
            self.write_file(&ctx, &run.run_id, &assembled),
            self.write_warehouse(&ctx, &assembled)
        );
        let file_error = match file {
            Ok(result) => {
                report.file = result;
                None
            }
            Err(e) => Some(e),
        };
        let warehouse_error = match warehouse {
            Ok(result) => {
                report.warehouse = result;
                None
            }
            Err(e) => Some(e),
        };
        match (file_error, warehouse_error) {
            (Some(file), Some(warehouse)) => {
                tracing::error!(
                    collection = %collection,
                    error = %warehouse,
                    "Warehouse write failed alongside the file write"
                );
                report.secondary_error = Some(warehouse);
                Err(file)
            }
            (Some(e), None) | (None, Some(e)) => Err(e),
            (None, None) => Ok(()),
        }
    }

    /// Page the collection, preparing each page on the worker pool
    ///
    /// Returns once every page has been read and every worker has reported.
    async fn page_and_prepare(
        &self,
        report: &mut CollectionReport,
        schema: &SharedSchema,
        shutdown: &mut ShutdownSignal,
    ) -> Result<Vec<PreparedBatch>> {
        let collection = report.collection.clone();
        let sort_key = self.settings.sort_key.as_str();
        let semaphore = Arc::new(Semaphore::new(self.settings.worker_concurrency.max(1)));
        let mut workers: JoinSet<PreparedBatch> = JoinSet::new();
        let mut prepared = Vec::new();
        let mut last_seen: Option<JsonValue> = None;

        loop {
            if *shutdown.borrow() {
                return Err(Error::Cancelled);
            }

            let limit = match self.settings.record_cap {
                Some(cap) => cap
                    .saturating_sub(report.stats.documents_read)
                    .min(self.settings.batch_size),
                None => self.settings.batch_size,
            };
            if limit == 0 {
                break;
            }

            let query = FindQuery::page(sort_key, last_seen.as_ref(), limit);
            let page = tokio::select! {
                page = self.source.find(&collection, &query) => page?,
                () = cancelled(shutdown) => return Err(Error::Cancelled),
            };
            if page.is_empty() {
                break;
            }

            let last = page
                .last()
                .and_then(|doc| doc.get(sort_key))
                .cloned()
                .ok_or_else(|| {
                    Error::source_error(
                        &collection,
                        format!("page ends with a document without sort key '{sort_key}'"),
                    )
                })?;
            last_seen = Some(last);
            report.stats.pages += 1;
            report.stats.documents_read += page.len();
            report.transition(CollectionState::BatchReady);

            let batch_id = self.batch_counter.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!(
                collection = %collection,
                batch_id,
                documents = page.len(),
                read = report.stats.documents_read,
                "Fetched page"
            );

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|_| Error::Cancelled)?;
            let assembler = Arc::clone(&self.assembler);
            workers.spawn_blocking(move || {
                let _permit = permit;
                assembler.prepare(batch_id, &page)
            });
            report.transition(CollectionState::Assembling);

            while let Some(done) = workers.try_join_next() {
                self.absorb(report, schema, done?, &mut prepared).await;
            }
            report.transition(CollectionState::Paging);
        }

        report.transition(CollectionState::Assembling);
        while let Some(done) = workers.join_next().await {
            self.absorb(report, schema, done?, &mut prepared).await;
        }
        Ok(prepared)
    }

    /// Union a finished batch into the collection schema
    async fn absorb(
        &self,
        report: &mut CollectionReport,
        schema: &SharedSchema,
        batch: PreparedBatch,
        prepared: &mut Vec<PreparedBatch>,
    ) {
        let added = self.assembler.register(&batch, schema).await;
        report.stats.batches += 1;
        report.stats.skipped += batch.skipped;
        report.stats.renamed += batch.collisions.renamed;
        tracing::debug!(
            collection = %report.collection,
            batch_id = batch.batch_id,
            rows = batch.rows.len(),
            new_columns = added,
            "Registered batch schema"
        );
        prepared.push(batch);
    }

    async fn write_file(
        &self,
        ctx: &TemplateContext,
        run_id: &str,
        assembled: &AssembledBatch,
    ) -> Result<Option<FileWriteResult>> {
        let Some(target) = &self.file else {
            return Ok(None);
        };
        let path = target.table_path(ctx, run_id)?;
        let operation = format!("file write {path}");

        let sink = &target.sink;
        let options = &target.options;
        let batch = &assembled.batch;
        let table_path = path.as_str();
        let result = timed(
            &operation,
            retry(&self.retry, &operation, move |_| {
                sink.write(table_path, batch, options)
            }),
        )
        .await?;
        Ok(Some(result))
    }

    async fn write_warehouse(
        &self,
        ctx: &TemplateContext,
        assembled: &AssembledBatch,
    ) -> Result<Option<WarehouseWriteResult>> {
        let Some(target) = &self.warehouse else {
            return Ok(None);
        };
        let table = target.table_ref(ctx)?;
        let result = timed(
            &format!("warehouse load {table}"),
            target.sink.write(&table, &assembled.batch),
        )
        .await?;
        Ok(Some(result))
    }
}

/// Resolves once shutdown is signalled, and never if the sender is gone
async fn cancelled(shutdown: &mut ShutdownSignal) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests;
