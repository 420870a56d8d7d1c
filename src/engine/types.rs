//! Engine types
//!
//! Settings, collection states and run reports of the pipeline driver.

use crate::error::Error;
use crate::output::FileWriteResult;
use crate::warehouse::WarehouseWriteResult;

/// Where a collection is in its lifecycle
///
/// ```text
/// Idle -> Paging -> BatchReady -> Assembling -> (Paging | Flushing) -> Done
/// ```
///
/// `Failed` is reachable from every state but `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionState {
    #[default]
    Idle,
    Paging,
    BatchReady,
    Assembling,
    Flushing,
    Done,
    Failed,
}

impl CollectionState {
    /// Check if the collection has finished, successfully or not
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for CollectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Paging => "paging",
            Self::BatchReady => "batch_ready",
            Self::Assembling => "assembling",
            Self::Flushing => "flushing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Paging and concurrency settings of the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Documents per page
    pub batch_size: usize,
    /// Batches prepared concurrently within a collection
    pub worker_concurrency: usize,
    /// Collections processed concurrently
    pub collection_concurrency: usize,
    /// Field the source is paged on
    pub sort_key: String,
    /// Documents read per collection, `None` for all
    pub record_cap: Option<usize>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            worker_concurrency: 4,
            collection_concurrency: 1,
            sort_key: "_id".to_string(),
            record_cap: None,
        }
    }
}

impl PipelineSettings {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn with_worker_concurrency(mut self, workers: usize) -> Self {
        self.worker_concurrency = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_collection_concurrency(mut self, collections: usize) -> Self {
        self.collection_concurrency = collections.max(1);
        self
    }

    #[must_use]
    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = sort_key.into();
        self
    }

    /// Cap the documents read per collection
    #[must_use]
    pub fn with_record_cap(mut self, cap: Option<usize>) -> Self {
        self.record_cap = cap;
        self
    }
}

/// Counters of one collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Documents the source reported for the collection
    pub documents_total: u64,
    /// Documents read
    pub documents_read: usize,
    /// Pages fetched, not counting the final empty page
    pub pages: usize,
    /// Batches prepared by workers
    pub batches: usize,
    /// Documents dropped as malformed
    pub skipped: usize,
    /// Leaves renamed for shape or type collisions
    pub renamed: usize,
    /// Rows dropped as duplicates
    pub duplicates: usize,
    /// Rows handed to the sinks
    pub rows: usize,
    /// Data and metadata columns handed to the sinks
    pub columns: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Outcome of one collection
#[derive(Debug)]
pub struct CollectionReport {
    pub collection: String,
    pub state: CollectionState,
    pub stats: CollectionStats,
    /// File sink result, when that sink is configured and succeeded
    pub file: Option<FileWriteResult>,
    /// Warehouse result, when that sink is configured and succeeded
    pub warehouse: Option<WarehouseWriteResult>,
    /// Cause of a `Failed` state
    pub error: Option<Error>,
    /// Warehouse error of a flush where the file sink failed as well
    pub secondary_error: Option<Error>,
}

impl CollectionReport {
    /// Report of a collection that has not started
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            state: CollectionState::Idle,
            stats: CollectionStats::default(),
            file: None,
            warehouse: None,
            error: None,
            secondary_error: None,
        }
    }

    /// Move to a new state
    pub fn transition(&mut self, state: CollectionState) {
        tracing::trace!(collection = %self.collection, from = %self.state, to = %state, "State change");
        self.state = state;
    }

    /// Mark the collection failed with `error`
    pub fn fail(&mut self, error: Error) {
        self.transition(CollectionState::Failed);
        self.error = Some(error);
    }

    pub fn is_failed(&self) -> bool {
        self.state == CollectionState::Failed
    }
}

/// Outcome of a pipeline run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    /// One report per collection, in the requested order
    pub collections: Vec<CollectionReport>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    /// Check if every collection finished
    pub fn is_success(&self) -> bool {
        self.collections.iter().all(|c| c.state == CollectionState::Done)
    }

    /// Reports of failed collections
    pub fn failed(&self) -> impl Iterator<Item = &CollectionReport> {
        self.collections.iter().filter(|c| c.is_failed())
    }

    /// Look up the report of a collection
    pub fn collection(&self, name: &str) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| c.collection == name)
    }

    /// Rows written across all collections
    pub fn total_rows(&self) -> usize {
        self.collections.iter().map(|c| c.stats.rows).sum()
    }
}
