//! Batch assembler

use super::metadata::{is_metadata_column, metadata_columns, MetadataConfig, RunContext, METADATA_COLUMNS};
use crate::coerce::TypeResolver;
use crate::document::{RawDocument, TabularRow};
use crate::error::Result;
use crate::flatten::{FlatDocument, Flattener};
use crate::naming::NameRegistry;
use crate::schema::{resolve_collisions, CollisionReport, SchemaUnifier};
use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Id columns tried for deduplication, in order
pub const DEFAULT_ID_COLUMNS: [&str; 2] = ["ID", "_ID"];

/// One source batch after flattening and collision renaming
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    /// Run-global batch sequence number
    pub batch_id: u64,
    /// Flattened rows in source order
    pub rows: Vec<TabularRow>,
    /// Union of the rows' column names
    pub local_schema: BTreeSet<String>,
    /// Documents dropped as malformed
    pub skipped: usize,
    /// Collision renames applied to this batch
    pub collisions: CollisionReport,
}

/// Rows ready for the sinks
#[derive(Debug, Clone)]
pub struct AssembledBatch {
    pub batch: RecordBatch,
    /// Rows before deduplication
    pub rows_in: usize,
    /// Rows dropped as duplicates
    pub duplicates: usize,
    /// Column used for deduplication, if any was present
    pub id_column: Option<String>,
}

impl AssembledBatch {
    /// Number of output rows
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Output column names in order
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }
}

/// Turns raw batches into typed record batches
#[derive(Debug, Clone)]
pub struct BatchAssembler {
    flattener: Flattener,
    resolver: TypeResolver,
    id_columns: Vec<String>,
    metadata: MetadataConfig,
}

impl Default for BatchAssembler {
    fn default() -> Self {
        Self {
            flattener: Flattener::new(),
            resolver: TypeResolver::new(),
            id_columns: DEFAULT_ID_COLUMNS.iter().map(ToString::to_string).collect(),
            metadata: MetadataConfig::default(),
        }
    }
}

impl BatchAssembler {
    /// Create an assembler with default settings
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_flattener(mut self, flattener: Flattener) -> Self {
        self.flattener = flattener;
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: TypeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set the id columns tried for deduplication
    #[must_use]
    pub fn with_id_columns(mut self, id_columns: Vec<String>) -> Self {
        self.id_columns = id_columns;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: MetadataConfig) -> Self {
        self.metadata = metadata;
        self
    }

    /// Flatten a raw batch and rename its collisions
    ///
    /// Malformed documents are logged and skipped.
    pub fn prepare(&self, batch_id: u64, docs: &[RawDocument]) -> PreparedBatch {
        let mut flat = Vec::with_capacity(docs.len());
        let mut skipped = 0;
        for (index, doc) in docs.iter().enumerate() {
            match self.flattener.flatten_raw(doc) {
                Ok(doc) => flat.push(doc),
                Err(e) => {
                    tracing::warn!(batch_id, index, error = %e, "Skipping malformed document");
                    skipped += 1;
                }
            }
        }

        let collisions = resolve_collisions(&mut flat);
        if !collisions.is_clean() {
            tracing::debug!(
                batch_id,
                columns = ?collisions.colliding,
                renamed = collisions.renamed,
                "Renamed colliding columns"
            );
        }

        let mut local_schema = BTreeSet::new();
        let rows: Vec<TabularRow> = flat
            .into_iter()
            .map(|doc| {
                let row = into_row(doc);
                local_schema.extend(row.keys().cloned());
                row
            })
            .collect();

        PreparedBatch {
            batch_id,
            rows,
            local_schema,
            skipped,
            collisions,
        }
    }

    /// Register a prepared batch's columns, returning how many were new
    pub async fn register(&self, batch: &PreparedBatch, schema: &SchemaUnifier) -> usize {
        schema.observe(batch.local_schema.iter().cloned()).await
    }

    /// Backfill, deduplicate, coerce and attach metadata
    ///
    /// `snapshot` is the unified schema at flush time. Rows keep the order of
    /// their batches' sequence numbers.
    pub fn assemble(
        &self,
        mut batches: Vec<PreparedBatch>,
        snapshot: &[String],
        run: &RunContext,
    ) -> Result<AssembledBatch> {
        batches.sort_by_key(|b| b.batch_id);

        let mut columns: BTreeSet<String> = snapshot.iter().cloned().collect();
        for batch in &batches {
            columns.extend(batch.local_schema.iter().cloned());
        }
        let columns: Vec<String> = columns
            .into_iter()
            .filter(|c| !is_metadata_column(c))
            .collect();

        let mut rows = Vec::new();
        let mut batch_ids = Vec::new();
        for batch in batches {
            let batch_id = batch.batch_id as i64;
            for row in batch.rows {
                rows.push(row);
                batch_ids.push(batch_id);
            }
        }
        let rows_in = rows.len();

        let id_column = self
            .id_columns
            .iter()
            .find(|id| columns.contains(id))
            .cloned();
        let (rows, batch_ids) = match &id_column {
            Some(id) => dedup_last_wins(rows, batch_ids, id),
            None => (rows, batch_ids),
        };
        let duplicates = rows_in - rows.len();

        let coerced = self.resolver.coerce(&columns, &rows);
        let mut fields: Vec<Field> = Vec::with_capacity(coerced.len() + METADATA_COLUMNS.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());
        for column in coerced {
            fields.push(column.field());
            arrays.push(column.array);
        }
        for (field, array) in metadata_columns(&self.metadata, run, Utc::now(), &batch_ids) {
            fields.push(field);
            arrays.push(array);
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;
        tracing::debug!(
            rows = batch.num_rows(),
            columns = batch.num_columns(),
            duplicates,
            "Assembled batch"
        );

        Ok(AssembledBatch {
            batch,
            rows_in,
            duplicates,
            id_column,
        })
    }

    /// Run every step for a single batch
    pub async fn process(
        &self,
        batch_id: u64,
        docs: &[RawDocument],
        schema: &SchemaUnifier,
        run: &RunContext,
    ) -> Result<AssembledBatch> {
        let prepared = self.prepare(batch_id, docs);
        self.register(&prepared, schema).await;
        let snapshot = schema.snapshot().await;
        self.assemble(vec![prepared], &snapshot, run)
    }
}

/// Convert a flat document into a row, moving data columns off metadata names
fn into_row(doc: FlatDocument) -> TabularRow {
    let mut registry = NameRegistry::new();
    for name in METADATA_COLUMNS {
        registry.uniquify(name);
    }
    let (reserved, regular): (Vec<_>, Vec<_>) = doc
        .fields
        .into_iter()
        .partition(|f| is_metadata_column(&f.name));

    let mut row = TabularRow::with_capacity(regular.len() + reserved.len());
    for field in regular {
        registry.uniquify(&field.name);
        row.insert(field.name, field.value);
    }
    for field in reserved {
        row.insert(registry.uniquify(&field.name), field.value);
    }
    row
}

/// Keep the last row for every id; rows without an id are all kept
fn dedup_last_wins(rows: Vec<TabularRow>, batch_ids: Vec<i64>, id_column: &str) -> (Vec<TabularRow>, Vec<i64>) {
    let keys: Vec<Option<String>> = rows
        .iter()
        .map(|row| row.get(id_column).and_then(|v| v.to_text()))
        .collect();

    let mut last_seen: HashMap<&str, usize> = HashMap::new();
    for (index, key) in keys.iter().enumerate() {
        if let Some(key) = key {
            last_seen.insert(key.as_str(), index);
        }
    }

    rows.into_iter()
        .zip(batch_ids)
        .enumerate()
        .filter(|(index, _)| match &keys[*index] {
            Some(key) => last_seen.get(key.as_str()) == Some(index),
            None => true,
        })
        .map(|(_, pair)| pair)
        .unzip()
}
