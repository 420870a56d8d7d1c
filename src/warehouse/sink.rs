//! Schema-evolving warehouse sink

use super::connection::{quote_ident, LoadMode, TableRef, WarehouseConnection};
use super::pool::ConnectionPool;
use crate::error::Result;
use crate::retry::{retry, RetryPolicy};
use arrow::array::{new_null_array, ArrayRef};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

/// Column type used when a new column is added to an existing table
pub const DEFAULT_GENERIC_TYPE: &str = "VARCHAR";

/// Result of a warehouse load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseWriteResult {
    pub table: TableRef,
    pub rows: usize,
    /// True if the table did not exist before this load
    pub created: bool,
    /// Columns added with ALTER TABLE
    pub added_columns: Vec<String>,
}

/// Loads batches into warehouse tables, evolving their schema
#[derive(Debug, Clone)]
pub struct WarehouseSink {
    pool: Arc<ConnectionPool>,
    retry: RetryPolicy,
    generic_type: String,
}

impl WarehouseSink {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
            generic_type: DEFAULT_GENERIC_TYPE.to_string(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the SQL type of columns added to existing tables
    #[must_use]
    pub fn with_generic_type(mut self, generic_type: impl Into<String>) -> Self {
        self.generic_type = generic_type.into();
        self
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Replace the contents of `table` with `batch`, adding any new columns
    pub async fn write(&self, table: &TableRef, batch: &RecordBatch) -> Result<WarehouseWriteResult> {
        let operation = format!("warehouse load {table}");
        let result = retry(&self.retry, &operation, |attempt| {
            let pool = Arc::clone(&self.pool);
            let table = table.clone();
            let batch = batch.clone();
            let generic_type = self.generic_type.clone();
            async move {
                tracing::debug!(table = %table, attempt, "Starting warehouse load");
                tokio::task::spawn_blocking(move || {
                    let mut conn = pool.checkout()?;
                    match load_unit(conn.as_mut(), &table, &batch, &generic_type) {
                        Ok(result) => {
                            pool.checkin(conn);
                            Ok(result)
                        }
                        Err(e) => {
                            pool.discard(conn);
                            Err(e)
                        }
                    }
                })
                .await?
            }
        })
        .await?;

        tracing::info!(
            table = %result.table,
            rows = result.rows,
            created = result.created,
            added = result.added_columns.len(),
            "Loaded warehouse table"
        );
        Ok(result)
    }
}

/// One alter-and-load unit on a single connection
fn load_unit(
    conn: &mut dyn WarehouseConnection,
    table: &TableRef,
    batch: &RecordBatch,
    generic_type: &str,
) -> Result<WarehouseWriteResult> {
    conn.execute(&format!(
        "CREATE SCHEMA IF NOT EXISTS {}",
        quote_ident(&table.schema)
    ))?;

    let Some(existing) = conn.introspect_columns(table)? else {
        let rows = conn.load(table, batch, LoadMode::Create)?;
        return Ok(WarehouseWriteResult {
            table: table.clone(),
            rows,
            created: true,
            added_columns: Vec::new(),
        });
    };

    let added = new_columns(&existing, batch);
    for column in &added {
        conn.execute(&format!(
            "ALTER TABLE {} ADD COLUMN {} {generic_type}",
            table.qualified(),
            quote_ident(column)
        ))?;
    }

    let aligned = align_to_table(batch, &existing, &added)?;
    let rows = conn.load(table, &aligned, LoadMode::Overwrite)?;
    Ok(WarehouseWriteResult {
        table: table.clone(),
        rows,
        created: false,
        added_columns: added,
    })
}

/// Batch columns the table lacks, compared case-insensitively, in batch order
pub fn new_columns(existing: &[String], batch: &RecordBatch) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|name| !existing.iter().any(|e| e.eq_ignore_ascii_case(name)))
        .collect()
}

/// Reorder a batch to `existing ++ added`
///
/// Table columns the batch lacks are backfilled with nulls; columns that
/// match case-insensitively take the table's spelling.
pub fn align_to_table(
    batch: &RecordBatch,
    existing: &[String],
    added: &[String],
) -> Result<RecordBatch> {
    let schema = batch.schema();
    let rows = batch.num_rows();
    let find = |name: &str| {
        schema
            .fields()
            .iter()
            .position(|f| f.name().eq_ignore_ascii_case(name))
    };

    let mut fields = Vec::with_capacity(existing.len() + added.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());
    for name in existing.iter().chain(added) {
        match find(name) {
            Some(index) => {
                fields.push(Field::new(name, schema.field(index).data_type().clone(), true));
                arrays.push(Arc::clone(batch.column(index)));
            }
            None => {
                fields.push(Field::new(name, DataType::Utf8, true));
                arrays.push(new_null_array(&DataType::Utf8, rows));
            }
        }
    }

    let options = arrow::record_batch::RecordBatchOptions::new().with_row_count(Some(rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        arrays,
        &options,
    )?)
}
