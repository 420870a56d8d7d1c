//! Tests for the pipeline driver

use super::*;
use crate::assemble::METADATA_COLUMNS;
use crate::output::{decode_parquet, CloudDestination, ObjectStoreFileSink};
use crate::source::MemorySource;
use crate::warehouse::{ConnectionPool, DuckDbConnector, WarehouseConnection, WarehouseConnector};
use arrow::array::{Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::AtomicU32;

fn run_ctx() -> RunContext {
    RunContext::new("run-1", Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap())
}

fn names(collections: &[&str]) -> Vec<String> {
    collections.iter().map(ToString::to_string).collect()
}

fn memory_file_sink() -> Arc<ObjectStoreFileSink> {
    Arc::new(ObjectStoreFileSink::new(CloudDestination::in_memory()))
}

fn duckdb_target() -> (Arc<DuckDbConnector>, WarehouseTarget) {
    let connector = Arc::new(DuckDbConnector::open_in_memory().unwrap());
    let pool = Arc::new(ConnectionPool::new(connector.clone(), 2));
    let sink = WarehouseSink::new(pool).with_retry(RetryPolicy::immediate(1));
    (connector, WarehouseTarget::new(Arc::new(sink), "main"))
}

async fn read_table(sink: &ObjectStoreFileSink, path: &str) -> RecordBatch {
    let bytes = sink.read_data(path).await.unwrap().expect("data file");
    let mut batches = decode_parquet(bytes).unwrap();
    assert_eq!(batches.len(), 1);
    batches.remove(0)
}

fn column_names(batch: &RecordBatch) -> Vec<String> {
    batch.schema().fields().iter().map(|f| f.name().clone()).collect()
}

fn int_column(batch: &RecordBatch, name: &str) -> Vec<Option<i64>> {
    let column = batch.column_by_name(name).expect(name);
    let ints = column.as_any().downcast_ref::<Int64Array>().expect("int64");
    ints.iter().collect()
}

/// File sink that always fails with a configurable error
struct FailingFileSink {
    transient: bool,
    calls: AtomicU32,
}

#[async_trait]
impl FileSink for FailingFileSink {
    async fn write(
        &self,
        _table_path: &str,
        _batch: &RecordBatch,
        _options: &WriteOptions,
    ) -> Result<FileWriteResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.transient {
            Err(Error::sink_transient("file", "connection reset"))
        } else {
            Err(Error::sink_fatal("file", "access denied"))
        }
    }
}

/// Warehouse that refuses every session
struct RefusingConnector;

impl WarehouseConnector for RefusingConnector {
    fn connect(&self) -> Result<Box<dyn WarehouseConnection>> {
        Err(Error::sink_fatal("warehouse", "permission denied"))
    }
}

// ============================================================================
// Type Tests
// ============================================================================

#[test]
fn test_collection_state_display() {
    assert_eq!(CollectionState::BatchReady.to_string(), "batch_ready");
    assert_eq!(CollectionState::default(), CollectionState::Idle);
    assert!(CollectionState::Failed.is_terminal());
    assert!(!CollectionState::Flushing.is_terminal());
}

#[test]
fn test_settings_builder_clamps_to_one() {
    let settings = PipelineSettings::new()
        .with_batch_size(0)
        .with_worker_concurrency(0)
        .with_collection_concurrency(3)
        .with_sort_key("seq")
        .with_record_cap(Some(10));

    assert_eq!(settings.batch_size, 1);
    assert_eq!(settings.worker_concurrency, 1);
    assert_eq!(settings.collection_concurrency, 3);
    assert_eq!(settings.sort_key, "seq");
    assert_eq!(settings.record_cap, Some(10));
}

#[test]
fn test_report_fail_records_error() {
    let mut report = CollectionReport::new("orders");
    report.transition(CollectionState::Flushing);
    report.fail(Error::Cancelled);
    assert!(report.is_failed());
    assert!(matches!(report.error, Some(Error::Cancelled)));
}

#[test]
fn test_target_naming() {
    let ctx = TemplateContext::for_collection("orders", "run-1");

    let file = FileTarget::new(memory_file_sink()).with_path("raw/{{ collection }}/");
    assert_eq!(file.table_path(&ctx, "run-1").unwrap(), "raw/orders/");
    let file = file.with_run_suffix(true);
    assert_eq!(file.table_path(&ctx, "run-1").unwrap(), "raw/orders/run-1");

    let (_, warehouse) = duckdb_target();
    let table = warehouse.with_table("stg_{{ collection }}").table_ref(&ctx).unwrap();
    assert_eq!(table.to_string(), "main.STG_ORDERS");
}

// ============================================================================
// Driver Tests
// ============================================================================

#[tokio::test]
async fn test_end_to_end_both_sinks() {
    let source = Arc::new(MemorySource::new().with_collection(
        "orders",
        vec![
            json!({"_id": 1, "name": "a", "address": {"city": "X"}}),
            json!({"_id": 2, "name": "b", "leadScore": "42"}),
            json!({"_id": 3, "name": "c", "tags": ["t1", "t2"]}),
            json!({"_id": 4, "name": "d"}),
            json!({"_id": 5, "name": "e"}),
        ],
    ));
    let file_sink = memory_file_sink();
    let (connector, warehouse) = duckdb_target();

    let pipeline = Pipeline::new(source.clone())
        .with_settings(PipelineSettings::new().with_batch_size(2).with_worker_concurrency(2))
        .with_file_target(FileTarget::new(file_sink.clone()))
        .with_warehouse_target(warehouse);

    let (_tx, rx) = shutdown_channel();
    let report = pipeline.run(&names(&["orders"]), &run_ctx(), rx).await;

    assert!(report.is_success(), "{report:?}");
    let orders = report.collection("orders").unwrap();
    assert_eq!(orders.stats.documents_total, 5);
    assert_eq!(orders.stats.documents_read, 5);
    assert_eq!(orders.stats.pages, 3);
    assert_eq!(orders.stats.batches, 3);
    assert_eq!(orders.stats.rows, 5);
    // Three full pages and one empty page
    assert_eq!(source.find_calls(), 4);

    let table = read_table(&file_sink, "orders").await;
    let mut expected: Vec<String> = names(&["ADDRESS_CITY", "ID", "LEAD_SCORE", "NAME", "TAGS_0", "TAGS_1"]);
    expected.extend(METADATA_COLUMNS.iter().map(ToString::to_string));
    assert_eq!(column_names(&table), expected);
    assert_eq!(int_column(&table, "ID"), vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
    assert_eq!(int_column(&table, "LEAD_SCORE"), vec![None, Some(42), None, None, None]);

    let city = table.column_by_name("ADDRESS_CITY").unwrap();
    assert_eq!(city.null_count(), 4);

    let warehouse = orders.warehouse.as_ref().unwrap();
    assert!(warehouse.created);
    assert_eq!(warehouse.rows, 5);
    let conn = connector.raw_connection().unwrap();
    let count: i64 = conn
        .query_row(r#"SELECT COUNT(*) FROM "main"."ORDERS""#, [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 5);
}

#[tokio::test]
async fn test_duplicates_resolved_last_seen_wins() {
    let source = Arc::new(MemorySource::new().with_collection(
        "users",
        vec![
            json!({"seq": 1, "_id": "u1", "email": "old@example.com"}),
            json!({"seq": 2, "_id": "u2", "email": "two@example.com"}),
            json!({"seq": 3, "_id": "u1", "email": "new@example.com"}),
            json!({"seq": 4, "_id": "u3", "email": "three@example.com"}),
        ],
    ));
    let file_sink = memory_file_sink();
    let pipeline = Pipeline::new(source)
        .with_settings(PipelineSettings::new().with_batch_size(1).with_sort_key("seq"))
        .with_file_target(FileTarget::new(file_sink.clone()));

    let (_tx, rx) = shutdown_channel();
    let report = pipeline.run(&names(&["users"]), &run_ctx(), rx).await;
    let users = report.collection("users").unwrap();
    assert_eq!(users.state, CollectionState::Done);
    assert_eq!(users.stats.duplicates, 1);

    let table = read_table(&file_sink, "users").await;
    let emails = table
        .column_by_name("EMAIL")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap()
        .iter()
        .map(|v| v.map(ToString::to_string))
        .collect::<Vec<_>>();
    assert_eq!(
        emails,
        vec![
            Some("two@example.com".to_string()),
            Some("new@example.com".to_string()),
            Some("three@example.com".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_record_cap_limits_reads() {
    let docs = (1..=10).map(|i| json!({"_id": i})).collect();
    let source = Arc::new(MemorySource::new().with_collection("events", docs));
    let pipeline = Pipeline::new(source.clone())
        .with_settings(
            PipelineSettings::new()
                .with_batch_size(2)
                .with_record_cap(Some(3)),
        )
        .with_file_target(FileTarget::new(memory_file_sink()));

    let (_tx, rx) = shutdown_channel();
    let report = pipeline.run(&names(&["events"]), &run_ctx(), rx).await;
    let events = report.collection("events").unwrap();

    assert_eq!(events.stats.documents_total, 10);
    assert_eq!(events.stats.documents_read, 3);
    assert_eq!(events.stats.rows, 3);
    assert_eq!(source.find_calls(), 2);
}

#[tokio::test]
async fn test_batch_ids_are_run_global() {
    let source = Arc::new(
        MemorySource::new()
            .with_collection("a", vec![json!({"_id": 1}), json!({"_id": 2})])
            .with_collection("b", vec![json!({"_id": 1}), json!({"_id": 2})]),
    );
    let file_sink = memory_file_sink();
    let pipeline = Pipeline::new(source)
        .with_settings(PipelineSettings::new().with_batch_size(1))
        .with_file_target(FileTarget::new(file_sink.clone()));

    let (_tx, rx) = shutdown_channel();
    let report = pipeline.run(&names(&["a", "b"]), &run_ctx(), rx).await;
    assert!(report.is_success());

    let a = read_table(&file_sink, "a").await;
    let b = read_table(&file_sink, "b").await;
    assert_eq!(int_column(&a, "ETL_BATCH_ID"), vec![Some(1), Some(2)]);
    assert_eq!(int_column(&b, "ETL_BATCH_ID"), vec![Some(3), Some(4)]);
}

#[tokio::test]
async fn test_failed_collection_does_not_stop_others() {
    let source = Arc::new(MemorySource::new().with_collection("good", vec![json!({"_id": 1})]));
    let pipeline = Pipeline::new(source)
        .with_settings(PipelineSettings::new().with_collection_concurrency(2))
        .with_file_target(FileTarget::new(memory_file_sink()));

    let (_tx, rx) = shutdown_channel();
    let report = pipeline.run(&names(&["missing", "good"]), &run_ctx(), rx).await;

    assert!(!report.is_success());
    let order: Vec<_> = report.collections.iter().map(|c| c.collection.as_str()).collect();
    assert_eq!(order, vec!["missing", "good"]);

    let missing = report.collection("missing").unwrap();
    assert_eq!(missing.state, CollectionState::Failed);
    assert!(matches!(missing.error, Some(Error::Source { .. })));
    assert_eq!(report.collection("good").unwrap().state, CollectionState::Done);
    assert_eq!(report.failed().count(), 1);
}

#[tokio::test]
async fn test_fatal_sink_error_fails_collection_without_retry() {
    let source = Arc::new(MemorySource::new().with_collection("orders", vec![json!({"_id": 1})]));
    let failing = Arc::new(FailingFileSink {
        transient: false,
        calls: AtomicU32::new(0),
    });
    let (_, warehouse) = duckdb_target();
    let pipeline = Pipeline::new(source)
        .with_retry(RetryPolicy::immediate(3))
        .with_file_target(FileTarget::new(failing.clone()))
        .with_warehouse_target(warehouse);

    let (_tx, rx) = shutdown_channel();
    let report = pipeline.run(&names(&["orders"]), &run_ctx(), rx).await;
    let orders = report.collection("orders").unwrap();

    assert_eq!(orders.state, CollectionState::Failed);
    assert!(matches!(orders.error, Some(Error::SinkFatal { .. })));
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    // The warehouse write is independent of the file write
    assert_eq!(orders.warehouse.as_ref().map(|w| w.rows), Some(1));
}

#[tokio::test]
async fn test_both_sinks_failing_keeps_both_errors() {
    let source = Arc::new(MemorySource::new().with_collection("orders", vec![json!({"_id": 1})]));
    let failing = Arc::new(FailingFileSink {
        transient: false,
        calls: AtomicU32::new(0),
    });
    let pool = Arc::new(ConnectionPool::new(Arc::new(RefusingConnector), 1));
    let sink = WarehouseSink::new(pool).with_retry(RetryPolicy::immediate(1));
    let pipeline = Pipeline::new(source)
        .with_file_target(FileTarget::new(failing))
        .with_warehouse_target(WarehouseTarget::new(Arc::new(sink), "main"));

    let (_tx, rx) = shutdown_channel();
    let report = pipeline.run(&names(&["orders"]), &run_ctx(), rx).await;
    let orders = report.collection("orders").unwrap();

    assert_eq!(orders.state, CollectionState::Failed);
    assert!(matches!(orders.error, Some(Error::SinkFatal { ref sink, .. }) if sink == "file"));
    assert!(matches!(
        orders.secondary_error,
        Some(Error::SinkFatal { ref sink, .. }) if sink == "warehouse"
    ));
    assert!(orders.warehouse.is_none());
}

#[tokio::test]
async fn test_transient_sink_error_exhausts_retries() {
    let source = Arc::new(MemorySource::new().with_collection("orders", vec![json!({"_id": 1})]));
    let failing = Arc::new(FailingFileSink {
        transient: true,
        calls: AtomicU32::new(0),
    });
    let pipeline = Pipeline::new(source)
        .with_retry(RetryPolicy::immediate(3))
        .with_file_target(FileTarget::new(failing.clone()));

    let (_tx, rx) = shutdown_channel();
    let report = pipeline.run(&names(&["orders"]), &run_ctx(), rx).await;
    let orders = report.collection("orders").unwrap();

    assert!(matches!(
        orders.error,
        Some(Error::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(failing.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_shutdown_before_paging_cancels() {
    let source = Arc::new(MemorySource::new().with_collection("orders", vec![json!({"_id": 1})]));
    let pipeline =
        Pipeline::new(source.clone()).with_file_target(FileTarget::new(memory_file_sink()));

    let (tx, rx) = shutdown_channel();
    tx.send(true).unwrap();
    let report = pipeline.run(&names(&["orders"]), &run_ctx(), rx).await;
    let orders = report.collection("orders").unwrap();

    assert_eq!(orders.state, CollectionState::Failed);
    assert!(matches!(orders.error, Some(Error::Cancelled)));
    assert_eq!(source.find_calls(), 0);
}

#[tokio::test]
async fn test_empty_collection_writes_nothing() {
    let source = Arc::new(MemorySource::new().with_collection("empty", Vec::new()));
    let file_sink = memory_file_sink();
    let pipeline = Pipeline::new(source).with_file_target(FileTarget::new(file_sink.clone()));

    let (_tx, rx) = shutdown_channel();
    let report = pipeline.run(&names(&["empty"]), &run_ctx(), rx).await;
    let empty = report.collection("empty").unwrap();

    assert_eq!(empty.state, CollectionState::Done);
    assert!(empty.file.is_none());
    assert!(file_sink.read_data("empty").await.unwrap().is_none());
}

#[tokio::test]
async fn test_page_without_sort_key_fails() {
    let source = Arc::new(MemorySource::new().with_collection("raw", vec![json!({"name": "x"})]));
    let pipeline = Pipeline::new(source).with_file_target(FileTarget::new(memory_file_sink()));

    let (_tx, rx) = shutdown_channel();
    let report = pipeline.run(&names(&["raw"]), &run_ctx(), rx).await;
    let raw = report.collection("raw").unwrap();

    assert_eq!(raw.state, CollectionState::Failed);
    assert!(raw.error.as_ref().unwrap().to_string().contains("sort key"));
}
