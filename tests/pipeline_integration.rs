//! End-to-end pipeline tests
//!
//! Tests the full flow: YAML pipeline → JSONL export → Parquet file sink + DuckDB warehouse

use docflow::engine::{shutdown_channel, CollectionState};
use docflow::output::ObjectStoreFileSink;
use docflow::{Pipeline, PipelineConfig, RunContext, RunReport};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_export(dir: &Path, collection: &str, lines: &[&str]) {
    fs::write(dir.join(format!("{collection}.jsonl")), lines.join("\n")).unwrap();
}

fn pipeline_yaml(root: &Path) -> String {
    format!(
        r#"
collections: [orders]
batch_size: 2
worker_concurrency: 2
source:
  type: jsonl
  dir: {exports}
file_sink:
  base: {lake}
warehouse:
  path: {warehouse}
  schema: staging
retry:
  max_attempts: 2
  initial_backoff_ms: 0
metadata:
  actor: tester
  source_system: LeadEvents
"#,
        exports = root.join("exports").display(),
        lake = root.join("lake").display(),
        warehouse = root.join("warehouse.duckdb").display(),
    )
}

async fn run_once(config: &PipelineConfig) -> RunReport {
    let pipeline = Pipeline::from_config(config).unwrap();
    let (_stop, signal) = shutdown_channel();
    pipeline
        .run(&config.collections, &RunContext::start(), signal)
        .await
}

fn warehouse_columns(root: &Path) -> Vec<(String, String)> {
    let conn = duckdb::Connection::open(root.join("warehouse.duckdb")).unwrap();
    let mut stmt = conn
        .prepare(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = 'staging' AND table_name = 'ORDERS' ORDER BY ordinal_position",
        )
        .unwrap();
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .unwrap()
        .map(|row| row.unwrap())
        .collect()
}

fn warehouse_count(root: &Path) -> i64 {
    let conn = duckdb::Connection::open(root.join("warehouse.duckdb")).unwrap();
    conn.query_row(r#"SELECT COUNT(*) FROM "staging"."ORDERS""#, [], |row| row.get(0))
        .unwrap()
}

#[tokio::test]
async fn test_schema_evolves_across_runs() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("exports")).unwrap();
    fs::create_dir_all(root.path().join("lake")).unwrap();
    let config = PipelineConfig::from_yaml(&pipeline_yaml(root.path())).unwrap();

    // First run: three orders, one of them malformed JSON
    write_export(
        root.path(),
        "exports/orders",
        &[
            r#"{"_id": 1, "status": "new", "orderCount": 3}"#,
            r#"{"_id": 2, "status": "paid", "orderCount": 5}"#,
            r#"{"_id": 3, "status": "#,
            r#"{"_id": 4, "status": "paid"}"#,
        ],
    );
    let report = run_once(&config).await;
    let orders = report.collection("orders").unwrap();
    assert_eq!(orders.state, CollectionState::Done, "{:?}", orders.error);
    assert_eq!(orders.stats.rows, 3);
    assert!(orders.warehouse.as_ref().unwrap().created);
    assert_eq!(orders.file.as_ref().unwrap().version, 1);

    let columns = warehouse_columns(root.path());
    let names: Vec<&str> = columns.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "ID",
            "ORDER_COUNT",
            "STATUS",
            "ETL_CREATED_DATE",
            "ETL_LAST_UPDATE_DATE",
            "CREATED_BY",
            "EDW_EXTERNAL_SOURCE_SYSTEM",
            "ETL_BATCH_ID",
            "TO_PROCESS",
        ]
    );
    assert_eq!(columns[1].1, "BIGINT");

    // Second run: a new nested field appears
    write_export(
        root.path(),
        "exports/orders",
        &[
            r#"{"_id": 1, "status": "shipped", "shipping": {"carrier": "UPS"}}"#,
            r#"{"_id": 5, "status": "new"}"#,
        ],
    );
    let report = run_once(&config).await;
    let orders = report.collection("orders").unwrap();
    assert_eq!(orders.state, CollectionState::Done, "{:?}", orders.error);

    let warehouse = orders.warehouse.as_ref().unwrap();
    assert!(!warehouse.created);
    assert_eq!(warehouse.added_columns, vec!["SHIPPING_CARRIER"]);
    assert_eq!(warehouse_count(root.path()), 2);

    let columns = warehouse_columns(root.path());
    assert_eq!(
        columns.last().unwrap(),
        &("SHIPPING_CARRIER".to_string(), "VARCHAR".to_string())
    );

    // The file sink keeps the first run's columns and bumps its version
    let lake = ObjectStoreFileSink::from_url(&root.path().join("lake").display().to_string()).unwrap();
    let manifest = lake.manifest("orders").await.unwrap().unwrap();
    assert_eq!(manifest.version, 2);
    assert!(manifest.column("ORDER_COUNT").is_some());
    assert!(manifest.column("SHIPPING_CARRIER").is_some());
}

#[tokio::test]
async fn test_missing_export_fails_only_that_collection() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("exports")).unwrap();
    fs::create_dir_all(root.path().join("lake")).unwrap();
    let yaml = pipeline_yaml(root.path()).replace("[orders]", "[orders, users]");
    let config = PipelineConfig::from_yaml(&yaml).unwrap();

    write_export(root.path(), "exports/users", &[r#"{"_id": "u1", "email": "a@example.com"}"#]);
    let report = run_once(&config).await;

    assert!(!report.is_success());
    assert_eq!(report.collection("orders").unwrap().state, CollectionState::Failed);
    assert_eq!(report.collection("users").unwrap().state, CollectionState::Done);
}

#[tokio::test]
async fn test_test_mode_caps_reads() {
    let root = TempDir::new().unwrap();
    fs::create_dir_all(root.path().join("exports")).unwrap();
    fs::create_dir_all(root.path().join("lake")).unwrap();
    let yaml = format!("{}test_mode: true\ntest_limit: 1\n", pipeline_yaml(root.path()));
    let config = PipelineConfig::from_yaml(&yaml).unwrap();

    write_export(
        root.path(),
        "exports/orders",
        &[r#"{"_id": 1}"#, r#"{"_id": 2}"#, r#"{"_id": 3}"#],
    );
    let report = run_once(&config).await;
    let orders = report.collection("orders").unwrap();

    assert_eq!(orders.stats.documents_total, 3);
    assert_eq!(orders.stats.documents_read, 1);
    assert_eq!(warehouse_count(root.path()), 1);
}

#[test]
fn test_missing_secret_fails_before_io() {
    let yaml = r#"
collections: [orders]
source:
  type: data_api
  url: https://data.example.com/app/x/endpoint/data/v1
  data_source: Cluster0
  database: shop
  api_key: { key: docflow-test-missing-key, env: DOCFLOW_TEST_MISSING_KEY }
warehouse:
  path: ":memory:"
"#;
    let config = PipelineConfig::from_yaml(yaml).unwrap();
    let Err(err) = Pipeline::from_config(&config) else {
        panic!("expected a missing secret error");
    };
    assert!(err.is_config(), "{err}");
}
