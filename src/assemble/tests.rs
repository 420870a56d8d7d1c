//! Tests for batch assembly

use super::*;
use crate::schema::SchemaUnifier;
use arrow::array::{Array, BooleanArray, Int64Array, StringArray};
use arrow::datatypes::DataType;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

fn run() -> RunContext {
    RunContext::new("test-run", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
}

fn column<'a, T: 'static>(batch: &'a AssembledBatch, name: &str) -> &'a T {
    let index = batch.batch.schema().index_of(name).unwrap();
    batch.batch.column(index).as_any().downcast_ref::<T>().unwrap()
}

#[tokio::test]
async fn test_every_row_has_every_column() {
    let assembler = BatchAssembler::new();
    let schema = SchemaUnifier::new();
    let docs = vec![json!({"a": {"b": 1}}), json!({"c": "x"})];

    let out = assembler.process(1, &docs, &schema, &run()).await.unwrap();

    assert_eq!(out.num_rows(), 2);
    let names = out.column_names();
    assert_eq!(&names[..2], &["A_B".to_string(), "C".to_string()]);
    assert_eq!(&names[2..], &METADATA_COLUMNS.map(String::from));

    let c = column::<StringArray>(&out, "C");
    assert!(c.is_null(0));
    assert_eq!(c.value(1), "x");
}

#[tokio::test]
async fn test_backfills_unified_columns_as_string_nulls() {
    let assembler = BatchAssembler::new();
    let schema = SchemaUnifier::new();
    schema.observe(["EARLIER_COLUMN"]).await;

    let out = assembler
        .process(2, &[json!({"x": 1})], &schema, &run())
        .await
        .unwrap();

    let field = out.batch.schema().field_with_name("EARLIER_COLUMN").unwrap().clone();
    assert_eq!(field.data_type(), &DataType::Utf8);
    assert_eq!(column::<StringArray>(&out, "EARLIER_COLUMN").null_count(), 1);
}

#[tokio::test]
async fn test_dedup_last_seen_wins() {
    let assembler = BatchAssembler::new();
    let schema = SchemaUnifier::new();
    let docs = vec![
        json!({"id": "1", "v": "old"}),
        json!({"id": "2", "v": "other"}),
        json!({"id": "1", "v": "new"}),
        json!({"id": null, "v": "anon-a"}),
        json!({"v": "anon-b"}),
    ];

    let out = assembler.process(1, &docs, &schema, &run()).await.unwrap();

    assert_eq!(out.id_column.as_deref(), Some("ID"));
    assert_eq!(out.rows_in, 5);
    assert_eq!(out.duplicates, 1);
    let values: Vec<&str> = {
        let v = column::<StringArray>(&out, "V");
        (0..v.len()).map(|i| v.value(i)).collect()
    };
    assert_eq!(values, vec!["other", "new", "anon-a", "anon-b"]);
}

#[tokio::test]
async fn test_dedup_spans_batches_in_sequence_order() {
    let assembler = BatchAssembler::new();
    let first = assembler.prepare(1, &[json!({"_id": {"$oid": "a"}, "v": "first"})]);
    let second = assembler.prepare(2, &[json!({"_id": {"$oid": "a"}, "v": "second"})]);

    let out = assembler
        .assemble(vec![second, first], &["ID".to_string(), "V".to_string()], &run())
        .unwrap();

    assert_eq!(out.num_rows(), 1);
    assert_eq!(column::<StringArray>(&out, "V").value(0), "second");
    assert_eq!(column::<Int64Array>(&out, "ETL_BATCH_ID").value(0), 2);
}

#[tokio::test]
async fn test_malformed_documents_are_skipped() {
    let assembler = BatchAssembler::new();
    let prepared = assembler.prepare(
        1,
        &[json!({"ok": 1}), json!([1, 2]), json!({"bad": {"$numberLong": "x"}})],
    );

    assert_eq!(prepared.rows.len(), 1);
    assert_eq!(prepared.skipped, 2);
}

#[tokio::test]
async fn test_collision_renames_are_registered() {
    let assembler = BatchAssembler::new();
    let schema = SchemaUnifier::new();
    let docs = vec![json!({"x": 1}), json!({"x": {"a": 2}})];

    assembler.process(1, &docs, &schema, &run()).await.unwrap();

    assert_eq!(schema.snapshot().await, vec!["X_INT", "X_STRUCT_A"]);
}

#[tokio::test]
async fn test_metadata_values() {
    let assembler = BatchAssembler::new().with_metadata(MetadataConfig {
        actor: "etl-bot".to_string(),
        source_system: "LeadEvents".to_string(),
    });
    let schema = SchemaUnifier::new();

    let out = assembler
        .process(7, &[json!({"a": 1}), json!({"a": 2})], &schema, &run())
        .await
        .unwrap();

    assert_eq!(column::<StringArray>(&out, "CREATED_BY").value(1), "etl-bot");
    assert_eq!(
        column::<StringArray>(&out, "EDW_EXTERNAL_SOURCE_SYSTEM").value(0),
        "LeadEvents"
    );
    assert_eq!(column::<Int64Array>(&out, "ETL_BATCH_ID").value(0), 7);
    assert!(column::<BooleanArray>(&out, "TO_PROCESS").value(1));
}

#[tokio::test]
async fn test_source_field_named_like_metadata_is_moved() {
    let assembler = BatchAssembler::new();
    let schema = SchemaUnifier::new();

    let out = assembler
        .process(1, &[json!({"createdBy": "someone"})], &schema, &run())
        .await
        .unwrap();

    assert_eq!(column::<StringArray>(&out, "CREATED_BY_1").value(0), "someone");
    assert_ne!(column::<StringArray>(&out, "CREATED_BY").value(0), "someone");
}

#[tokio::test]
async fn test_empty_batch_assembles_metadata_only() {
    let assembler = BatchAssembler::new();
    let out = assembler.assemble(Vec::new(), &[], &run()).unwrap();

    assert_eq!(out.num_rows(), 0);
    assert_eq!(out.column_names().len(), METADATA_COLUMNS.len());
}
