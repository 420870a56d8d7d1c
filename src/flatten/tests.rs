//! Tests for the flattener

use super::*;
use crate::document::{from_extended_json, DocValue, Scalar, ValueKind};
use pretty_assertions::assert_eq;
use serde_json::json;

fn flat(value: serde_json::Value) -> FlatDocument {
    Flattener::new().flatten_raw(&value).unwrap()
}

#[test]
fn test_flatten_nested_object() {
    let doc = flat(json!({"a": {"b": 1}, "c": "x"}));

    let columns: Vec<_> = doc.columns().collect();
    assert_eq!(columns, vec!["A_B", "C"]);
    assert_eq!(doc.get("A_B"), Some(&Scalar::Int(1)));
    assert_eq!(doc.get("C"), Some(&Scalar::String("x".to_string())));
}

#[test]
fn test_flatten_sequence_indices() {
    let doc = flat(json!({"items": [{"sku": "a"}, {"sku": "b"}], "tags": ["x", "y"]}));

    let columns: Vec<_> = doc.columns().collect();
    assert_eq!(columns, vec!["ITEMS_0_SKU", "ITEMS_1_SKU", "TAGS_0", "TAGS_1"]);
}

#[test]
fn test_flatten_records_containers_and_ancestors() {
    let doc = flat(json!({"items": [{"sku": "a"}]}));

    assert_eq!(
        doc.containers,
        vec![
            ("ITEMS".to_string(), ValueKind::Array),
            ("ITEMS_0".to_string(), ValueKind::Struct),
        ]
    );
    assert_eq!(
        doc.fields[0].ancestors,
        vec![
            ("ITEMS".to_string(), ValueKind::Array),
            ("ITEMS_0".to_string(), ValueKind::Struct),
        ]
    );
}

#[test]
fn test_flatten_empty_containers_produce_nothing() {
    let doc = flat(json!({"a": {}, "b": [], "c": 1}));

    assert_eq!(doc.columns().collect::<Vec<_>>(), vec!["C"]);
    assert!(doc.containers.is_empty());
}

#[test]
fn test_flatten_uniquifies_colliding_paths() {
    let doc = flat(json!({"a_b": 1, "a": {"b": 2}, "aB": 3}));

    assert_eq!(doc.columns().collect::<Vec<_>>(), vec!["A_B", "A_B_1", "A_B_2"]);
    assert_eq!(doc.get("A_B_1"), Some(&Scalar::Int(2)));
}

#[test]
fn test_flatten_keeps_nulls() {
    let doc = flat(json!({"a": null}));
    assert_eq!(doc.get("A"), Some(&Scalar::Null));
}

#[test]
fn test_flatten_extended_json_leaves() {
    let doc = flat(json!({"_id": {"$oid": "abc"}, "meta": {"n": {"$numberLong": "5"}}}));

    assert_eq!(doc.get("ID"), Some(&Scalar::String("abc".to_string())));
    assert_eq!(doc.get("META_N"), Some(&Scalar::Int(5)));
}

#[test]
fn test_flatten_depth_limit_renders_json() {
    let doc = Flattener::new()
        .with_max_depth(2)
        .flatten_raw(&json!({"a": {"b": {"c": 1}}}))
        .unwrap();

    assert_eq!(doc.get("A_B"), Some(&Scalar::String(r#"{"c":1}"#.to_string())));
}

#[test]
fn test_flatten_rejects_non_object_root() {
    let err = flatten(DocValue::Int(1)).unwrap_err();
    assert!(matches!(err, crate::Error::Document { .. }));
}

#[test]
fn test_flatten_to_json() {
    let doc = flatten(from_extended_json(&json!({"a": {"b": true}, "n": 1.5})).unwrap()).unwrap();
    assert_eq!(doc.to_json(), json!({"A_B": true, "N": 1.5}));
}
