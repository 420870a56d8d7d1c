//! Data API source tests against a mock HTTP server
//!
//! Covers the request shapes of `find` and `count` and a full pipeline run
//! that pages a collection over HTTP.

use docflow::assemble::RunContext;
use docflow::engine::{shutdown_channel, CollectionState, FileTarget, Pipeline, PipelineSettings};
use docflow::http::HttpClientConfig;
use docflow::output::{decode_parquet, CloudDestination, ObjectStoreFileSink};
use docflow::retry::RetryPolicy;
use docflow::source::{DataApiSource, DocumentSource, FindQuery};
use docflow::Error;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn source(server: &MockServer) -> DataApiSource {
    let config = HttpClientConfig::builder()
        .retry(RetryPolicy::immediate(2))
        .no_rate_limit()
        .build();
    DataApiSource::connect(&server.uri(), "secret-key", "Cluster0", "shop", config).unwrap()
}

// ============================================================================
// Request Shape Tests
// ============================================================================

#[tokio::test]
async fn test_find_sends_page_query() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/action/find"))
        .and(header("api-key", "secret-key"))
        .and(body_partial_json(json!({
            "dataSource": "Cluster0",
            "database": "shop",
            "collection": "orders",
            "filter": {"_id": {"$gt": {"$oid": "65a1f0c2e4b0a1b2c3d4e5f6"}}},
            "sort": {"_id": 1},
            "limit": 2
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [
                {"_id": {"$oid": "65a1f0c2e4b0a1b2c3d4e5f7"}, "total": 10},
                {"_id": {"$oid": "65a1f0c2e4b0a1b2c3d4e5f8"}, "total": 12}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let last_seen = json!({"$oid": "65a1f0c2e4b0a1b2c3d4e5f6"});
    let docs = source(&server)
        .find("orders", &FindQuery::page("_id", Some(&last_seen), 2))
        .await
        .unwrap();

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[1]["total"], 12);
}

#[tokio::test]
async fn test_count_uses_aggregate() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/action/aggregate"))
        .and(body_partial_json(json!({
            "collection": "orders",
            "pipeline": [{"$match": {}}, {"$count": "count"}]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"documents": [{"count": {"$numberInt": "42"}}]})),
        )
        .mount(&server)
        .await;

    let count = source(&server).count("orders", &json!({})).await.unwrap();
    assert_eq!(count, 42);
}

#[tokio::test]
async fn test_count_of_empty_collection_is_zero() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/action/aggregate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": []})))
        .mount(&server)
        .await;

    assert_eq!(source(&server).count("empty", &json!({})).await.unwrap(), 0);
}

#[tokio::test]
async fn test_response_without_documents_is_source_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/action/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "no such db"})))
        .mount(&server)
        .await;

    let err = source(&server)
        .find("orders", &FindQuery::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Source { .. }), "{err}");
}

#[tokio::test]
async fn test_records_path_reads_wrapped_responses() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/action/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pages": [
                {"documents": [{"_id": 1}, {"_id": 2}]},
                {"documents": [{"_id": 3}]}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/action/aggregate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"documents": [{"count": 3}]}
        })))
        .mount(&server)
        .await;

    let docs = source(&server)
        .with_records_path("$.pages[*].documents[*]")
        .find("orders", &FindQuery::new())
        .await
        .unwrap();
    assert_eq!(docs, vec![json!({"_id": 1}), json!({"_id": 2}), json!({"_id": 3})]);

    let wrapped = source(&server).with_records_path("result.documents");
    assert_eq!(wrapped.count("orders", &json!({})).await.unwrap(), 3);

    // The default path does not exist in the wrapped response
    let err = source(&server).count("orders", &json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Source { .. }), "{err}");
}

#[tokio::test]
async fn test_find_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/action/find"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/action/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": [{"_id": 1}]})))
        .mount(&server)
        .await;

    let docs = source(&server).find("orders", &FindQuery::new()).await.unwrap();
    assert_eq!(docs.len(), 1);
}

// ============================================================================
// Pipeline Over HTTP
// ============================================================================

#[tokio::test]
async fn test_pipeline_pages_data_api_collection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/action/aggregate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": [{"count": 3}]})))
        .mount(&server)
        .await;

    // First page: no cursor yet. An empty filter matches every body, so
    // the cursor pages below take precedence.
    Mock::given(method("POST"))
        .and(path("/action/find"))
        .and(body_partial_json(json!({"filter": {}, "limit": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [
                {"_id": 1, "customer": {"name": "Ada"}, "createdDate": {"$date": "2024-01-15T10:30:00Z"}},
                {"_id": 2, "customer": {"name": "Grace"}, "createdDate": {"$date": "2024-01-16T08:00:00Z"}}
            ]
        })))
        .with_priority(10)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/action/find"))
        .and(body_partial_json(json!({"filter": {"_id": {"$gt": 2}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [{"_id": 3, "customer": "walk-in"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/action/find"))
        .and(body_partial_json(json!({"filter": {"_id": {"$gt": 3}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": []})))
        .expect(1)
        .mount(&server)
        .await;

    let file_sink = Arc::new(ObjectStoreFileSink::new(CloudDestination::in_memory()));
    let pipeline = Pipeline::new(Arc::new(source(&server)))
        .with_settings(PipelineSettings::new().with_batch_size(2))
        .with_file_target(FileTarget::new(file_sink.clone()));

    let (_stop, signal) = shutdown_channel();
    let report = pipeline
        .run(&["orders".to_string()], &RunContext::start(), signal)
        .await;

    let orders = report.collection("orders").unwrap();
    assert_eq!(orders.state, CollectionState::Done, "{:?}", orders.error);
    assert_eq!(orders.stats.documents_total, 3);
    assert_eq!(orders.stats.pages, 2);
    assert_eq!(orders.stats.renamed, 0);

    let bytes = file_sink.read_data("orders").await.unwrap().unwrap();
    let table = decode_parquet(bytes).unwrap().remove(0);
    let columns: Vec<String> = table
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    // `customer` is a struct in one batch and a string in another; batches
    // are renamed on their own, so both shapes keep their plain names
    assert!(columns.contains(&"CREATED_DATE".to_string()), "{columns:?}");
    assert!(columns.contains(&"CUSTOMER_NAME".to_string()), "{columns:?}");
    assert!(columns.contains(&"CUSTOMER".to_string()), "{columns:?}");
    assert_eq!(table.num_rows(), 3);
}
