//! Atlas Data API source

use super::query::FindQuery;
use super::DocumentSource;
use crate::decode::JsonDecoder;
use crate::document::RawDocument;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig};
use crate::types::JsonValue;
use async_trait::async_trait;
use serde_json::json;

/// Header carrying the Data API key
pub const DEFAULT_API_KEY_HEADER: &str = "api-key";

/// Where the Data API puts matched documents in a response
pub const DEFAULT_RECORDS_PATH: &str = "documents";

/// Documents served by a Data API endpoint
///
/// `find` maps to `POST /action/find`; `count` runs a `$match` + `$count`
/// pipeline through `POST /action/aggregate`. Both read their documents
/// from the records path, `documents` unless configured otherwise.
#[derive(Debug)]
pub struct DataApiSource {
    client: HttpClient,
    data_source: String,
    database: String,
    documents: JsonDecoder,
}

impl DataApiSource {
    /// Create a source over a client rooted at the Data API endpoint
    pub fn new(client: HttpClient, data_source: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            client,
            data_source: data_source.into(),
            database: database.into(),
            documents: JsonDecoder::with_path(DEFAULT_RECORDS_PATH),
        }
    }

    /// Read documents from another place in the response, for gateways
    /// that wrap the Data API (`result.documents`, `$.pages[*].documents[*]`)
    #[must_use]
    pub fn with_records_path(mut self, path: impl Into<String>) -> Self {
        self.documents = JsonDecoder::with_path(path);
        self
    }

    /// Create a source from an endpoint URL and API key
    pub fn connect(
        url: &str,
        api_key: &str,
        data_source: impl Into<String>,
        database: impl Into<String>,
        mut config: HttpClientConfig,
    ) -> Result<Self> {
        config
            .headers
            .push((DEFAULT_API_KEY_HEADER.to_string(), api_key.to_string()));
        let client = HttpClient::new(url, config)?;
        Ok(Self::new(client, data_source, database))
    }

    fn body(&self, collection: &str) -> serde_json::Map<String, JsonValue> {
        let mut body = serde_json::Map::new();
        body.insert("dataSource".into(), json!(self.data_source));
        body.insert("database".into(), json!(self.database));
        body.insert("collection".into(), json!(collection));
        body
    }

    async fn action(&self, collection: &str, action: &str, body: serde_json::Map<String, JsonValue>) -> Result<Vec<RawDocument>> {
        let response: JsonValue = self
            .client
            .post_json(&format!("action/{action}"), &JsonValue::Object(body))
            .await?;
        if !self.documents.resolves(&response) {
            return Err(Error::source_error(
                collection,
                format!(
                    "{action} response has no '{}' field",
                    self.documents.record_path().unwrap_or_default()
                ),
            ));
        }
        self.documents.extract(response)
    }
}

#[async_trait]
impl DocumentSource for DataApiSource {
    async fn count(&self, collection: &str, filter: &JsonValue) -> Result<u64> {
        let mut body = self.body(collection);
        body.insert(
            "pipeline".into(),
            json!([{ "$match": filter }, { "$count": "count" }]),
        );

        let documents = self.action(collection, "aggregate", body).await?;
        // $count emits nothing at all when no document matches
        let Some(first) = documents.first() else {
            return Ok(0);
        };
        first
            .get("count")
            .and_then(count_value)
            .ok_or_else(|| Error::source_error(collection, "aggregate $count returned no count"))
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<RawDocument>> {
        let mut body = self.body(collection);
        body.insert("filter".into(), query.filter.clone());
        if let Some(sort) = &query.sort {
            body.insert("sort".into(), sort.to_json());
        }
        if let Some(limit) = query.limit {
            body.insert("limit".into(), json!(limit));
        }

        let documents = self.action(collection, "find", body).await?;
        tracing::debug!(collection, documents = documents.len(), "Fetched page");
        Ok(documents)
    }
}

/// Counts come back relaxed (`5`) or canonical (`{"$numberInt": "5"}`)
fn count_value(value: &JsonValue) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    value
        .as_object()
        .and_then(|map| map.get("$numberInt").or_else(|| map.get("$numberLong")))
        .and_then(JsonValue::as_str)
        .and_then(|s| s.parse().ok())
}
