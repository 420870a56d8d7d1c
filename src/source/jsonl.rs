//! JSON Lines export source

use super::query::FindQuery;
use super::DocumentSource;
use crate::decode::{JsonlDecoder, RecordDecoder};
use crate::document::RawDocument;
use crate::error::{Error, Result};
use crate::types::JsonValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Collections exported as `<dir>/<collection>.jsonl`
///
/// Each file is read once and kept in memory; queries run over the
/// decoded documents. Malformed lines are skipped.
#[derive(Debug)]
pub struct JsonlSource {
    dir: PathBuf,
    decoder: JsonlDecoder,
    loaded: RwLock<HashMap<String, Arc<Vec<RawDocument>>>>,
}

impl JsonlSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            decoder: JsonlDecoder::new(),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Directory holding the exports
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a collection's export
    pub fn path_for(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.jsonl"))
    }

    async fn documents(&self, collection: &str) -> Result<Arc<Vec<RawDocument>>> {
        if let Some(docs) = self.loaded.read().await.get(collection) {
            return Ok(Arc::clone(docs));
        }

        let mut loaded = self.loaded.write().await;
        if let Some(docs) = loaded.get(collection) {
            return Ok(Arc::clone(docs));
        }

        let path = self.path_for(collection);
        let body = match tokio::fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound {
                    path: path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let decoded = self.decoder.decode(&body)?;
        tracing::debug!(
            collection,
            path = %path.display(),
            documents = decoded.records.len(),
            skipped = decoded.skipped,
            "Loaded JSONL export"
        );
        let docs = Arc::new(decoded.records);
        loaded.insert(collection.to_string(), Arc::clone(&docs));
        Ok(docs)
    }
}

#[async_trait]
impl DocumentSource for JsonlSource {
    async fn count(&self, collection: &str, filter: &JsonValue) -> Result<u64> {
        let docs = self.documents(collection).await?;
        let matched = FindQuery::new().with_filter(filter.clone()).apply(&docs)?;
        Ok(matched.len() as u64)
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<RawDocument>> {
        let docs = self.documents(collection).await?;
        query.apply(&docs)
    }
}
