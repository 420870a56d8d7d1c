//! In-memory source

use super::query::FindQuery;
use super::DocumentSource;
use crate::document::RawDocument;
use crate::error::{Error, Result};
use crate::types::JsonValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Collections held in memory
#[derive(Debug, Default)]
pub struct MemorySource {
    collections: HashMap<String, Vec<RawDocument>>,
    finds: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a collection
    #[must_use]
    pub fn with_collection(mut self, name: impl Into<String>, docs: Vec<RawDocument>) -> Self {
        self.collections.insert(name.into(), docs);
        self
    }

    /// Number of `find` calls served so far
    pub fn find_calls(&self) -> usize {
        self.finds.load(Ordering::Relaxed)
    }

    fn collection(&self, name: &str) -> Result<&[RawDocument]> {
        self.collections
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::source_error(name, "no such collection"))
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn count(&self, collection: &str, filter: &JsonValue) -> Result<u64> {
        let matched = FindQuery::new()
            .with_filter(filter.clone())
            .apply(self.collection(collection)?)?;
        Ok(matched.len() as u64)
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<RawDocument>> {
        self.finds.fetch_add(1, Ordering::Relaxed);
        query.apply(self.collection(collection)?)
    }
}
