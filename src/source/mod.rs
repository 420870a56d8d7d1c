//! Document sources
//!
//! A source serves documents of named collections through two calls,
//! `count` and `find`. The pipeline pages with a sort-key cursor:
//!
//! ```text
//! find(filter: { <sort_key>: { $gt: <last seen> } }, sort: { <sort_key>: 1 }, limit: n)
//! ```
//!
//! Adapters:
//! - [`DataApiSource`] - a MongoDB Atlas Data API endpoint
//! - [`JsonlSource`] - one `<collection>.jsonl` export per collection
//! - [`MemorySource`] - documents held in memory

mod data_api;
mod jsonl;
mod memory;
mod query;

pub use data_api::{DataApiSource, DEFAULT_API_KEY_HEADER, DEFAULT_RECORDS_PATH};
pub use jsonl::JsonlSource;
pub use memory::MemorySource;
pub use query::{compare_values, matches_filter, FindQuery, SortKey, SortOrder};

use crate::document::RawDocument;
use crate::error::Result;
use crate::types::JsonValue;
use async_trait::async_trait;

/// A store of document collections
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Number of documents matching `filter`
    async fn count(&self, collection: &str, filter: &JsonValue) -> Result<u64>;

    /// Documents matching the query, in query order
    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<RawDocument>>;
}
