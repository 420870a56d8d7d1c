//! Cross-batch column set

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Handle passed to every task of a collection
pub type SharedSchema = Arc<SchemaUnifier>;

/// Monotonically growing set of column names
///
/// An `observe` is applied under one write lock, so a concurrent `snapshot`
/// sees either none or all of it. Names are never removed.
#[derive(Debug, Default)]
pub struct SchemaUnifier {
    columns: RwLock<BTreeSet<String>>,
}

impl SchemaUnifier {
    /// Create an empty unifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty unifier behind a shared handle
    pub fn shared() -> SharedSchema {
        Arc::new(Self::new())
    }

    /// Union a batch's columns into the set, returning how many were new
    pub async fn observe<I, S>(&self, columns: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = self.columns.write().await;
        let before = set.len();
        set.extend(columns.into_iter().map(Into::into));
        set.len() - before
    }

    /// Current columns, sorted
    pub async fn snapshot(&self) -> Vec<String> {
        self.columns.read().await.iter().cloned().collect()
    }

    /// Check if a column has been observed
    pub async fn contains(&self, column: &str) -> bool {
        self.columns.read().await.contains(column)
    }

    /// Current schema width
    pub async fn len(&self) -> usize {
        self.columns.read().await.len()
    }

    /// Check if nothing has been observed yet
    pub async fn is_empty(&self) -> bool {
        self.columns.read().await.is_empty()
    }
}
