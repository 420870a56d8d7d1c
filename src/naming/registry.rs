//! Per-scope name registry

use std::collections::HashMap;

/// Tracks names handed out within one scope (a document, or a rename pass)
///
/// Names are compared case-insensitively. The first request for a name gets
/// it unchanged; later requests get `NAME_1`, `NAME_2`, and so on. A suffixed
/// name is itself registered, so it cannot be handed out twice.
#[derive(Debug, Clone, Default)]
pub struct NameRegistry {
    seen: HashMap<String, u32>,
}

impl NameRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `name`, or a numbered variant if it was already handed out
    pub fn uniquify(&mut self, name: &str) -> String {
        let key = name.to_uppercase();
        let Some(count) = self.seen.get(&key).copied() else {
            self.seen.insert(key, 0);
            return name.to_string();
        };

        let mut n = count;
        let candidate = loop {
            n += 1;
            let candidate = format!("{name}_{n}");
            if !self.seen.contains_key(&candidate.to_uppercase()) {
                break candidate;
            }
        };
        self.seen.insert(key, n);
        self.seen.insert(candidate.to_uppercase(), 0);
        candidate
    }

    /// Check whether a name has been handed out
    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains_key(&name.to_uppercase())
    }

    /// Number of distinct names handed out
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Check if nothing has been handed out yet
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
