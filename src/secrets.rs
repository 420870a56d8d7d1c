//! Secret resolution
//!
//! A secret is looked up in a directory-backed store first (one file per
//! key, as mounted by most secret managers) and then in an environment
//! variable. Lookups are cached for the life of the resolver, misses
//! included.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// Where to find one secret
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    /// File name within the secrets directory
    pub key: String,
    /// Environment variable used when the store has no value
    pub env: String,
}

impl SecretRef {
    pub fn new(key: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            env: env.into(),
        }
    }
}

/// Resolves secrets from a directory store with an environment fallback
#[derive(Debug, Default)]
pub struct SecretResolver {
    dir: Option<PathBuf>,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl SecretResolver {
    /// Resolver over an optional secrets directory
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolver that only reads the environment
    pub fn env_only() -> Self {
        Self::new(None)
    }

    /// Look up a secret; empty values count as missing
    pub fn get(&self, secret: &SecretRef) -> Option<String> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(&secret.key) {
            return cached.clone();
        }

        let value = self
            .from_store(&secret.key)
            .or_else(|| std::env::var(&secret.env).ok().filter(|v| !v.is_empty()));
        if value.is_none() {
            tracing::warn!(
                key = %secret.key,
                env = %secret.env,
                "Secret missing from store and environment"
            );
        }
        cache.insert(secret.key.clone(), value.clone());
        value
    }

    /// Look up a secret that must exist
    pub fn require(&self, secret: &SecretRef) -> Result<String> {
        self.get(secret).ok_or_else(|| Error::MissingSecret {
            key: secret.key.clone(),
            env: secret.env.clone(),
        })
    }

    fn from_store(&self, key: &str) -> Option<String> {
        let path = self.dir.as_ref()?.join(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Some(value.trim().to_string()).filter(|v| !v.is_empty()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read secret");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_wins_over_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("api-key"), "from-store\n").unwrap();
        std::env::set_var("DOCFLOW_SECRET_TEST_A", "from-env");

        let resolver = SecretResolver::new(Some(dir.path().to_path_buf()));
        let secret = SecretRef::new("api-key", "DOCFLOW_SECRET_TEST_A");
        assert_eq!(resolver.get(&secret), Some("from-store".to_string()));
    }

    #[test]
    fn test_env_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("DOCFLOW_SECRET_TEST_B", "from-env");

        let resolver = SecretResolver::new(Some(dir.path().to_path_buf()));
        let secret = SecretRef::new("absent", "DOCFLOW_SECRET_TEST_B");
        assert_eq!(resolver.require(&secret).unwrap(), "from-env");
    }

    #[test]
    fn test_values_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("rotating");
        std::fs::write(&file, "first").unwrap();

        let resolver = SecretResolver::new(Some(dir.path().to_path_buf()));
        let secret = SecretRef::new("rotating", "DOCFLOW_SECRET_TEST_UNSET_C");
        assert_eq!(resolver.get(&secret), Some("first".to_string()));

        std::fs::write(&file, "second").unwrap();
        assert_eq!(resolver.get(&secret), Some("first".to_string()));
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let resolver = SecretResolver::env_only();
        let secret = SecretRef::new("nothing", "DOCFLOW_SECRET_TEST_UNSET_D");
        let err = resolver.require(&secret).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("DOCFLOW_SECRET_TEST_UNSET_D"));
    }
}
