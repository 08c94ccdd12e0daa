//! In-memory token cache
//!
//! Holds Grants in a process-local map. Intended for tests and for hosts
//! without a platform keyring; it does not satisfy the secure-store
//! expectation of production deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use grantwell_core::{Grant, TokenCache};
use grantwell_domain::Result;
use tokio::sync::RwLock;

/// Process-local [`TokenCache`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    entries: RwLock<HashMap<String, Grant>>,
}

impl MemoryTokenCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn try_read(&self, key: &str) -> Result<Option<Grant>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn create_or_update(&self, grant: &Grant, key: &str) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), grant.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for infra::cache::memory.
    use super::*;

    /// Validates `MemoryTokenCache` behavior for the create/read/delete
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms a stored Grant is read back under its key.
    /// - Ensures deletion is idempotent and leaves the key empty.
    #[tokio::test]
    async fn test_create_read_delete() {
        let cache = MemoryTokenCache::new();
        let grant = Grant::for_client_credentials("access_1", None);

        assert!(cache.try_read("idp.example::client").await.unwrap().is_none());

        cache.create_or_update(&grant, "idp.example::client").await.unwrap();
        let read = cache.try_read("idp.example::client").await.unwrap().unwrap();
        assert_eq!(read.access_token().unwrap().value(), "access_1");

        cache.delete("idp.example::client").await.unwrap();
        cache.delete("idp.example::client").await.unwrap();
        assert!(cache.try_read("idp.example::client").await.unwrap().is_none());
    }

    /// Validates `MemoryTokenCache` behavior for the last-write-wins
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms a second write under the same key replaces the first.
    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = MemoryTokenCache::new();

        cache
            .create_or_update(&Grant::for_client_credentials("first", None), "key")
            .await
            .unwrap();
        cache
            .create_or_update(&Grant::for_client_credentials("second", None), "key")
            .await
            .unwrap();

        let read = cache.try_read("key").await.unwrap().unwrap();
        assert_eq!(read.access_token().unwrap().value(), "second");
    }
}
