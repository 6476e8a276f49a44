//! In-memory cache store implementation.
//!
//! This module provides [`MemoryStore`], an in-memory implementation of
//! [`CacheStore`] suitable for testing, development, and environments
//! without durable storage.
//!
//! # Features
//!
//! - **Thread-safe**: uses [`parking_lot::RwLock`] for concurrent access
//! - **Cheaply cloneable**: all clones share the same map via [`Arc`]
//! - **Synchronous access**: overrides the sync escape hatch, so
//!   [`CacheManager::clear_sync`](crate::CacheManager::clear_sync) works
//!
//! # Limitations
//!
//! - Data is lost when the process exits
//! - Not shared across execution contexts, so the advisory lock built on it
//!   only excludes tasks within one process

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::{StoreError, StoreResult},
    store::CacheStore,
};

/// In-memory cache store backed by a [`BTreeMap`].
///
/// # Example
///
/// ```
/// use walletauth_cache::{CacheStore, MemoryStore};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = MemoryStore::new();
/// store.set("greeting", "hello".into()).await.unwrap();
/// assert_eq!(store.get("greeting").await.unwrap().as_deref(), Some("hello"));
/// # });
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys. Test and diagnostic use.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.data.write().insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
    ) -> StoreResult<()> {
        let mut data = self.data.write();
        match (data.get(key), expected) {
            (None, None) => {
                data.insert(key.to_owned(), value);
                Ok(())
            }
            (Some(current), Some(expected)) if current == expected => {
                data.insert(key.to_owned(), value);
                Ok(())
            }
            _ => Err(StoreError::conflict()),
        }
    }

    fn get_sync(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    fn remove_sync(&self, key: &str) {
        self.data.write().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        store.set("k", "v".into()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);

        // Removing an absent key is a no-op.
        store.remove("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let store = MemoryStore::new();
        let clone = store.clone();
        store.set("shared", "1".into()).await.unwrap();
        assert_eq!(clone.get("shared").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_compare_and_set_insert_if_absent() {
        let store = MemoryStore::new();
        store.compare_and_set("lock", None, "holder-1".into()).await.unwrap();

        let err = store.compare_and_set("lock", None, "holder-2".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("holder-1"));
    }

    #[tokio::test]
    async fn test_compare_and_set_update_if_unchanged() {
        let store = MemoryStore::new();
        store.set("version", "1".into()).await.unwrap();

        store.compare_and_set("version", Some("1"), "2".into()).await.unwrap();
        let err = store.compare_and_set("version", Some("1"), "3".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        assert_eq!(store.get("version").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_compare_and_set_expected_on_absent_key() {
        let store = MemoryStore::new();
        let err = store.compare_and_set("missing", Some("x"), "y".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[test]
    fn test_sync_access() {
        let store = MemoryStore::new();
        store.data.write().insert("k".into(), "v".into());

        assert_eq!(store.get_sync("k").as_deref(), Some("v"));
        store.remove_sync("k");
        assert_eq!(store.get_sync("k"), None);
    }
}
