//! Durable manifest of cache entry keys per client identity.
//!
//! The manifest tracks the set of canonical cache keys that belong to one
//! client id, so bulk-clear can find them without scanning the whole store.
//! It is persisted as JSON under `@@walletauth@@::<client_id>` and is
//! updated on every entry write; it is consulted only during bulk-clear.
//!
//! Storage failures are swallowed: the manifest, like the cache itself, is
//! an optimization and must never crash a caller.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{key::CACHE_KEY_PREFIX, store::CacheStore};

/// Persisted manifest body.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestBody {
    keys: Vec<String>,
}

/// Tracks the cache entry keys written for a single client identity.
pub struct KeyManifest {
    store: std::sync::Arc<dyn CacheStore>,
    manifest_key: String,
}

impl KeyManifest {
    /// Creates a manifest for `client_id`, persisted in `store`.
    pub fn new(store: std::sync::Arc<dyn CacheStore>, client_id: &str) -> Self {
        Self { store, manifest_key: format!("{CACHE_KEY_PREFIX}::{client_id}") }
    }

    /// Adds a canonical key to the manifest. Adding a key that is already
    /// tracked is a no-op, so entry overwrites never duplicate.
    pub async fn add(&self, key: &str) {
        let mut keys = self.load().await;
        if keys.iter().any(|k| k == key) {
            return;
        }
        keys.push(key.to_owned());
        self.persist(keys).await;
    }

    /// Returns every tracked canonical key.
    pub async fn keys(&self) -> Vec<String> {
        self.load().await
    }

    /// Empties the manifest by removing its storage record.
    pub async fn clear(&self) {
        if let Err(err) = self.store.remove(&self.manifest_key).await {
            warn!(error = %err, "failed to clear cache key manifest");
        }
    }

    /// Synchronous variant of [`keys`](Self::keys), over the store's sync
    /// escape hatch. Returns an empty set when the store cannot serve
    /// synchronously.
    pub fn keys_sync(&self) -> Vec<String> {
        self.store
            .get_sync(&self.manifest_key)
            .and_then(|raw| serde_json::from_str::<ManifestBody>(&raw).ok())
            .map(|body| body.keys)
            .unwrap_or_default()
    }

    /// Synchronous variant of [`clear`](Self::clear).
    pub fn clear_sync(&self) {
        self.store.remove_sync(&self.manifest_key);
    }

    async fn load(&self) -> Vec<String> {
        match self.store.get(&self.manifest_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<ManifestBody>(&raw) {
                Ok(body) => body.keys,
                Err(err) => {
                    warn!(error = %err, "cache key manifest is corrupt; treating as empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "failed to read cache key manifest");
                Vec::new()
            }
        }
    }

    async fn persist(&self, keys: Vec<String>) {
        let body = ManifestBody { keys };
        let raw = match serde_json::to_string(&body) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "failed to encode cache key manifest");
                return;
            }
        };
        if let Err(err) = self.store.set(&self.manifest_key, raw).await {
            warn!(error = %err, "failed to write cache key manifest");
        }
    }
}
