//! Cache manager: the only component that reads or writes token entries.
//!
//! [`CacheManager`] owns all access to [`CacheEntry`] records and the
//! [`KeyManifest`]. It builds canonical keys, wraps entries with an
//! absolute expiry on write, enforces the proactive-renewal leeway on read,
//! and performs manifest-driven bulk clears.
//!
//! # Failure handling
//!
//! The cache is an optimization, never a correctness dependency. Every
//! storage failure degrades to a miss (reads) or a no-op (writes) with a
//! `warn!`, so an unavailable store means "always refetch", not a crash.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{entry::CacheEntry, key::CacheKey, manifest::KeyManifest, store::CacheStore};

/// Clock function returning seconds since the Unix epoch.
///
/// Injectable so tests can step time past an entry's expiry.
pub type NowFn = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Returns the default wall-clock [`NowFn`].
pub fn system_clock() -> NowFn {
    Arc::new(|| chrono::Utc::now().timestamp())
}

/// Storage envelope for an entry: the body plus the absolute expiry
/// computed at write time from `now + expires_in`.
#[derive(Debug, Serialize, Deserialize)]
struct WrappedEntry {
    body: CacheEntry,
    expires_at: i64,
}

/// Reads and writes token cache entries, enforcing expiry and keeping the
/// key manifest consistent with the store.
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    manifest: KeyManifest,
    now: NowFn,
}

impl CacheManager {
    /// Creates a manager over `store` for `client_id`, with the given clock.
    pub fn new(store: Arc<dyn CacheStore>, client_id: &str, now: NowFn) -> Self {
        let manifest = KeyManifest::new(Arc::clone(&store), client_id);
        Self { store, manifest, now }
    }

    /// Writes `entry` under its derived key and records the key in the
    /// manifest. Writing the same key twice overwrites; it never duplicates.
    pub async fn set(&self, entry: CacheEntry) {
        let key = CacheKey::from_entry(&entry).canonical();
        let expires_at = (self.now)() + entry.expires_in;
        let wrapped = WrappedEntry { body: entry, expires_at };

        let raw = match serde_json::to_string(&wrapped) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, %key, "failed to encode cache entry");
                return;
            }
        };
        if let Err(err) = self.store.set(&key, raw).await {
            warn!(error = %err, %key, "failed to write cache entry");
            return;
        }
        self.manifest.add(&key).await;
    }

    /// Reads the entry for `key`.
    ///
    /// Returns `None` (a cache miss) when the entry is absent or unreadable,
    /// when its access token is missing, or when its absolute expiry is
    /// within `leeway_secs` of now — proactive expiry that triggers renewal
    /// before the token is actually dead. The underlying record is left in
    /// place in all cases.
    pub async fn get(&self, key: &CacheKey, leeway_secs: i64) -> Option<CacheEntry> {
        let canonical = key.canonical();
        let raw = match self.store.get(&canonical).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, key = %canonical, "cache read failed; treating as miss");
                return None;
            }
        };

        let wrapped: WrappedEntry = match serde_json::from_str(&raw) {
            Ok(wrapped) => wrapped,
            Err(err) => {
                warn!(error = %err, key = %canonical, "cache entry is corrupt; treating as miss");
                return None;
            }
        };

        if !wrapped.body.is_usable() {
            return None;
        }
        let now = (self.now)();
        if wrapped.expires_at - leeway_secs <= now {
            debug!(key = %canonical, expires_at = wrapped.expires_at, "cache entry within expiry leeway");
            return None;
        }

        Some(wrapped.body)
    }

    /// Removes every manifest-tracked entry, then empties the manifest.
    /// Entries already missing from the store are tolerated per key.
    pub async fn clear(&self) {
        for key in self.manifest.keys().await {
            if let Err(err) = self.store.remove(&key).await {
                warn!(error = %err, %key, "failed to remove cache entry during clear");
            }
        }
        self.manifest.clear().await;
    }

    /// Same contract as [`clear`](Self::clear), over the store's synchronous
    /// escape hatch. On stores without synchronous access this is a silent
    /// no-op — indistinguishable from storage being unavailable, and never
    /// an error to the caller.
    pub fn clear_sync(&self) {
        for key in self.manifest.keys_sync() {
            self.store.remove_sync(&key);
        }
        self.manifest.clear_sync();
    }
}
