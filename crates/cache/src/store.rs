//! Cache store trait definition.
//!
//! This module defines the [`CacheStore`] trait, the persistence abstraction
//! underneath the token cache. Implementations may be durable (platform
//! key/value storage shared across execution contexts) or process-lifetime
//! ([`MemoryStore`](crate::MemoryStore)).
//!
//! # Design
//!
//! The trait is a minimal string-keyed, string-valued interface:
//!
//! - **Values are opaque strings**: the layers above serialize to JSON
//!   before writing, so backends make no assumptions about content.
//! - **Async by default**: durable backends may sit behind IPC or disk I/O.
//! - **Compare-and-set**: the one atomic primitive, enough to build the
//!   cross-context advisory lock (see [`StoreLock`](crate::StoreLock)).
//! - **Sync escape hatch**: [`get_sync`](CacheStore::get_sync) and
//!   [`remove_sync`](CacheStore::remove_sync) exist for the synchronous
//!   bulk-clear path. Backends that cannot serve synchronously keep the
//!   defaults, which report "unavailable" (miss / no-op).

use async_trait::async_trait;

use crate::error::StoreResult;

/// Abstract key/value store for cache entries, the key manifest, and lock
/// records.
///
/// Implementations must be thread-safe (`Send + Sync`) and safe for
/// concurrent use from multiple tasks. When a store is shared by several
/// independent execution contexts, [`compare_and_set`](Self::compare_and_set)
/// must be atomic across all of them.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Retrieves the value for `key`, or `None` if absent.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `value` under `key`, overwriting any existing value.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn set(&self, key: &str, value: String) -> StoreResult<()>;

    /// Removes `key`. Removing an absent key is a no-op.
    #[must_use = "store operations may fail and errors must be handled"]
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Atomically sets `key` to `value` if the current value matches
    /// `expected`.
    ///
    /// # Semantics
    ///
    /// - **`expected: None`** — insert-if-absent. Succeeds only when the key does not exist.
    /// - **`expected: Some(v)`** — update-if-unchanged. Succeeds only when the current value is an
    ///   exact string match of `v`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`](crate::StoreError::Conflict) when the
    /// precondition does not hold.
    #[must_use = "compare-and-set may fail with a conflict and errors must be handled"]
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        value: String,
    ) -> StoreResult<()>;

    /// Synchronous read, for callers that cannot suspend.
    ///
    /// The default implementation reports a miss, indistinguishable from
    /// storage being unavailable. Backends with synchronous access (e.g.
    /// [`MemoryStore`](crate::MemoryStore)) override this.
    fn get_sync(&self, _key: &str) -> Option<String> {
        None
    }

    /// Synchronous removal, for callers that cannot suspend.
    ///
    /// The default implementation is a silent no-op; see
    /// [`get_sync`](Self::get_sync).
    fn remove_sync(&self, _key: &str) {}
}
