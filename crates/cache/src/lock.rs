//! Cross-context advisory lock over a shared cache store.
//!
//! Independent execution contexts that share one durable [`CacheStore`]
//! coordinate refresh-token exchanges through an advisory lock: a JSON lock
//! record written with compare-and-set, polled until acquired or timed out.
//! The lock only excludes well-behaved participants that check it.
//!
//! # Protocol
//!
//! - **Acquire**: insert-if-absent via [`CacheStore::compare_and_set`]. If a
//!   record exists but is stale (held longer than `stale_after_ms`, e.g. by
//!   a crashed context), take it over with update-if-unchanged. Otherwise
//!   sleep with jitter and retry until the per-call timeout elapses.
//! - **Release**: remove the record, but only while it still names this
//!   holder. Release is best-effort; a missed release is healed by the
//!   staleness takeover.
//!
//! Storage failures degrade to "not acquired" / no-op — a caller that
//! cannot acquire the lock must not proceed to an unsynchronized refresh,
//! and the layer above surfaces that as a timeout.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::{
    distr::{Alphanumeric, SampleString},
    Rng,
};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::store::CacheStore;

/// Default age in milliseconds after which a held lock is considered
/// abandoned and may be taken over.
pub const DEFAULT_LOCK_STALE_MS: i64 = 10_000;

/// Advisory mutual exclusion usable across independent execution contexts.
///
/// `acquire` bounds its own wait: it returns `false` instead of blocking
/// past `timeout_ms`. Neither method errors; failure to acquire and failure
/// to release are both absorbed.
#[async_trait]
pub trait SessionLock: Send + Sync {
    /// Attempts to acquire the named lock within `timeout_ms`.
    async fn acquire(&self, name: &str, timeout_ms: u64) -> bool;

    /// Releases the named lock if held by this caller.
    async fn release(&self, name: &str);
}

/// Persisted lock record.
#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    holder: String,
    expires_at_ms: i64,
}

/// [`SessionLock`] implemented with compare-and-set on a shared store.
pub struct StoreLock {
    store: Arc<dyn CacheStore>,
    holder_id: String,
    stale_after_ms: i64,
}

impl StoreLock {
    /// Creates a lock over `store` with a random holder identity and the
    /// default staleness window.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_staleness(store, DEFAULT_LOCK_STALE_MS)
    }

    /// Creates a lock with an explicit staleness window. Test use mostly.
    pub fn with_staleness(store: Arc<dyn CacheStore>, stale_after_ms: i64) -> Self {
        let holder_id = Alphanumeric.sample_string(&mut rand::rng(), 16);
        Self { store, holder_id, stale_after_ms }
    }

    fn record(&self) -> Option<String> {
        let record = LockRecord {
            holder: self.holder_id.clone(),
            expires_at_ms: now_ms() + self.stale_after_ms,
        };
        serde_json::to_string(&record).ok()
    }

    /// One acquisition attempt: insert-if-absent, or steal a stale record.
    async fn try_acquire(&self, name: &str) -> bool {
        let Some(mine) = self.record() else { return false };

        match self.store.get(name).await {
            Ok(None) => self.store.compare_and_set(name, None, mine).await.is_ok(),
            Ok(Some(raw)) => {
                let stale = serde_json::from_str::<LockRecord>(&raw)
                    .map(|rec| rec.expires_at_ms <= now_ms())
                    // An unreadable record cannot name a live holder.
                    .unwrap_or(true);
                if !stale {
                    return false;
                }
                let taken = self.store.compare_and_set(name, Some(&raw), mine).await.is_ok();
                if taken {
                    debug!(lock = name, "took over stale lock record");
                }
                taken
            }
            Err(err) => {
                warn!(error = %err, lock = name, "lock read failed");
                false
            }
        }
    }
}

#[async_trait]
impl SessionLock for StoreLock {
    async fn acquire(&self, name: &str, timeout_ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.try_acquire(name).await {
                debug!(lock = name, holder = %self.holder_id, "lock acquired");
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let jitter = rand::rng().random_range(50..150u64);
            let nap = Duration::from_millis(jitter).min(deadline - now);
            sleep(nap).await;
        }
    }

    async fn release(&self, name: &str) {
        let held_by_us = match self.store.get(name).await {
            Ok(Some(raw)) => serde_json::from_str::<LockRecord>(&raw)
                .map(|rec| rec.holder == self.holder_id)
                .unwrap_or(false),
            Ok(None) => false,
            Err(err) => {
                warn!(error = %err, lock = name, "lock read failed during release");
                false
            }
        };
        if !held_by_us {
            return;
        }
        if let Err(err) = self.store.remove(name).await {
            warn!(error = %err, lock = name, "lock release failed");
        }
        debug!(lock = name, holder = %self.holder_id, "lock released");
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
