//! Token cache model and cross-context coordination for walletauth.
//!
//! This crate provides the storage side of the wallet-auth client: the
//! [`CacheStore`] persistence abstraction, the [`CacheManager`] that owns
//! every token entry read and write, the [`KeyManifest`] that makes
//! bulk-clear possible without scanning the store, and the [`StoreLock`]
//! advisory lock that serializes refresh-token exchanges across execution
//! contexts sharing one store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              walletauth-client              │
//! │        (AuthClient, silent renewal)         │
//! ├─────────────────────────────────────────────┤
//! │   CacheManager │ KeyManifest │ StoreLock    │
//! ├─────────────────────────────────────────────┤
//! │             CacheStore trait                │
//! ├──────────────┬──────────────────────────────┤
//! │ MemoryStore  │   durable platform storage   │
//! │  (testing)   │   (external implementation)  │
//! └──────────────┴──────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use walletauth_cache::{CacheEntry, CacheKey, CacheManager, MemoryStore, system_clock};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let cache = CacheManager::new(store, "my-client", system_clock());
//!
//! cache
//!     .set(CacheEntry {
//!         client_id: "my-client".into(),
//!         audience: "default".into(),
//!         scope: String::new(),
//!         access_token: "AT".into(),
//!         refresh_token: Some("RT".into()),
//!         id_token: None,
//!         expires_in: 3600,
//!         granted_scopes: None,
//!         decoded_token: None,
//!     })
//!     .await;
//!
//! let key = CacheKey::new("my-client", "default", "");
//! assert!(cache.get(&key, 0).await.is_some());
//! # });
//! ```
//!
//! # Failure Handling
//!
//! The cache is best-effort by contract: storage errors never propagate out
//! of [`CacheManager`]. Reads degrade to misses and writes to no-ops, so a
//! broken store costs extra network refreshes, never a crash.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Persisted token record and decoded-token projections.
pub mod entry;
/// Cache store error types.
pub mod error;
/// Cache key identity and canonical encoding.
pub mod key;
/// Cross-context advisory lock.
pub mod lock;
/// Cache manager.
pub mod manager;
/// Key manifest for bulk-clear.
pub mod manifest;
/// In-memory store implementation.
pub mod memory;
/// Cache store trait.
pub mod store;

pub use entry::{Account, CacheEntry, DecodedToken, IdTokenClaims};
pub use error::{StoreError, StoreResult};
pub use key::{CacheKey, CACHE_KEY_PREFIX};
pub use lock::{SessionLock, StoreLock, DEFAULT_LOCK_STALE_MS};
pub use manager::{system_clock, CacheManager, NowFn};
pub use manifest::KeyManifest;
pub use memory::MemoryStore;
pub use store::CacheStore;
