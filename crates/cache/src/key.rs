//! Cache key identity and canonical encoding.
//!
//! A token cache entry is identified by the `(client_id, audience, scope)`
//! triple. The canonical string form is a deterministic join of those
//! fields under a fixed prefix and is used directly as the storage key, so
//! one entry exists per distinct triple.

use crate::entry::CacheEntry;

/// Fixed prefix shared by every key this crate writes to the store.
///
/// The prefix namespaces cache entries and the key manifest away from other
/// users of the same store (e.g. the device identifier or lock records).
pub const CACHE_KEY_PREFIX: &str = "@@walletauth@@";

/// Composite identity of a token cache entry.
///
/// # Example
///
/// ```
/// use walletauth_cache::CacheKey;
///
/// let key = CacheKey::new("my-client", "default", "");
/// assert_eq!(key.canonical(), "@@walletauth@@::my-client::default::");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Client identifier the entry belongs to.
    pub client_id: String,
    /// Audience the token was issued for.
    pub audience: String,
    /// Scope the token was requested with. Empty scope is permitted.
    pub scope: String,
}

impl CacheKey {
    /// Creates a key from its three components.
    pub fn new(
        client_id: impl Into<String>,
        audience: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self { client_id: client_id.into(), audience: audience.into(), scope: scope.into() }
    }

    /// Derives the key from the identity fields of a [`CacheEntry`].
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self::new(entry.client_id.clone(), entry.audience.clone(), entry.scope.clone())
    }

    /// Returns the canonical storage-key string for this identity.
    pub fn canonical(&self) -> String {
        format!("{CACHE_KEY_PREFIX}::{}::{}::{}", self.client_id, self.audience, self.scope)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_is_deterministic() {
        let a = CacheKey::new("client", "default", "read:all");
        let b = CacheKey::new("client", "default", "read:all");
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(a.canonical(), "@@walletauth@@::client::default::read:all");
    }

    #[test]
    fn test_empty_scope_permitted() {
        let key = CacheKey::new("client", "default", "");
        assert_eq!(key.canonical(), "@@walletauth@@::client::default::");
    }

    #[test]
    fn test_distinct_triples_distinct_keys() {
        let a = CacheKey::new("client", "default", "");
        let b = CacheKey::new("client", "api", "");
        assert_ne!(a.canonical(), b.canonical());
    }
}
