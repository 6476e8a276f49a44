//! Cache store error types and result alias.
//!
//! These errors describe failures of the underlying key/value store. Callers
//! above the [`CacheManager`](crate::CacheManager) never see them: the cache
//! is an optimization, so the manager degrades every storage failure to a
//! miss (reads) or a no-op (writes).

use thiserror::Error;

/// Result type alias for cache store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during cache store operations.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Compare-and-set precondition failed: the current value does not
    /// match the expected value.
    #[error("Compare-and-set conflict")]
    Conflict,

    /// The store cannot be reached or refused the operation.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict() -> Self {
        Self::Conflict
    }

    /// Creates a new `Unavailable` error with the given message.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into() }
    }
}
