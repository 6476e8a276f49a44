//! Authentication error taxonomy.
//!
//! Every failure surfaced by this crate is a variant of [`AuthError`], a
//! tagged type with kind-specific payloads that callers can match
//! exhaustively (modulo the wildcard arm required by `#[non_exhaustive]`).
//!
//! # Propagation policy
//!
//! - Nonce fetch and login exchange failures propagate unchanged.
//! - Inside silent token retrieval, only [`AuthError::NotLoggedIn`] and
//!   [`AuthError::Timeout`] escape to the caller; every other failure is
//!   normalized to a `None` token at the [`AuthClient`](crate::AuthClient)
//!   boundary.
//! - `has_role` and `check_session` never propagate; they collapse every
//!   failure to `false`.
//!
//! The enum derives `Clone` so a settled result can be shared with every
//! caller coalesced by the single-flight coordinator.

use thiserror::Error;

/// Result type alias for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors produced by the auth client and its collaborators.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Network or server failure without more specific structure.
    #[error("{description}")]
    Generic {
        /// Machine-readable error code.
        error: String,
        /// Human-readable description.
        description: String,
    },

    /// Provider-level failure carrying a numeric code.
    #[error("{description} (code {code})")]
    Coded {
        /// Machine-readable error code.
        error: String,
        /// Human-readable description.
        description: String,
        /// Provider-reported numeric code.
        code: i64,
    },

    /// Failure while handling an authentication flow, carrying the request
    /// state it belonged to.
    #[error("{description}")]
    Authentication {
        /// Machine-readable error code.
        error: String,
        /// Human-readable description.
        description: String,
        /// Request state the failure belongs to.
        state: String,
    },

    /// Lock acquisition or silent-auth timed out. The caller knows no
    /// renewal occurred.
    #[error("Timeout")]
    Timeout,

    /// No refresh token is available; the session is over until the user
    /// logs in again.
    #[error("Not logged in: {description}")]
    NotLoggedIn {
        /// Human-readable description.
        description: String,
    },

    /// OAuth failure shape reported by the authorization server.
    #[error("{error}: {}", description.as_deref().unwrap_or("no description"))]
    OAuth {
        /// Server-reported error code.
        error: String,
        /// Server-reported description, when present.
        description: Option<String>,
    },
}

impl AuthError {
    /// Creates a new `Generic` error.
    #[must_use]
    pub fn generic(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Generic { error: error.into(), description: description.into() }
    }

    /// Creates a new `Coded` error.
    #[must_use]
    pub fn coded(error: impl Into<String>, description: impl Into<String>, code: i64) -> Self {
        Self::Coded { error: error.into(), description: description.into(), code }
    }

    /// Creates a new `Authentication` error.
    #[must_use]
    pub fn authentication(
        error: impl Into<String>,
        description: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self::Authentication {
            error: error.into(),
            description: description.into(),
            state: state.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Creates a new `NotLoggedIn` error.
    #[must_use]
    pub fn not_logged_in(description: impl Into<String>) -> Self {
        Self::NotLoggedIn { description: description.into() }
    }

    /// Creates a new `OAuth` error.
    #[must_use]
    pub fn oauth(error: impl Into<String>, description: Option<String>) -> Self {
        Self::OAuth { error: error.into(), description }
    }

    /// Returns `true` for the two conditions that escape silent token
    /// retrieval instead of degrading to a `None` token.
    #[must_use]
    pub fn escapes_silent_retrieval(&self) -> bool {
        matches!(self, Self::Timeout | Self::NotLoggedIn { .. })
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        Self::generic("request_error", err.to_string())
    }
}
