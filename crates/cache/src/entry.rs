//! Persisted token record and decoded-token projections.
//!
//! A [`CacheEntry`] is written on every successful login or refresh-token
//! exchange, always as a whole-entry replace of its key. An entry whose
//! `access_token` is empty is not usable and is treated as absent by the
//! [`CacheManager`](crate::CacheManager).

use serde::{Deserialize, Serialize};

/// Verified claims carried by an issued token.
///
/// The claim set is open: anything beyond the registered claims is kept in
/// `extra` so projections like [`Account`] survive a cache round-trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer URL of the token service.
    pub iss: String,
    /// Audience the token was issued for.
    pub aud: String,
    /// Subject — the wallet address that proved ownership.
    pub sub: String,
    /// Expiration time (seconds since epoch).
    pub exp: i64,
    /// Issued at (seconds since epoch).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Login nonce the token was bound to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Unregistered claims, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// User/account projection embedded in verified claims.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Wallet address the session belongs to.
    pub address: String,
    /// Last-updated timestamp reported by the token service, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A token together with its verified claims and account projection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecodedToken {
    /// The raw token string the claims were decoded from.
    pub raw: String,
    /// Verified claims.
    pub claims: IdTokenClaims,
    /// Account projection derived from the claims.
    pub account: Account,
}

/// Persisted token record, keyed by `(client_id, audience, scope)`.
///
/// # Lifecycle
///
/// Created on successful nonce-signature login or refresh-token exchange;
/// overwritten on every successful refresh; removed on logout or explicit
/// cache clear. Never partially updated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Client identifier the entry belongs to.
    pub client_id: String,
    /// Audience the token was issued for.
    pub audience: String,
    /// Scope the token was requested with (part of the key; may be empty).
    pub scope: String,
    /// Opaque access token. Empty means the entry is unusable.
    pub access_token: String,
    /// Refresh token for silent renewal, when the server issued one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Identity token, when the server issued one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Token lifetime in seconds from issuance.
    pub expires_in: i64,
    /// Space-joined scopes actually granted at issuance, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_scopes: Option<String>,
    /// Verified claims and account projection for the access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded_token: Option<DecodedToken>,
}

impl CacheEntry {
    /// Returns `true` when the entry carries a usable access token.
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty()
    }
}
