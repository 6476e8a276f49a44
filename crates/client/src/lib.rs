//! Wallet-signature authentication client.
//!
//! This crate binds a wallet-based signature challenge to a token-issuing
//! backend and manages the lifecycle of the resulting access/refresh
//! tokens: caching, cross-context coordination, and automatic silent
//! renewal.
//!
//! # Flow
//!
//! ```text
//! caller → AuthClient → CacheManager (fast path)
//!        → [miss] cross-context lock → single-flight
//!        → refresh exchange (TokenEndpoint) → verification (TokenVerifier)
//!        → CacheManager write → caller
//! ```
//!
//! # Example
//!
//! ```no_run
//! use walletauth_client::{AuthClient, GetTokenOptions};
//!
//! # async fn example() -> Result<(), walletauth_client::AuthError> {
//! let client = AuthClient::builder("my-client-id").build().await?;
//!
//! // Login handshake: the wallet collaborator signs the nonce.
//! let nonce = client.get_nonce_to_sign("0xabc...").await?;
//! let signature = sign_with_wallet(&nonce);
//! client.login_with_signed_nonce("0xabc...", &signature).await?;
//!
//! // Later: silent renewal, deduplicated across concurrent callers.
//! let token = client.get_token_silently(GetTokenOptions::default()).await?;
//! # Ok(())
//! # }
//! # fn sign_with_wallet(_nonce: &str) -> String { unimplemented!() }
//! ```
//!
//! # External collaborators
//!
//! Wallet connection/signing, durable platform storage, HTTP transport, and
//! full cryptographic token verification live behind traits
//! ([`TokenEndpoint`], [`TokenVerifier`], and the store/lock traits in
//! [`walletauth_cache`]); this crate owns the lifecycle and concurrency
//! logic between them.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Token endpoint wire types and HTTP transport.
pub mod api;
/// Auth client orchestration.
pub mod client;
/// Per-install device identifier.
pub mod device;
/// Error taxonomy.
pub mod error;
/// In-process single-flight coordinator.
pub mod single_flight;
/// Nonce bookkeeping and login state machine.
pub mod state;
/// Token verification collaborator.
pub mod verify;

pub use api::{
    ClientDescriptor, HasRoleResponse, HttpTokenEndpoint, LoginRequest, LoginResponse,
    LogoutRequest, NonceRequest, NonceResponse, RefreshRequest, RefreshResponse, TokenEndpoint,
    CLIENT_HEADER, REQUEST_TIMEOUT_MS,
};
pub use client::{
    AuthClient, AuthClientBuilder, GetTokenOptions, LogoutOptions, VerboseTokenResponse,
    DEFAULT_AUDIENCE, DEFAULT_DOMAIN, GET_TOKEN_SILENTLY_LOCK, LOCK_ACQUIRE_ATTEMPTS,
    LOCK_ACQUIRE_TIMEOUT_MS, TOKEN_EXPIRY_LEEWAY_SECS,
};
pub use error::{AuthError, AuthResult};
pub use single_flight::SingleFlight;
pub use state::{normalize_address, LoginStep, NonceMap};
pub use verify::{decode_token_claims, ClaimsVerifier, TokenVerifier};

// Re-export the cache-side types callers interact with directly.
pub use walletauth_cache::{
    Account, CacheEntry, CacheKey, CacheManager, CacheStore, DecodedToken, IdTokenClaims,
    MemoryStore, SessionLock, StoreLock,
};
