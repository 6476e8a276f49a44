//! Auth client orchestration.
//!
//! [`AuthClient`] ties the cache manager, cross-context lock, single-flight
//! coordinator, token endpoint, and verifier together behind the public
//! operations: nonce issuance, the nonce-signature login handshake, silent
//! token retrieval, role checks, and logout.
//!
//! # Silent retrieval protocol
//!
//! ```text
//! caller → single-flight (one execution per client/audience/scope)
//!        → cache fast path (60 s proactive leeway)
//!        → [miss] cross-context lock (10 × 5000 ms bounded acquisition)
//!        → double-checked cache read under the lock
//!        → [miss] refresh exchange → verify → cache write
//!        → unconditional lock release
//! ```
//!
//! Failure policy is two-tier by design: [`AuthError::NotLoggedIn`] and
//! [`AuthError::Timeout`] propagate so callers can tell "log in again" from
//! "try later"; every other failure inside the protocol is warn-logged and
//! becomes a `None` token.

use std::{future::Future, sync::Arc};

use tracing::{debug, warn};
use walletauth_cache::{
    system_clock, Account, CacheEntry, CacheKey, CacheManager, CacheStore, IdTokenClaims,
    MemoryStore, NowFn, SessionLock, StoreLock,
};

use crate::{
    api::{
        encode_role, normalize_domain, ClientDescriptor, HttpTokenEndpoint, LoginRequest,
        LogoutRequest, NonceRequest, RefreshRequest, TokenEndpoint,
    },
    device,
    error::{AuthError, AuthResult},
    single_flight::SingleFlight,
    state::{LoginStep, NonceMap},
    verify::{ClaimsVerifier, TokenVerifier},
};

/// Default token service domain.
pub const DEFAULT_DOMAIN: &str = "https://api.walletauth.dev";

/// Audience used when the caller does not name one.
pub const DEFAULT_AUDIENCE: &str = "default";

/// Proactive-renewal leeway: a cached token within this many seconds of its
/// expiry is treated as a miss so renewal hides refresh latency.
pub const TOKEN_EXPIRY_LEEWAY_SECS: i64 = 60;

/// Number of acquisition attempts against the cross-context lock.
pub const LOCK_ACQUIRE_ATTEMPTS: u32 = 10;

/// Per-attempt wait bound for the cross-context lock, in milliseconds.
pub const LOCK_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

/// Name of the single global renewal lock shared by every silent-retrieval
/// attempt for this client installation, regardless of audience or scope.
pub const GET_TOKEN_SILENTLY_LOCK: &str = "walletauth.lock.get_token_silently";

/// Options for silent token retrieval.
#[derive(Debug, Clone, Default)]
pub struct GetTokenOptions {
    /// Audience to request a token for. Defaults to [`DEFAULT_AUDIENCE`].
    pub audience: Option<String>,
    /// When `true`, skips the cache fast path and double-checked read.
    pub ignore_cache: bool,
}

/// Options for [`AuthClient::logout`].
#[derive(Debug, Clone, Default)]
pub struct LogoutOptions {
    /// When `true`, clears local state only and skips the server call.
    pub local_only: bool,
}

/// Verbose silent-retrieval result: the token endpoint response shape minus
/// any refresh token.
#[derive(Debug, Clone, PartialEq)]
pub struct VerboseTokenResponse {
    /// Identity token, when one is cached.
    pub id_token: Option<String>,
    /// The access token.
    pub access_token: String,
    /// Scopes granted at issuance, when reported.
    pub scope: Option<String>,
    /// Token lifetime in seconds from issuance.
    pub expires_in: i64,
}

/// Retries an asynchronous boolean operation up to `attempts` times,
/// stopping at the first `true`.
async fn retry<F, Fut>(op: F, attempts: u32) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..attempts {
        if op().await {
            return true;
        }
    }
    false
}

/// Builds an [`AuthClient`], supplying defaults for every collaborator that
/// is not overridden.
pub struct AuthClientBuilder {
    client_id: String,
    domain: String,
    issuer: Option<String>,
    store: Option<Arc<dyn CacheStore>>,
    endpoint: Option<Arc<dyn TokenEndpoint>>,
    verifier: Option<Arc<dyn TokenVerifier>>,
    lock: Option<Arc<dyn SessionLock>>,
    now: Option<NowFn>,
}

impl AuthClientBuilder {
    /// Starts a builder for the given client identity.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            domain: DEFAULT_DOMAIN.to_owned(),
            issuer: None,
            store: None,
            endpoint: None,
            verifier: None,
            lock: None,
            now: None,
        }
    }

    /// Overrides the token service domain.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Overrides the expected token issuer.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Supplies the shared cache store (defaults to [`MemoryStore`]).
    #[must_use]
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Supplies the token endpoint (defaults to [`HttpTokenEndpoint`]).
    #[must_use]
    pub fn endpoint(mut self, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Supplies the token verifier (defaults to [`ClaimsVerifier`]).
    #[must_use]
    pub fn verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Supplies the cross-context lock (defaults to a [`StoreLock`] over
    /// the cache store).
    #[must_use]
    pub fn lock(mut self, lock: Arc<dyn SessionLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Supplies the clock. Test use mostly.
    #[must_use]
    pub fn clock(mut self, now: NowFn) -> Self {
        self.now = Some(now);
        self
    }

    /// Builds the client, loading (or creating) the per-install device id.
    ///
    /// # Errors
    ///
    /// Returns an error only when the default HTTP transport cannot be
    /// constructed.
    pub async fn build(self) -> AuthResult<AuthClient> {
        let domain_url = normalize_domain(&self.domain);
        let token_issuer = match self.issuer {
            Some(issuer) if issuer.starts_with("https://") => issuer,
            Some(issuer) => format!("https://{issuer}/"),
            None => format!("{domain_url}/"),
        };

        let now = self.now.unwrap_or_else(system_clock);
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let endpoint = match self.endpoint {
            Some(endpoint) => endpoint,
            None => Arc::new(HttpTokenEndpoint::new(&domain_url)?),
        };
        let verifier = self.verifier.unwrap_or_else(|| {
            Arc::new(ClaimsVerifier::new(
                token_issuer.clone(),
                DEFAULT_AUDIENCE,
                Arc::clone(&now),
            ))
        });
        let lock = self
            .lock
            .unwrap_or_else(|| Arc::new(StoreLock::new(Arc::clone(&store))));

        let device_id = device::load_or_create(store.as_ref()).await;
        let cache = CacheManager::new(Arc::clone(&store), &self.client_id, Arc::clone(&now));

        Ok(AuthClient {
            client_id: self.client_id,
            domain_url,
            endpoint,
            verifier,
            cache,
            lock,
            nonce_map: NonceMap::new(),
            single_flight: SingleFlight::new(),
            device_id,
        })
    }
}

/// Wallet-signature auth client: one instance per logical client identity,
/// holding all session state explicitly (no process-wide singletons).
pub struct AuthClient {
    client_id: String,
    domain_url: String,
    endpoint: Arc<dyn TokenEndpoint>,
    verifier: Arc<dyn TokenVerifier>,
    cache: CacheManager,
    lock: Arc<dyn SessionLock>,
    nonce_map: NonceMap,
    single_flight: SingleFlight<AuthResult<Option<VerboseTokenResponse>>>,
    device_id: String,
}

impl AuthClient {
    /// Starts a builder for the given client identity.
    pub fn builder(client_id: impl Into<String>) -> AuthClientBuilder {
        AuthClientBuilder::new(client_id)
    }

    /// Returns the client identity this instance serves.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the per-install device identifier.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns `true` when an unconsumed nonce exists for `address`.
    pub fn is_nonce_fetched(&self, address: &str) -> bool {
        self.nonce_map.is_fetched(address)
    }

    /// Returns the nonce for `address` to sign, fetching one from the token
    /// service only when no unconsumed nonce exists for that address.
    ///
    /// # Errors
    ///
    /// Network failures propagate unchanged.
    pub async fn get_nonce_to_sign(&self, address: &str) -> AuthResult<String> {
        if let Some(nonce) = self.nonce_map.peek(address) {
            return Ok(nonce);
        }

        let resp = self
            .endpoint
            .get_nonce_to_sign(&NonceRequest {
                address: address.to_owned(),
                client_id: self.client_id.clone(),
                device_id: self.device_id.clone(),
            })
            .await?;

        self.nonce_map.record(address, resp.nonce.clone());
        Ok(resp.nonce)
    }

    /// Performs the nonce-signature login handshake: exchanges the signed
    /// nonce for tokens, verifies the access token, and caches the session
    /// under `(client_id, "default", "")`.
    ///
    /// The nonce for `address` is consumed whether or not the attempt
    /// succeeds, so every attempt signs a fresh challenge.
    ///
    /// # Errors
    ///
    /// Exchange and verification failures propagate after the nonce is
    /// cleared.
    pub async fn login_with_signed_nonce(
        &self,
        address: &str,
        signature: &str,
    ) -> AuthResult<()> {
        let result = self.perform_login(address, signature).await;
        self.nonce_map.consume(address);
        result
    }

    async fn perform_login(&self, address: &str, signature: &str) -> AuthResult<()> {
        let auth = self
            .endpoint
            .login_with_signed_nonce(&LoginRequest {
                address: address.to_owned(),
                signature: signature.to_owned(),
                client_id: self.client_id.clone(),
                device_id: self.device_id.clone(),
            })
            .await?;

        let decoded = self.verifier.verify(&auth.access_token, None).await?;

        let granted_scopes =
            if auth.scopes.is_empty() { None } else { Some(auth.scopes.join(" ")) };
        self.cache
            .set(CacheEntry {
                client_id: self.client_id.clone(),
                audience: DEFAULT_AUDIENCE.to_owned(),
                scope: String::new(),
                access_token: auth.access_token,
                refresh_token: Some(auth.refresh_token),
                id_token: None,
                expires_in: auth.expires_in,
                granted_scopes,
                decoded_token: Some(decoded),
            })
            .await;
        Ok(())
    }

    /// Obtains an access token without user interaction.
    ///
    /// Returns `Ok(None)` when retrieval fails in a way that is neither
    /// "not logged in" nor a lock timeout — those two propagate as errors
    /// so callers can distinguish them from transient failures.
    pub async fn get_token_silently(
        &self,
        options: GetTokenOptions,
    ) -> AuthResult<Option<String>> {
        let verbose = self.get_token_silently_verbose(options).await?;
        Ok(verbose.map(|v| v.access_token))
    }

    /// [`get_token_silently`](Self::get_token_silently) returning the full
    /// response shape (minus any refresh token) instead of the bare token.
    pub async fn get_token_silently_verbose(
        &self,
        options: GetTokenOptions,
    ) -> AuthResult<Option<VerboseTokenResponse>> {
        let audience = options.audience.as_deref().unwrap_or(DEFAULT_AUDIENCE);
        let key = CacheKey::new(&self.client_id, audience, "");
        let ignore_cache = options.ignore_cache;

        self.single_flight
            .run(&key.canonical(), || self.get_token_internal(&key, ignore_cache))
            .await
    }

    /// The lock-guarded retrieval protocol, run once per single-flight key.
    async fn get_token_internal(
        &self,
        key: &CacheKey,
        ignore_cache: bool,
    ) -> AuthResult<Option<VerboseTokenResponse>> {
        // Check the cache before touching the lock, to avoid acquisition
        // latency when the cache is populated.
        if !ignore_cache {
            if let Some(hit) = self.entry_from_cache(key).await {
                debug!(key = %key, "silent retrieval served from cache");
                return Ok(Some(hit));
            }
        }

        let acquired = retry(
            || self.lock.acquire(GET_TOKEN_SILENTLY_LOCK, LOCK_ACQUIRE_TIMEOUT_MS),
            LOCK_ACQUIRE_ATTEMPTS,
        )
        .await;
        if !acquired {
            // No renewal occurred; the caller must know.
            return Err(AuthError::timeout());
        }

        let result = self.renew_under_lock(key, ignore_cache).await;
        // Release is unconditional cleanup, not conditioned on outcome.
        self.lock.release(GET_TOKEN_SILENTLY_LOCK).await;

        match result {
            Ok(verbose) => Ok(Some(verbose)),
            Err(err) if err.escapes_silent_retrieval() => Err(err),
            Err(err) => {
                warn!(error = %err, key = %key, "silent token retrieval failed");
                Ok(None)
            }
        }
    }

    async fn renew_under_lock(
        &self,
        key: &CacheKey,
        ignore_cache: bool,
    ) -> AuthResult<VerboseTokenResponse> {
        // A concurrent holder may have refreshed the token while this
        // caller was waiting on the lock.
        if !ignore_cache {
            if let Some(hit) = self.entry_from_cache(key).await {
                debug!(key = %key, "cache populated while waiting for lock");
                return Ok(hit);
            }
        }

        let cached = self.cache.get(key, 0).await;
        let Some(refresh_token) = cached.as_ref().and_then(|e| e.refresh_token.clone()) else {
            // Terminal: nothing to renew with. Clear local state without
            // notifying the server and tell the caller to log in again.
            self.cache.clear().await;
            return Err(AuthError::not_logged_in("no refresh token available"));
        };

        let resp = self
            .endpoint
            .refresh_token(&RefreshRequest { refresh_token, device_id: self.device_id.clone() })
            .await?;
        let decoded = self.verifier.verify(&resp.access_token, None).await?;

        // Whole-entry replace; values the response omits are carried
        // forward from the prior entry so one renewal cannot end the
        // session.
        let prior = cached.unwrap_or(CacheEntry {
            client_id: self.client_id.clone(),
            audience: key.audience.clone(),
            scope: key.scope.clone(),
            access_token: String::new(),
            refresh_token: None,
            id_token: None,
            expires_in: 0,
            granted_scopes: None,
            decoded_token: None,
        });
        let entry = CacheEntry {
            client_id: self.client_id.clone(),
            audience: key.audience.clone(),
            scope: key.scope.clone(),
            access_token: resp.access_token,
            refresh_token: resp.refresh_token.or(prior.refresh_token),
            id_token: resp.id_token.or(prior.id_token),
            expires_in: resp.expires_in,
            granted_scopes: prior.granted_scopes,
            decoded_token: Some(decoded),
        };
        self.cache.set(entry.clone()).await;

        Ok(VerboseTokenResponse {
            id_token: entry.id_token,
            access_token: entry.access_token,
            scope: entry.granted_scopes,
            expires_in: entry.expires_in,
        })
    }

    async fn entry_from_cache(&self, key: &CacheKey) -> Option<VerboseTokenResponse> {
        let entry = self.cache.get(key, TOKEN_EXPIRY_LEEWAY_SECS).await?;
        Some(VerboseTokenResponse {
            id_token: entry.id_token,
            access_token: entry.access_token,
            scope: entry.granted_scopes,
            expires_in: entry.expires_in,
        })
    }

    /// Returns `true` when a session can be established silently. Never
    /// errors; only a raised failure counts as "no session".
    pub async fn check_session(&self, options: GetTokenOptions) -> bool {
        self.get_token_silently(options).await.is_ok()
    }

    /// Returns the account projection from the cached, verified token, or
    /// `None` when no valid entry exists.
    pub async fn get_account(&self, audience: Option<&str>) -> Option<Account> {
        let key =
            CacheKey::new(&self.client_id, audience.unwrap_or(DEFAULT_AUDIENCE), "");
        let entry = self.cache.get(&key, 0).await?;
        entry.decoded_token.map(|d| d.account)
    }

    /// Returns the verified claims from the cached token, or `None` when no
    /// valid entry exists.
    pub async fn get_id_token_claims(&self, audience: Option<&str>) -> Option<IdTokenClaims> {
        let key =
            CacheKey::new(&self.client_id, audience.unwrap_or(DEFAULT_AUDIENCE), "");
        let entry = self.cache.get(&key, 0).await?;
        entry.decoded_token.map(|d| d.claims)
    }

    /// Returns whether the current session holds `role`. Role absence and
    /// role-check failure are indistinguishable: both are `false`, and
    /// nothing is raised.
    pub async fn has_role(&self, role: &str) -> bool {
        let token = match self.get_token_silently(GetTokenOptions::default()).await {
            Ok(Some(token)) => token,
            Ok(None) => return false,
            Err(err) => {
                debug!(error = %err, "has_role: no token available");
                return false;
            }
        };

        match self.endpoint.has_role(&self.client_id, &encode_role(role), &token).await {
            Ok(resp) => resp.has_role,
            Err(err) => {
                debug!(error = %err, "role check failed");
                false
            }
        }
    }

    /// Ends the session: clears the local cache unconditionally, then — when
    /// a token was available and `local_only` is not set — notifies the
    /// server. The remote call is best-effort; its failure never surfaces,
    /// and local state is authoritative either way.
    pub async fn logout(&self, options: LogoutOptions) {
        // Snapshot a token before clearing; failures just mean there is
        // nothing to revoke server-side.
        let token = self
            .get_token_silently(GetTokenOptions::default())
            .await
            .unwrap_or_default();

        self.cache.clear().await;

        if options.local_only {
            return;
        }
        let Some(access_token) = token else { return };

        let req = LogoutRequest {
            client_id: Some(self.client_id.clone()),
            device_id: self.device_id.clone(),
            access_token,
        };
        if let Err(err) = self.endpoint.logout(&req).await {
            warn!(error = %err, "remote logout failed; local state already cleared");
        }
    }

    /// Builds the server-side logout URL for `access_token`.
    pub fn build_logout_url(&self, access_token: &str, include_client_id: bool) -> String {
        let mut params: Vec<(&str, String)> = Vec::with_capacity(4);
        if include_client_id {
            params.push(("client_id", self.client_id.clone()));
        }
        params.push(("device_id", self.device_id.clone()));
        params.push(("access_token", access_token.to_owned()));
        params.push(("walletauthClient", ClientDescriptor::default().encoded()));

        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}/logout?{query}", self.domain_url)
    }

    /// Recomputes the login step from the externally supplied wallet
    /// connection state, nonce membership, and cache presence. Nothing is
    /// persisted; this derives the answer fresh on every call.
    pub async fn login_step(&self, connected_address: Option<&str>) -> LoginStep {
        let Some(address) = connected_address else {
            return LoginStep::Uninitialized;
        };

        let key = CacheKey::new(&self.client_id, DEFAULT_AUDIENCE, "");
        if self.cache.get(&key, 0).await.is_some() {
            return LoginStep::LoggedIn;
        }
        if self.nonce_map.is_fetched(address) {
            return LoginStep::ReadyToLogin;
        }
        LoginStep::Connected
    }
}

/// Minimal query-string escaping for the characters base64 output and
/// tokens can contain.
fn percent_encode(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D")
        .replace('&', "%26")
}
