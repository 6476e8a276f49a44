//! End-to-end tests for the login handshake and silent renewal protocol,
//! driven through a mock token endpoint with per-operation call counters.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use walletauth_client::{
    AuthClient, AuthError, AuthResult, GetTokenOptions, HasRoleResponse, LoginRequest,
    LoginResponse, LoginStep, LogoutOptions, LogoutRequest, MemoryStore, NonceRequest,
    NonceResponse, RefreshRequest, RefreshResponse, SessionLock, TokenEndpoint,
};

/// Fixed test epoch.
const START: i64 = 1_700_000_000;

/// Issuer derived from the fixture domain.
const ISSUER: &str = "https://auth.test/";

const ADDRESS: &str = "0xABC";

// ---------------------------------------------------------------------------
// Mock endpoint
// ---------------------------------------------------------------------------

struct MockEndpoint {
    clock: Arc<AtomicI64>,
    nonce_calls: AtomicUsize,
    login_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    role_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    fail_login: AtomicBool,
    fail_refresh: AtomicBool,
    fail_role: AtomicBool,
    role_answer: AtomicBool,
    refresh_delay_ms: u64,
}

impl MockEndpoint {
    fn new(clock: Arc<AtomicI64>, refresh_delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            clock,
            nonce_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            role_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            fail_login: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
            fail_role: AtomicBool::new(false),
            role_answer: AtomicBool::new(true),
            refresh_delay_ms,
        })
    }

    /// Mints an unsigned token that passes the default claims verifier.
    fn mint_token(&self, sub: &str, serial: usize) -> String {
        let claims = serde_json::json!({
            "iss": ISSUER,
            "aud": "default",
            "sub": sub,
            "exp": self.clock.load(Ordering::SeqCst) + 3600,
            "iat": self.clock.load(Ordering::SeqCst),
            "serial": serial,
        });
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.sig")
    }
}

#[async_trait]
impl TokenEndpoint for MockEndpoint {
    async fn get_nonce_to_sign(&self, _req: &NonceRequest) -> AuthResult<NonceResponse> {
        let n = self.nonce_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(NonceResponse { nonce: format!("N{n}") })
    }

    async fn login_with_signed_nonce(&self, req: &LoginRequest) -> AuthResult<LoginResponse> {
        let n = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_login.load(Ordering::SeqCst) {
            return Err(AuthError::oauth("invalid_signature", None));
        }
        Ok(LoginResponse {
            access_token: self.mint_token(&req.address.to_ascii_lowercase(), n),
            refresh_token: format!("RT{n}"),
            client_id: req.client_id.clone(),
            scopes: vec!["read:all".into()],
            expires_in: 3600,
        })
    }

    async fn refresh_token(&self, _req: &RefreshRequest) -> AuthResult<RefreshResponse> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.refresh_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.refresh_delay_ms)).await;
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::generic("server_error", "refresh unavailable"));
        }
        Ok(RefreshResponse {
            access_token: self.mint_token("0xabc", 1000 + n),
            expires_in: 3600,
            id_token: None,
            refresh_token: None,
        })
    }

    async fn has_role(
        &self,
        _client_id: &str,
        _role_b64: &str,
        _access_token: &str,
    ) -> AuthResult<HasRoleResponse> {
        self.role_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_role.load(Ordering::SeqCst) {
            return Err(AuthError::generic("server_error", "role check unavailable"));
        }
        Ok(HasRoleResponse { has_role: self.role_answer.load(Ordering::SeqCst) })
    }

    async fn logout(&self, _req: &LogoutRequest) -> AuthResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A lock that can never be acquired, for timeout-path tests.
struct NeverLock;

#[async_trait]
impl SessionLock for NeverLock {
    async fn acquire(&self, _name: &str, _timeout_ms: u64) -> bool {
        false
    }

    async fn release(&self, _name: &str) {}
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Fixture {
    client: Arc<AuthClient>,
    endpoint: Arc<MockEndpoint>,
    clock: Arc<AtomicI64>,
}

impl Fixture {
    async fn new() -> Self {
        Self::with_refresh_delay(0).await
    }

    async fn with_refresh_delay(delay_ms: u64) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let clock = Arc::new(AtomicI64::new(START));
        let endpoint = MockEndpoint::new(Arc::clone(&clock), delay_ms);

        let now = Arc::clone(&clock);
        let client = AuthClient::builder("test-client")
            .domain("https://auth.test")
            .store(Arc::new(MemoryStore::new()))
            .endpoint(Arc::clone(&endpoint) as Arc<dyn TokenEndpoint>)
            .clock(Arc::new(move || now.load(Ordering::SeqCst)))
            .build()
            .await
            .unwrap();

        Self { client: Arc::new(client), endpoint, clock }
    }

    async fn login(&self) {
        self.client.get_nonce_to_sign(ADDRESS).await.unwrap();
        self.client.login_with_signed_nonce(ADDRESS, "sig").await.unwrap();
    }

    /// Advances into the proactive-renewal window: the cached token is
    /// still literally valid but within the 60 s leeway.
    fn enter_renewal_window(&self) {
        self.clock.store(START + 3600 - 30, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Nonce lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nonce_is_idempotent_until_consumed() {
    let fx = Fixture::new().await;

    let n1 = fx.client.get_nonce_to_sign(ADDRESS).await.unwrap();
    let again = fx.client.get_nonce_to_sign(ADDRESS).await.unwrap();
    assert_eq!(n1, again);
    assert_eq!(fx.endpoint.nonce_calls.load(Ordering::SeqCst), 1);

    // Successful login consumes the nonce.
    fx.client.login_with_signed_nonce(ADDRESS, "sig").await.unwrap();
    assert!(!fx.client.is_nonce_fetched(ADDRESS));

    let n2 = fx.client.get_nonce_to_sign(ADDRESS).await.unwrap();
    assert_ne!(n1, n2);
    assert_eq!(fx.endpoint.nonce_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_login_still_consumes_the_nonce() {
    let fx = Fixture::new().await;
    fx.client.get_nonce_to_sign(ADDRESS).await.unwrap();

    fx.endpoint.fail_login.store(true, Ordering::SeqCst);
    let err = fx.client.login_with_signed_nonce(ADDRESS, "sig").await.unwrap_err();
    assert!(matches!(err, AuthError::OAuth { .. }));

    // The error propagated, and the nonce is gone regardless.
    assert!(!fx.client.is_nonce_fetched(ADDRESS));

    fx.endpoint.fail_login.store(false, Ordering::SeqCst);
    let n2 = fx.client.get_nonce_to_sign(ADDRESS).await.unwrap();
    assert_eq!(n2, "N2");
}

// ---------------------------------------------------------------------------
// Login handshake and projections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_caches_a_session_and_projects_the_account() {
    let fx = Fixture::new().await;
    fx.login().await;

    let account = fx.client.get_account(None).await.unwrap();
    assert_eq!(account.address, "0xabc");

    let claims = fx.client.get_id_token_claims(None).await.unwrap();
    assert_eq!(claims.iss, ISSUER);
    assert_eq!(claims.sub, "0xabc");

    // Cache fast path: no refresh exchange needed.
    let token = fx.client.get_token_silently(GetTokenOptions::default()).await.unwrap();
    assert!(token.is_some());
    assert_eq!(fx.endpoint.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn verbose_response_carries_scope_and_expiry_without_refresh_token() {
    let fx = Fixture::new().await;
    fx.login().await;

    let verbose = fx
        .client
        .get_token_silently_verbose(GetTokenOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(verbose.scope.as_deref(), Some("read:all"));
    assert_eq!(verbose.expires_in, 3600);
    assert!(!verbose.access_token.is_empty());
}

#[tokio::test]
async fn account_absent_without_a_session() {
    let fx = Fixture::new().await;
    assert!(fx.client.get_account(None).await.is_none());
    assert!(fx.client.get_id_token_claims(None).await.is_none());
}

// ---------------------------------------------------------------------------
// Silent renewal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn proactive_leeway_triggers_renewal_before_literal_expiry() {
    let fx = Fixture::new().await;
    fx.login().await;
    fx.enter_renewal_window();

    let token = fx.client.get_token_silently(GetTokenOptions::default()).await.unwrap();
    assert!(token.is_some());
    assert_eq!(fx.endpoint.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh_exchange() {
    let fx = Fixture::with_refresh_delay(50).await;
    fx.login().await;
    fx.enter_renewal_window();

    let mut set = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let client = Arc::clone(&fx.client);
        set.spawn(async move {
            client.get_token_silently(GetTokenOptions::default()).await.unwrap()
        });
    }

    let mut tokens = Vec::new();
    while let Some(result) = set.join_next().await {
        tokens.push(result.unwrap().unwrap());
    }

    // Exactly one underlying exchange; everyone observed its result.
    assert_eq!(fx.endpoint.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(tokens.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn refresh_carries_the_refresh_token_forward() {
    let fx = Fixture::new().await;
    fx.login().await;

    // Two renewals in a row: the mock never returns a rotated refresh
    // token, so the second renewal must reuse the one from login.
    fx.enter_renewal_window();
    fx.client.get_token_silently(GetTokenOptions::default()).await.unwrap();

    fx.clock.store(START + 2 * 3600 - 90, Ordering::SeqCst);
    let token = fx.client.get_token_silently(GetTokenOptions::default()).await.unwrap();
    assert!(token.is_some());
    assert_eq!(fx.endpoint.refresh_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ignore_cache_forces_an_exchange() {
    let fx = Fixture::new().await;
    fx.login().await;

    let opts = GetTokenOptions { ignore_cache: true, ..Default::default() };
    let token = fx.client.get_token_silently(opts).await.unwrap();
    assert!(token.is_some());
    assert_eq!(fx.endpoint.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn generic_refresh_failure_degrades_to_none() {
    let fx = Fixture::new().await;
    fx.login().await;
    fx.enter_renewal_window();
    fx.endpoint.fail_refresh.store(true, Ordering::SeqCst);

    let token = fx.client.get_token_silently(GetTokenOptions::default()).await.unwrap();
    assert_eq!(token, None);
}

#[tokio::test]
async fn missing_refresh_token_is_a_local_logout_and_not_logged_in() {
    let fx = Fixture::new().await;

    // Fresh client: no session at all.
    let err = fx.client.get_token_silently(GetTokenOptions::default()).await.unwrap_err();
    assert!(matches!(err, AuthError::NotLoggedIn { .. }));

    // No exchange was attempted and the remote logout endpoint was never
    // contacted; the logout was local-only.
    assert_eq!(fx.endpoint.refresh_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.endpoint.logout_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn lock_exhaustion_times_out_without_an_exchange() {
    let clock = Arc::new(AtomicI64::new(START));
    let endpoint = MockEndpoint::new(Arc::clone(&clock), 0);

    let now = Arc::clone(&clock);
    let client = AuthClient::builder("test-client")
        .domain("https://auth.test")
        .store(Arc::new(MemoryStore::new()))
        .endpoint(Arc::clone(&endpoint) as Arc<dyn TokenEndpoint>)
        .lock(Arc::new(NeverLock))
        .clock(Arc::new(move || now.load(Ordering::SeqCst)))
        .build()
        .await
        .unwrap();

    let err = client.get_token_silently(GetTokenOptions::default()).await.unwrap_err();
    assert!(matches!(err, AuthError::Timeout));
    assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// check_session / has_role
// ---------------------------------------------------------------------------

#[tokio::test]
async fn check_session_collapses_failures_to_false() {
    let fx = Fixture::new().await;

    // No session: the NotLoggedIn error becomes false.
    assert!(!fx.client.check_session(GetTokenOptions::default()).await);

    fx.login().await;
    assert!(fx.client.check_session(GetTokenOptions::default()).await);
}

#[tokio::test]
async fn has_role_answers_from_the_endpoint() {
    let fx = Fixture::new().await;
    fx.login().await;

    assert!(fx.client.has_role("admin").await);

    fx.endpoint.role_answer.store(false, Ordering::SeqCst);
    assert!(!fx.client.has_role("admin").await);
}

#[tokio::test]
async fn has_role_collapses_failures_to_false() {
    let fx = Fixture::new().await;

    // No session: false without ever calling the role endpoint.
    assert!(!fx.client.has_role("admin").await);
    assert_eq!(fx.endpoint.role_calls.load(Ordering::SeqCst), 0);

    fx.login().await;
    fx.endpoint.fail_role.store(true, Ordering::SeqCst);
    assert!(!fx.client.has_role("admin").await);
    assert_eq!(fx.endpoint.role_calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Logout
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logout_clears_locally_and_notifies_the_server() {
    let fx = Fixture::new().await;
    fx.login().await;

    fx.client.logout(LogoutOptions::default()).await;

    assert_eq!(fx.endpoint.logout_calls.load(Ordering::SeqCst), 1);
    assert!(fx.client.get_account(None).await.is_none());
}

#[tokio::test]
async fn local_only_logout_never_contacts_the_server() {
    let fx = Fixture::new().await;
    fx.login().await;

    fx.client.logout(LogoutOptions { local_only: true }).await;

    assert_eq!(fx.endpoint.logout_calls.load(Ordering::SeqCst), 0);
    assert!(fx.client.get_account(None).await.is_none());
}

#[tokio::test]
async fn logout_without_a_session_skips_the_server_call() {
    let fx = Fixture::new().await;
    fx.client.logout(LogoutOptions::default()).await;
    assert_eq!(fx.endpoint.logout_calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Login step recomputation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_step_is_rederived_on_every_query() {
    let fx = Fixture::new().await;

    assert_eq!(fx.client.login_step(None).await, LoginStep::Uninitialized);
    assert_eq!(fx.client.login_step(Some(ADDRESS)).await, LoginStep::Connected);

    fx.client.get_nonce_to_sign(ADDRESS).await.unwrap();
    assert_eq!(fx.client.login_step(Some(ADDRESS)).await, LoginStep::ReadyToLogin);

    fx.client.login_with_signed_nonce(ADDRESS, "sig").await.unwrap();
    assert_eq!(fx.client.login_step(Some(ADDRESS)).await, LoginStep::LoggedIn);

    // Expiring the session walks the step back down.
    fx.clock.store(START + 3600, Ordering::SeqCst);
    assert_eq!(fx.client.login_step(Some(ADDRESS)).await, LoginStep::Connected);
}

// ---------------------------------------------------------------------------
// End-to-end scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_client_login_logout_scenario() {
    let fx = Fixture::new().await;

    // Fresh client: nonce issued.
    let n1 = fx.client.get_nonce_to_sign(ADDRESS).await.unwrap();
    assert_eq!(n1, "N1");

    // Login with the signed nonce; the decoded token's user is visible.
    fx.client.login_with_signed_nonce(ADDRESS, "sig").await.unwrap();
    let account = fx.client.get_account(None).await.unwrap();
    assert_eq!(account.address, "0xabc");

    // Local-only logout.
    fx.client.logout(LogoutOptions { local_only: true }).await;

    // A subsequent silent retrieval fails fresh: there is no refresh token
    // and the remote logout endpoint is still untouched.
    let err = fx.client.get_token_silently(GetTokenOptions::default()).await.unwrap_err();
    assert!(matches!(err, AuthError::NotLoggedIn { .. }));
    assert_eq!(fx.endpoint.logout_calls.load(Ordering::SeqCst), 0);
}
