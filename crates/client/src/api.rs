//! Token endpoint family: wire types and HTTP transport.
//!
//! The backend is consumed through the [`TokenEndpoint`] trait so tests can
//! substitute a mock; [`HttpTokenEndpoint`] is the production
//! implementation. All operations are GETs with query parameters, a fixed
//! request timeout of [`REQUEST_TIMEOUT_MS`], and a client-identification
//! header carrying a base64-encoded descriptor of this client build.
//!
//! | Operation | Path |
//! |-----------|------|
//! | nonce issuance | `/getNonceToSign` |
//! | login exchange | `/loginWithSignedNonce` |
//! | refresh | `/refresh_token` |
//! | role check | `/p/{client_id}/has_role` |
//! | logout | `/logout` (best-effort) |

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Fixed timeout applied to every token endpoint request.
pub const REQUEST_TIMEOUT_MS: u64 = 1_000;

/// Name of the client-identification header sent on every request.
pub const CLIENT_HEADER: &str = "X-WalletAuth-Client";

/// Descriptor identifying this client build, sent base64-encoded in
/// [`CLIENT_HEADER`] and in logout URLs.
#[derive(Debug, Clone, Serialize)]
pub struct ClientDescriptor {
    /// Client library name.
    pub name: &'static str,
    /// Client library version.
    pub version: &'static str,
}

impl Default for ClientDescriptor {
    fn default() -> Self {
        Self { name: "walletauth-rs", version: env!("CARGO_PKG_VERSION") }
    }
}

impl ClientDescriptor {
    /// Returns the base64 encoding of the descriptor JSON, as sent on the
    /// wire. Serialization of this struct cannot fail.
    pub fn encoded(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        STANDARD.encode(json)
    }
}

/// Normalizes a configured domain: a bare host gains `https://`.
pub fn normalize_domain(domain: &str) -> String {
    if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_owned()
    } else {
        format!("https://{domain}")
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Wire types
// ───────────────────────────────────────────────────────────────────────────

/// Parameters for nonce issuance.
#[derive(Debug, Clone, Serialize)]
pub struct NonceRequest {
    /// Wallet address requesting a challenge.
    pub address: String,
    /// Client identifier.
    pub client_id: String,
    /// Per-install device identifier.
    pub device_id: String,
}

/// Response from `/getNonceToSign`.
#[derive(Debug, Clone, Deserialize)]
pub struct NonceResponse {
    /// One-time challenge string for the wallet to sign.
    pub nonce: String,
}

/// Parameters for the nonce-signature login exchange.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Wallet address that signed the nonce.
    pub address: String,
    /// Signature over the issued nonce.
    pub signature: String,
    /// Client identifier.
    pub client_id: String,
    /// Per-install device identifier.
    pub device_id: String,
}

/// Response from `/loginWithSignedNonce`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Issued access token.
    pub access_token: String,
    /// Issued refresh token.
    pub refresh_token: String,
    /// Client the tokens were issued to.
    pub client_id: String,
    /// Scopes granted at issuance.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Parameters for the refresh-token exchange.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    /// Refresh token from the cached session.
    pub refresh_token: String,
    /// Per-install device identifier.
    pub device_id: String,
}

/// Response from `/refresh_token`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    /// Fresh access token.
    pub access_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Replacement identity token, when rotated.
    #[serde(default)]
    pub id_token: Option<String>,
    /// Replacement refresh token, when rotated.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Response from the role-check endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct HasRoleResponse {
    /// Whether the token's subject holds the role.
    #[serde(rename = "hasRole")]
    pub has_role: bool,
}

/// Parameters for the best-effort server-side logout.
#[derive(Debug, Clone, Serialize)]
pub struct LogoutRequest {
    /// Client identifier, when it should be sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Per-install device identifier.
    pub device_id: String,
    /// Access token of the session being ended.
    pub access_token: String,
}

// ───────────────────────────────────────────────────────────────────────────
// Endpoint trait + HTTP implementation
// ───────────────────────────────────────────────────────────────────────────

/// The token-issuing backend, as seen by the auth client.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Issues a one-time nonce for `address` to sign.
    async fn get_nonce_to_sign(&self, req: &NonceRequest) -> AuthResult<NonceResponse>;

    /// Exchanges a signed nonce for tokens.
    async fn login_with_signed_nonce(&self, req: &LoginRequest) -> AuthResult<LoginResponse>;

    /// Exchanges a refresh token for a fresh access token.
    async fn refresh_token(&self, req: &RefreshRequest) -> AuthResult<RefreshResponse>;

    /// Checks whether the bearer of `access_token` holds `role_b64`
    /// (base64-encoded role name).
    async fn has_role(
        &self,
        client_id: &str,
        role_b64: &str,
        access_token: &str,
    ) -> AuthResult<HasRoleResponse>;

    /// Revokes the session server-side. Best-effort.
    async fn logout(&self, req: &LogoutRequest) -> AuthResult<()>;
}

/// Server-reported OAuth error body.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// [`TokenEndpoint`] over HTTP with reqwest.
pub struct HttpTokenEndpoint {
    http: reqwest::Client,
    base_url: String,
    descriptor: String,
}

impl HttpTokenEndpoint {
    /// Creates a transport against `domain` (scheme-normalized).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Generic`] when the underlying HTTP client
    /// cannot be constructed.
    pub fn new(domain: &str) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .build()
            .map_err(|e| AuthError::generic("client_build_error", e.to_string()))?;
        Ok(Self {
            http,
            base_url: normalize_domain(domain),
            descriptor: ClientDescriptor::default().encoded(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> AuthResult<T> {
        let mut req = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .header(CLIENT_HEADER, &self.descriptor)
            .header("Content-Type", "application/json");
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if let Ok(oauth) = serde_json::from_str::<OAuthErrorBody>(&body) {
                return Err(AuthError::oauth(oauth.error, oauth.error_description));
            }
            return Err(AuthError::generic(
                "request_error",
                format!("{path} failed with status {status}"),
            ));
        }

        resp.json::<T>()
            .await
            .map_err(|e| AuthError::generic("invalid_response", e.to_string()))
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn get_nonce_to_sign(&self, req: &NonceRequest) -> AuthResult<NonceResponse> {
        self.get_json(
            "/getNonceToSign",
            &[
                ("address", req.address.as_str()),
                ("client_id", req.client_id.as_str()),
                ("device_id", req.device_id.as_str()),
            ],
            None,
        )
        .await
    }

    async fn login_with_signed_nonce(&self, req: &LoginRequest) -> AuthResult<LoginResponse> {
        self.get_json(
            "/loginWithSignedNonce",
            &[
                ("address", req.address.as_str()),
                ("signature", req.signature.as_str()),
                ("client_id", req.client_id.as_str()),
                ("device_id", req.device_id.as_str()),
            ],
            None,
        )
        .await
    }

    async fn refresh_token(&self, req: &RefreshRequest) -> AuthResult<RefreshResponse> {
        self.get_json(
            "/refresh_token",
            &[
                ("refresh_token", req.refresh_token.as_str()),
                ("device_id", req.device_id.as_str()),
            ],
            None,
        )
        .await
    }

    async fn has_role(
        &self,
        client_id: &str,
        role_b64: &str,
        access_token: &str,
    ) -> AuthResult<HasRoleResponse> {
        self.get_json(
            &format!("/p/{client_id}/has_role"),
            &[("role", role_b64), ("encoded", "true")],
            Some(access_token),
        )
        .await
    }

    async fn logout(&self, req: &LogoutRequest) -> AuthResult<()> {
        let mut query: Vec<(&str, &str)> = Vec::with_capacity(3);
        if let Some(client_id) = req.client_id.as_deref() {
            query.push(("client_id", client_id));
        }
        query.push(("device_id", req.device_id.as_str()));
        query.push(("access_token", req.access_token.as_str()));

        let resp = self
            .http
            .get(format!("{}/logout", self.base_url))
            .query(&query)
            .header(CLIENT_HEADER, &self.descriptor)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::generic(
                "request_error",
                format!("/logout failed with status {}", resp.status()),
            ));
        }
        Ok(())
    }
}

/// Base64-encodes a role name for the role-check endpoint.
pub fn encode_role(role: &str) -> String {
    STANDARD.encode(role)
}
