//! Token verification collaborator.
//!
//! Verification of the issued token is an external capability: "verify an
//! opaque token string against issuer/audience/nonce and return decoded
//! claims or fail". The [`TokenVerifier`] trait is that seam; the default
//! [`ClaimsVerifier`] decodes the JWT payload and validates the registered
//! claims, leaving cryptographic signature verification to deployments that
//! plug in a full verifier.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use walletauth_cache::{Account, DecodedToken, IdTokenClaims, NowFn};

use crate::error::{AuthError, AuthResult};

/// Clock-skew leeway applied to the `exp` claim, in seconds.
const EXP_LEEWAY_SECS: i64 = 60;

/// Verifies an opaque token and returns its decoded claims plus the
/// embedded account projection.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verifies `token` against the expected issuer/audience and, when
    /// given, the login `nonce`.
    async fn verify(&self, token: &str, nonce: Option<&str>) -> AuthResult<DecodedToken>;
}

/// Claims-only verifier: decodes the payload and validates `iss`, `aud`,
/// `exp`, and `nonce`.
pub struct ClaimsVerifier {
    issuer: String,
    audience: String,
    now: NowFn,
}

impl ClaimsVerifier {
    /// Creates a verifier expecting the given issuer and audience.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>, now: NowFn) -> Self {
        Self { issuer: issuer.into(), audience: audience.into(), now }
    }
}

/// Decodes the claims segment of a JWT without verifying the signature.
///
/// # Errors
///
/// Returns [`AuthError::Generic`] when the token does not have exactly
/// three segments, the payload is not valid base64url, or the claims do
/// not deserialize.
pub fn decode_token_claims(token: &str) -> AuthResult<IdTokenClaims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(AuthError::generic(
            "invalid_token_format",
            "token must have exactly three segments",
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::generic("invalid_token_format", format!("bad payload: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::generic("invalid_token_format", format!("bad claims: {e}")))
}

/// Projects the [`Account`] embedded in verified claims. The subject is
/// the wallet address that proved ownership.
fn account_from_claims(claims: &IdTokenClaims) -> Account {
    let updated_at =
        claims.extra.get("updated_at").and_then(|v| v.as_str()).map(str::to_owned);
    Account { address: claims.sub.clone(), updated_at }
}

#[async_trait]
impl TokenVerifier for ClaimsVerifier {
    async fn verify(&self, token: &str, nonce: Option<&str>) -> AuthResult<DecodedToken> {
        let claims = decode_token_claims(token)?;

        if claims.iss != self.issuer {
            return Err(AuthError::generic(
                "invalid_issuer",
                format!("expected issuer {}, got {}", self.issuer, claims.iss),
            ));
        }
        if claims.aud != self.audience {
            return Err(AuthError::generic(
                "invalid_audience",
                format!("expected audience {}, got {}", self.audience, claims.aud),
            ));
        }
        let now = (self.now)();
        if claims.exp + EXP_LEEWAY_SECS <= now {
            return Err(AuthError::generic("token_expired", "token is expired"));
        }
        if let Some(expected_nonce) = nonce {
            if claims.nonce.as_deref() != Some(expected_nonce) {
                return Err(AuthError::generic("invalid_nonce", "nonce mismatch"));
            }
        }

        let account = account_from_claims(&claims);
        Ok(DecodedToken { raw: token.to_owned(), claims, account })
    }
}
