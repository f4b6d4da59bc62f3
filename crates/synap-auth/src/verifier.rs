//! Token verifiers.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use synap_core::UserId;
use tracing::debug;

use crate::claims::TokenClaims;
use crate::errors::{AuthError, Result};

/// Resolves a credential token to the user it was issued for.
///
/// Verification may involve an external call, so it is async. Callers must
/// not hold locks across it.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token` and return the user identity it carries.
    async fn verify(&self, token: &str) -> Result<UserId>;
}

/// HS256 verifier using the API's shared signing secret.
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithm", &"HS256")
            .field("issuer", &self.validation.iss)
            .finish_non_exhaustive()
    }
}

impl JwtVerifier {
    /// Create a verifier for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims.clear();
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Require tokens to carry a matching `iss` claim.
    #[must_use]
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    fn decode_claims(&self, token: &str) -> Result<TokenClaims> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = ?e, "JWT validation failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                    _ => AuthError::InvalidToken(e.to_string()),
                }
            })
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<UserId> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        // Browsers sometimes forward the HTTP header value verbatim.
        let token = token.strip_prefix("Bearer ").unwrap_or(token);
        self.decode_claims(token)?
            .user_id()
            .ok_or(AuthError::MissingIdentity)
    }
}
