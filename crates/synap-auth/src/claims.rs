//! JWT claims issued by the HTTP API at login.

use serde::{Deserialize, Serialize};
use synap_core::UserId;

/// Claims carried by an access token.
///
/// The login route signs `{ id }`; standard `sub` is accepted as a fallback
/// so tokens from other issuers still resolve to a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id as written by the login route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Standard subject claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiration time (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued at (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl TokenClaims {
    /// The user this token identifies, if any.
    pub fn user_id(&self) -> Option<UserId> {
        self.id
            .as_deref()
            .or(self.sub.as_deref())
            .filter(|s| !s.is_empty())
            .map(UserId::from)
    }
}
