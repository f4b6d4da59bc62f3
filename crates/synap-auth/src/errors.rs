//! Authentication error types.

use thiserror::Error;

/// Why a token was rejected.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token was presented.
    #[error("missing token")]
    MissingToken,
    /// The token has expired.
    #[error("token expired")]
    TokenExpired,
    /// The signature does not match the configured secret.
    #[error("invalid token signature")]
    InvalidSignature,
    /// The token is malformed or its claims failed validation.
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// The token verified but names no user.
    #[error("token carries no user identity")]
    MissingIdentity,
}

/// Result type for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
