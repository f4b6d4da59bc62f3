//! Dispatch failures and the notice each one produces.

use synap_auth::AuthError;
use synap_core::{ProtocolError, ServerMessage};
use thiserror::Error;

/// Notice text sent with `AUTH_ERROR`.
pub const AUTH_FAILED_NOTICE: &str = "Authentication failed";
/// Notice text for a subscribe attempt before authenticating.
pub const NOT_AUTHENTICATED_NOTICE: &str = "Not authenticated";
/// Notice text for unexpected handler failures.
pub const INTERNAL_ERROR_NOTICE: &str = "Internal server error";

/// Why an inbound frame could not be handled.
///
/// Each variant answers the sender with exactly one notice. Only
/// authentication failures close the connection.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed frame or unrecognised type.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The token could not be verified.
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),
    /// `SUBSCRIBE` before a successful `AUTHENTICATE`.
    #[error("not authenticated")]
    NotAuthenticated,
    /// A handler failed unexpectedly.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// The message sent back to the originating connection.
    pub fn notice(&self) -> ServerMessage {
        match self {
            Self::Protocol(e) => ServerMessage::error(e.notice()),
            Self::Authentication(_) => ServerMessage::auth_error(AUTH_FAILED_NOTICE),
            Self::NotAuthenticated => ServerMessage::error(NOT_AUTHENTICATED_NOTICE),
            Self::Internal(_) => ServerMessage::error(INTERNAL_ERROR_NOTICE),
        }
    }

    /// Whether the connection is closed after the notice is sent.
    pub fn closes_connection(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Protocol(ProtocolError::UnknownType(_)) => "unknown_type",
            Self::Protocol(_) => "invalid_format",
            Self::Authentication(_) => "auth_failed",
            Self::NotAuthenticated => "not_authenticated",
            Self::Internal(_) => "internal",
        }
    }
}
