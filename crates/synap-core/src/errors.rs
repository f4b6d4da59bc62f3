//! Protocol error types.

use thiserror::Error;

/// Notice text sent when a frame cannot be parsed.
pub const INVALID_FORMAT_NOTICE: &str = "Invalid message format";
/// Notice text sent when a frame carries an unrecognised `type`.
pub const UNKNOWN_TYPE_NOTICE: &str = "Unknown message type";

/// Why an inbound frame could not be turned into a [`ClientMessage`].
///
/// [`ClientMessage`]: crate::messages::ClientMessage
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is not JSON, or not an object with a string `type`.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
    /// The frame's `type` is not one the server handles.
    #[error("unknown message type: {0}")]
    UnknownType(String),
    /// A subscribe/unsubscribe frame without a usable topic.
    #[error("{0} frame is missing a topic")]
    MissingTopic(&'static str),
}

impl ProtocolError {
    /// Text of the `ERROR` notice sent back to the client.
    pub fn notice(&self) -> &'static str {
        match self {
            Self::InvalidFormat(_) | Self::MissingTopic(_) => INVALID_FORMAT_NOTICE,
            Self::UnknownType(_) => UNKNOWN_TYPE_NOTICE,
        }
    }
}
