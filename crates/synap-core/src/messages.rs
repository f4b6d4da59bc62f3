//! Wire messages exchanged with realtime clients.
//!
//! Inbound frames have the shape `{ type, payload?, token? }` and are parsed
//! into the closed [`ClientMessage`] union. Outbound messages have the shape
//! `{ type, payload?, timestamp? }`, built from [`ServerMessage`] wrapped in
//! an [`OutboundMessage`] envelope.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::ids::{Topic, UserId};

/// Raw inbound frame, before the `type` tag is interpreted.
#[derive(Clone, Debug, Deserialize)]
pub struct InboundFrame {
    /// Message type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: Option<Value>,
    /// Credential token (authenticate frames).
    #[serde(default)]
    pub token: Option<String>,
}

/// A request a client may send over the realtime connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Bind the connection to the user the token identifies.
    Authenticate {
        /// Credential token; `None` when the frame carried none.
        token: Option<String>,
    },
    /// Follow a topic, leaving any previously followed one.
    Subscribe {
        /// Topic to follow.
        topic: Topic,
    },
    /// Stop following a topic.
    Unsubscribe {
        /// Topic to leave.
        topic: Topic,
    },
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let frame: InboundFrame = serde_json::from_str(text)
            .map_err(|e| ProtocolError::InvalidFormat(e.to_string()))?;
        Self::from_frame(frame)
    }

    /// Interpret a raw frame by its `type` tag.
    ///
    /// `AUTH` is accepted as an alias of `AUTHENTICATE`. The token may sit at
    /// the top level or inside the payload; the topic may be named `topic`
    /// or `eventId`.
    pub fn from_frame(frame: InboundFrame) -> Result<Self, ProtocolError> {
        match frame.kind.as_str() {
            "AUTHENTICATE" | "AUTH" => {
                let token = frame
                    .token
                    .or_else(|| payload_str(frame.payload.as_ref(), &["token"]))
                    .filter(|t| !t.is_empty());
                Ok(Self::Authenticate { token })
            }
            "SUBSCRIBE" => Ok(Self::Subscribe {
                topic: topic_from(frame.payload.as_ref(), "SUBSCRIBE")?,
            }),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe {
                topic: topic_from(frame.payload.as_ref(), "UNSUBSCRIBE")?,
            }),
            other => Err(ProtocolError::UnknownType(other.to_owned())),
        }
    }

    /// Canonical type tag, for logging and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Subscribe { .. } => "SUBSCRIBE",
            Self::Unsubscribe { .. } => "UNSUBSCRIBE",
        }
    }
}

fn payload_str(payload: Option<&Value>, keys: &[&str]) -> Option<String> {
    let payload = payload?;
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(str::to_owned)
}

fn topic_from(payload: Option<&Value>, kind: &'static str) -> Result<Topic, ProtocolError> {
    payload_str(payload, &["topic", "eventId"])
        .filter(|t| !t.is_empty())
        .map(Topic::from_string)
        .ok_or(ProtocolError::MissingTopic(kind))
}

/// Everything the server sends to clients.
///
/// Serialized adjacently tagged: `{ "type": "AUTH_SUCCESS", "payload": {...} }`.
/// Domain broadcast payloads are opaque JSON owned by the emitting
/// controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Authentication succeeded.
    AuthSuccess {
        /// The identity the connection is now bound to.
        #[serde(rename = "userIdentity")]
        user_identity: UserId,
    },
    /// Authentication failed; the connection is closed right after.
    AuthError {
        /// Failure description.
        message: String,
    },
    /// Topic subscription acknowledged.
    SubscribeSuccess {
        /// The topic now followed.
        topic: Topic,
    },
    /// Generic failure notice.
    Error {
        /// Failure description.
        message: String,
    },
    /// An event record changed.
    EventUpdated(Value),
    /// A team record changed.
    TeamUpdated(Value),
    /// A score was saved.
    ScoreUpdated(Value),
    /// An announcement was published.
    AnnouncementCreated(Value),
    /// A personal notification was created.
    NotificationCreated(Value),
}

impl ServerMessage {
    /// Build an `ERROR` notice.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Build an `AUTH_ERROR` notice.
    pub fn auth_error(message: impl Into<String>) -> Self {
        Self::AuthError {
            message: message.into(),
        }
    }

    /// Wire type tag.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::AuthSuccess { .. } => "AUTH_SUCCESS",
            Self::AuthError { .. } => "AUTH_ERROR",
            Self::SubscribeSuccess { .. } => "SUBSCRIBE_SUCCESS",
            Self::Error { .. } => "ERROR",
            Self::EventUpdated(_) => "EVENT_UPDATED",
            Self::TeamUpdated(_) => "TEAM_UPDATED",
            Self::ScoreUpdated(_) => "SCORE_UPDATED",
            Self::AnnouncementCreated(_) => "ANNOUNCEMENT_CREATED",
            Self::NotificationCreated(_) => "NOTIFICATION_CREATED",
        }
    }
}

/// Envelope for a [`ServerMessage`] with an optional RFC 3339 timestamp.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutboundMessage {
    /// The tagged message body.
    #[serde(flatten)]
    pub body: ServerMessage,
    /// When the message was produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl OutboundMessage {
    /// Wrap a message without a timestamp.
    pub fn new(body: ServerMessage) -> Self {
        Self {
            body,
            timestamp: None,
        }
    }

    /// Wrap a message stamped with the current time.
    pub fn stamped(body: ServerMessage) -> Self {
        Self {
            body,
            timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }

    /// Wire type tag of the body.
    pub fn message_type(&self) -> &'static str {
        self.body.message_type()
    }

    /// Serialize to the JSON text sent over the transport.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<ServerMessage> for OutboundMessage {
    fn from(body: ServerMessage) -> Self {
        Self::new(body)
    }
}
