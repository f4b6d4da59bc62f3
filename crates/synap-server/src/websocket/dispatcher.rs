//! Inbound frame dispatch.
//!
//! Parses a frame into a [`ClientMessage`] and routes it to the matching
//! handler. Every failure, including a handler panic, becomes one notice to
//! the originating connection; nothing propagates to the transport.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use metrics::counter;
use synap_auth::{AuthError, TokenVerifier};
use synap_core::{ClientMessage, ConnectionId, OutboundMessage, ProtocolError, ServerMessage, Topic};
use tracing::{debug, error, info, instrument, warn};

use super::broadcast::Broadcaster;
use super::errors::DispatchError;
use super::hub::{Hub, SubscribeOutcome};
use crate::metrics::{WS_AUTH_FAILURES_TOTAL, WS_FRAMES_RECEIVED_TOTAL};

type DispatchResult = Result<Option<ServerMessage>, DispatchError>;

/// Routes inbound frames to handlers.
pub struct Dispatcher {
    hub: Arc<Hub>,
    broadcaster: Arc<Broadcaster>,
    verifier: Arc<dyn TokenVerifier>,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(hub: Arc<Hub>, broadcaster: Arc<Broadcaster>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            hub,
            broadcaster,
            verifier,
        }
    }

    /// Handle one text frame from `conn_id`.
    #[instrument(skip_all, fields(conn_id = %conn_id))]
    pub async fn dispatch(&self, conn_id: &ConnectionId, text: &str) {
        let result = match AssertUnwindSafe(self.handle(conn_id, text)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(panic = %reason, "handler panicked");
                Err(DispatchError::Internal(reason))
            }
        };
        self.respond(conn_id, result);
    }

    /// Handle one binary frame. UTF-8 payloads are treated as text.
    pub async fn dispatch_binary(&self, conn_id: &ConnectionId, data: &[u8]) {
        if let Ok(text) = std::str::from_utf8(data) {
            self.dispatch(conn_id, text).await;
        } else {
            debug!(conn_id = %conn_id, len = data.len(), "non-UTF-8 binary frame");
            self.respond(
                conn_id,
                Err(ProtocolError::InvalidFormat("binary frame is not UTF-8".into()).into()),
            );
        }
    }

    async fn handle(&self, conn_id: &ConnectionId, text: &str) -> DispatchResult {
        let message = ClientMessage::parse(text)?;
        counter!(WS_FRAMES_RECEIVED_TOTAL, "type" => message.kind()).increment(1);
        debug!(message_type = message.kind(), "frame received");

        match message {
            ClientMessage::Authenticate { token } => self.authenticate(conn_id, token).await,
            ClientMessage::Subscribe { topic } => self.subscribe(conn_id, topic),
            ClientMessage::Unsubscribe { topic } => {
                self.unsubscribe(conn_id, &topic);
                Ok(None)
            }
        }
    }

    async fn authenticate(&self, conn_id: &ConnectionId, token: Option<String>) -> DispatchResult {
        let token = token.ok_or(AuthError::MissingToken)?;
        let user = self.verifier.verify(&token).await?;

        // The connection may have closed while the token was being verified.
        if !self.hub.bind_user_if_open(conn_id, user.clone()) {
            debug!(user_id = %user, "connection closed during verification, binding discarded");
            return Ok(None);
        }
        info!(user_id = %user, "connection authenticated");
        Ok(Some(ServerMessage::AuthSuccess { user_identity: user }))
    }

    fn subscribe(&self, conn_id: &ConnectionId, topic: Topic) -> DispatchResult {
        match self.hub.subscribe(conn_id, topic.clone()) {
            SubscribeOutcome::Subscribed { left } => {
                if let Some(left) = left {
                    debug!(%topic, left = %left, "switched topic");
                }
                info!(%topic, "subscribed to topic");
                Ok(Some(ServerMessage::SubscribeSuccess { topic }))
            }
            SubscribeOutcome::NotAuthenticated => Err(DispatchError::NotAuthenticated),
            SubscribeOutcome::Unknown => Ok(None),
        }
    }

    fn unsubscribe(&self, conn_id: &ConnectionId, topic: &Topic) {
        if self.hub.unsubscribe(conn_id, topic) {
            info!(%topic, "unsubscribed from topic");
        } else {
            debug!(%topic, "unsubscribe for topic not followed");
        }
    }

    fn respond(&self, conn_id: &ConnectionId, result: DispatchResult) {
        match result {
            Ok(Some(reply)) => {
                let _ = self
                    .broadcaster
                    .send_to_connection(conn_id, &OutboundMessage::new(reply));
            }
            Ok(None) => {}
            Err(err) => {
                match &err {
                    DispatchError::Internal(_) => error!(error = %err, "dispatch failed"),
                    DispatchError::Authentication(_) => warn!(error = %err, "authentication rejected"),
                    _ => debug!(error = %err, kind = err.kind(), "frame rejected"),
                }
                let _ = self
                    .broadcaster
                    .send_to_connection(conn_id, &OutboundMessage::new(err.notice()));
                if err.closes_connection() {
                    counter!(WS_AUTH_FAILURES_TOTAL).increment(1);
                    if let Some(handle) = self.hub.connection(conn_id) {
                        handle.close();
                    }
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
