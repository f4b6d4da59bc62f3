//! Connection lifecycle: accept, frame delivery, heartbeat and teardown.
//!
//! [`Supervisor`] turns transport events into registry and index changes and
//! guarantees each connection is torn down exactly once.
//! [`run_ws_session`] is the thin axum adapter that feeds it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use synap_core::{Topic, UserId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::dispatcher::Dispatcher;
use super::hub::Hub;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Ping cadence and idle limit for a session.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    /// Interval between server-initiated Ping frames.
    pub interval: Duration,
    /// Idle time after which the client is considered dead.
    pub timeout: Duration,
}

/// Why a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent a close frame or the stream ended.
    ClientClosed,
    /// Read or write on the socket failed.
    TransportError(String),
    /// No inbound activity within the heartbeat timeout.
    HeartbeatTimeout,
    /// The server closed the connection (e.g. after `AUTH_ERROR`).
    ServerClosed,
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed => f.write_str("client closed"),
            Self::TransportError(e) => write!(f, "transport error: {e}"),
            Self::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            Self::ServerClosed => f.write_str("server closed"),
            Self::Shutdown => f.write_str("server shutdown"),
        }
    }
}

/// Binds transport events to hub mutations.
pub struct Supervisor {
    hub: Arc<Hub>,
    dispatcher: Arc<Dispatcher>,
}

impl Supervisor {
    /// Create a supervisor.
    pub fn new(hub: Arc<Hub>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { hub, dispatcher }
    }

    /// Register a freshly accepted connection.
    pub fn accept(&self) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<str>>) {
        let (connection, outbound) = self.hub.register();
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        info!(conn_id = %connection.id, "client connected");
        (connection, outbound)
    }

    /// Deliver an inbound text frame.
    pub async fn on_text(&self, connection: &ClientConnection, text: &str) {
        connection.mark_alive();
        self.dispatcher.dispatch(&connection.id, text).await;
    }

    /// Deliver an inbound binary frame.
    pub async fn on_binary(&self, connection: &ClientConnection, data: &[u8]) {
        connection.mark_alive();
        self.dispatcher.dispatch_binary(&connection.id, data).await;
    }

    /// Tear the connection down: release its index entries, then remove it
    /// from the registry.
    ///
    /// Returns `true` only for the call that performed the teardown.
    pub fn on_disconnect(&self, connection: &ClientConnection, reason: &DisconnectReason) -> bool {
        let Some(entry) = self.hub.teardown(&connection.id) else {
            debug!(conn_id = %connection.id, %reason, "connection already torn down");
            return false;
        };

        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());

        let user_id = entry.user.as_ref().map(UserId::as_str);
        let topic = entry.topic.as_ref().map(Topic::as_str);
        if let DisconnectReason::TransportError(_) = reason {
            warn!(conn_id = %connection.id, user_id, topic, %reason, "client disconnected");
        } else {
            info!(conn_id = %connection.id, user_id, topic, %reason, "client disconnected");
        }
        true
    }
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection
/// 2. Dispatches inbound text and binary frames
/// 3. Forwards the outbound queue through a single writer task
/// 4. Sends periodic Ping frames and drops unresponsive clients
/// 5. Tears down exactly once, whatever ended the session
#[instrument(skip_all, fields(conn_id))]
pub async fn run_ws_session(
    socket: WebSocket,
    supervisor: Arc<Supervisor>,
    heartbeat: Heartbeat,
    shutdown: CancellationToken,
) {
    let (connection, outbound) = supervisor.accept();
    let _ = tracing::Span::current().record("conn_id", tracing::field::display(&connection.id));

    let (ws_tx, mut ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_loop(ws_tx, outbound, Arc::clone(&connection), heartbeat));

    let (reason, writer_done) = loop {
        tokio::select! {
            result = &mut writer => {
                let reason = result.unwrap_or_else(|e| DisconnectReason::TransportError(e.to_string()));
                break (reason, true);
            }
            () = shutdown.cancelled() => break (DisconnectReason::Shutdown, false),
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => supervisor.on_text(&connection, text.as_str()).await,
                Some(Ok(Message::Binary(data))) => supervisor.on_binary(&connection, &data).await,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => connection.mark_alive(),
                Some(Ok(Message::Close(_))) | None => break (DisconnectReason::ClientClosed, false),
                Some(Err(e)) => break (DisconnectReason::TransportError(e.to_string()), false),
            },
        }
    };

    // Let the writer flush and send a close frame before giving up on it.
    connection.close();
    if !writer_done && tokio::time::timeout(Duration::from_secs(1), &mut writer).await.is_err() {
        writer.abort();
    }

    let _ = supervisor.on_disconnect(&connection, &reason);
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Arc<str>>,
    connection: Arc<ClientConnection>,
    heartbeat: Heartbeat,
) -> DisconnectReason {
    let mut ping_interval = tokio::time::interval(heartbeat.interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            // Queued messages go out before a pending close.
            biased;
            msg = outbound.recv() => {
                let Some(text) = msg else {
                    return DisconnectReason::ServerClosed;
                };
                if let Err(e) = sink.send(Message::Text(String::from(&*text).into())).await {
                    return DisconnectReason::TransportError(e.to_string());
                }
            }
            () = connection.closed() => {
                let _ = sink.send(Message::Close(None)).await;
                return DisconnectReason::ServerClosed;
            }
            _ = ping_interval.tick() => {
                if !connection.check_alive() && connection.idle_for() > heartbeat.timeout {
                    warn!(conn_id = %connection.id, idle = ?connection.idle_for(), "client unresponsive, disconnecting");
                    let _ = sink.send(Message::Close(None)).await;
                    return DisconnectReason::HeartbeatTimeout;
                }
                if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                    return DisconnectReason::TransportError(e.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synap_auth::JwtVerifier;
    use synap_auth::test_utils::{TEST_SECRET, create_test_token};

    use crate::websocket::broadcast::Broadcaster;

    fn supervisor() -> (Arc<Hub>, Supervisor) {
        let hub = Arc::new(Hub::new(8));
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&hub)));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&hub),
            broadcaster,
            Arc::new(JwtVerifier::new(TEST_SECRET)),
        ));
        (Arc::clone(&hub), Supervisor::new(hub, dispatcher))
    }

    #[test]
    fn accept_registers_connection() {
        let (hub, sup) = supervisor();
        let (conn, _rx) = sup.accept();
        assert!(hub.is_open(&conn.id));
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn on_text_dispatches_and_marks_alive() {
        let (hub, sup) = supervisor();
        let (conn, mut rx) = sup.accept();
        let _ = conn.check_alive();

        let frame = serde_json::json!({"type": "AUTHENTICATE", "token": create_test_token("u1")});
        sup.on_text(&conn, &frame.to_string()).await;

        assert!(conn.check_alive());
        assert_eq!(hub.user_of(&conn.id), Some(UserId::from("u1")));
        let reply: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(reply["type"], "AUTH_SUCCESS");
    }

    #[tokio::test]
    async fn on_binary_dispatches_utf8() {
        let (_hub, sup) = supervisor();
        let (conn, mut rx) = sup.accept();
        sup.on_binary(&conn, br#"{"type":"NOPE"}"#).await;
        let reply: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(reply["payload"]["message"], "Unknown message type");
    }

    #[tokio::test]
    async fn disconnect_releases_everything_once() {
        let (hub, sup) = supervisor();
        let (conn, _rx) = sup.accept();
        let _ = hub.bind_user_if_open(&conn.id, UserId::from("u1"));
        let _ = hub.subscribe(&conn.id, Topic::from("evt42"));

        assert!(sup.on_disconnect(&conn, &DisconnectReason::ClientClosed));
        assert!(!sup.on_disconnect(&conn, &DisconnectReason::TransportError("reset".into())));

        let stats = hub.stats();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.total_users, 0);
        assert_eq!(stats.total_topics, 0);
        assert!(!conn.is_open());
    }

    #[test]
    fn transport_errors_log_at_warn() {
        let (logs, _guard) = synap_logging::capture_logs();
        let (_hub, sup) = supervisor();
        let (conn, _rx) = sup.accept();
        let _ = sup.on_disconnect(&conn, &DisconnectReason::TransportError("reset".into()));

        assert!(logs.has_event(tracing::Level::WARN, "client disconnected"));
        let event = logs
            .events()
            .into_iter()
            .find(|e| e.message == "client disconnected")
            .unwrap();
        assert_eq!(event.field("conn_id"), Some(conn.id.as_str()));
    }

    #[test]
    fn reason_display() {
        assert_eq!(DisconnectReason::ClientClosed.to_string(), "client closed");
        assert_eq!(
            DisconnectReason::TransportError("reset".into()).to_string(),
            "transport error: reset"
        );
        assert_eq!(DisconnectReason::HeartbeatTimeout.to_string(), "heartbeat timeout");
    }
}
