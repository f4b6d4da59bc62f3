//! Per-connection outbound handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use synap_core::ConnectionId;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::metrics::WS_MESSAGES_DROPPED_TOTAL;

/// Sending half of a connected client.
///
/// Serialized messages go onto a bounded queue drained by the session's
/// single writer task, so messages to one client keep the order in which
/// they were enqueued.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<str>>,
    /// Cancelled once the connection starts closing.
    closing: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last frame (including Pong) was received.
    last_seen: Mutex<Instant>,
    /// Count of messages dropped due to a full or closed queue.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<str>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            closing: CancellationToken::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Whether the transport is ready to accept sends.
    pub fn is_open(&self) -> bool {
        !self.closing.is_cancelled() && !self.tx.is_closed()
    }

    /// Enqueue a serialized message for the client.
    ///
    /// Returns `false` without sending if the connection is closing. A full
    /// or closed queue drops the message and increments the drop counter.
    pub fn send(&self, message: Arc<str>) -> bool {
        if !self.is_open() {
            return false;
        }
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            counter!(WS_MESSAGES_DROPPED_TOTAL).increment(1);
            false
        }
    }

    /// Start closing the connection.
    ///
    /// Messages already queued are still flushed before the writer sends a
    /// close frame. Idempotent.
    pub fn close(&self) {
        self.closing.cancel();
    }

    /// Resolves once [`close`](Self::close) has been called.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closing.cancelled()
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity from the client.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Duration since the last inbound frame (or connection establishment).
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the client was active since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}
