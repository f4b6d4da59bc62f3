//! Single owner of the connection registry and subscription index.
//!
//! Both structures live behind one mutex so that every operation (register,
//! bind, subscribe, unsubscribe, teardown, lookup) is applied atomically with
//! respect to every other. The lock is never held across an `.await`.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use synap_core::{ConnectionId, Topic, UserId};
use tokio::sync::mpsc;

use super::connection::ClientConnection;
use super::registry::{ConnectionEntry, ConnectionRegistry};
use super::subscription::SubscriptionIndex;

/// Read-only counters for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    /// Registered connections.
    pub total_connections: usize,
    /// Distinct authenticated users.
    pub total_users: usize,
    /// Topics with at least one follower.
    pub total_topics: usize,
}

/// Result of a subscribe request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Now following the topic; `left` is the topic switched away from.
    Subscribed {
        /// Previously followed topic, if different.
        left: Option<Topic>,
    },
    /// The connection has no bound user.
    NotAuthenticated,
    /// The connection is gone.
    Unknown,
}

#[derive(Default)]
struct HubState {
    registry: ConnectionRegistry,
    index: SubscriptionIndex,
}

/// Shared connection and subscription state.
pub struct Hub {
    state: Mutex<HubState>,
    send_queue_capacity: usize,
}

impl Hub {
    /// Create a hub whose connections buffer up to `send_queue_capacity`
    /// outbound messages each.
    pub fn new(send_queue_capacity: usize) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            send_queue_capacity: send_queue_capacity.max(1),
        }
    }

    /// Register a new connection and return its handle plus the receiving
    /// end of its outbound queue.
    pub fn register(&self) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(self.send_queue_capacity);
        let handle = self.state.lock().registry.register(tx);
        (handle, rx)
    }

    /// Outbound handle for a connection.
    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.state
            .lock()
            .registry
            .get(id)
            .map(|e| Arc::clone(&e.handle))
    }

    /// Whether the connection is registered and ready to send.
    pub fn is_open(&self, id: &ConnectionId) -> bool {
        self.state.lock().registry.is_open(id)
    }

    /// User bound to the connection, if authenticated.
    pub fn user_of(&self, id: &ConnectionId) -> Option<UserId> {
        self.state.lock().registry.get(id).and_then(|e| e.user.clone())
    }

    /// Topic the connection follows, if any.
    #[cfg(test)]
    pub(crate) fn topic_of(&self, id: &ConnectionId) -> Option<Topic> {
        self.state.lock().registry.get(id).and_then(|e| e.topic.clone())
    }

    /// Bind a user, but only if the connection is still registered and open.
    ///
    /// Returns `false` when the write was discarded.
    pub fn bind_user_if_open(&self, id: &ConnectionId, user: UserId) -> bool {
        let mut guard = self.state.lock();
        let HubState { registry, index } = &mut *guard;
        if !registry.is_open(id) {
            return false;
        }
        index.bind_user(registry, id, user)
    }

    /// Follow a topic if the connection is authenticated.
    pub fn subscribe(&self, id: &ConnectionId, topic: Topic) -> SubscribeOutcome {
        let mut guard = self.state.lock();
        let HubState { registry, index } = &mut *guard;
        match registry.get(id) {
            None => return SubscribeOutcome::Unknown,
            Some(entry) if entry.user.is_none() => return SubscribeOutcome::NotAuthenticated,
            Some(_) => {}
        }
        match index.subscribe_topic(registry, id, topic) {
            Some(left) => SubscribeOutcome::Subscribed { left },
            None => SubscribeOutcome::Unknown,
        }
    }

    /// Stop following a topic. Returns whether the connection was a member.
    pub fn unsubscribe(&self, id: &ConnectionId, topic: &Topic) -> bool {
        let mut guard = self.state.lock();
        let HubState { registry, index } = &mut *guard;
        index.unsubscribe_topic(registry, id, topic)
    }

    /// Release index entries, then remove the registry entry.
    ///
    /// Returns the removed entry on the first call for a connection and
    /// `None` on every later call.
    pub fn teardown(&self, id: &ConnectionId) -> Option<ConnectionEntry> {
        let mut guard = self.state.lock();
        let HubState { registry, index } = &mut *guard;
        // Capture before release clears them, for the caller's logging.
        let (user, topic) = registry
            .get(id)
            .map(|e| (e.user.clone(), e.topic.clone()))?;
        index.release_connection(registry, id);
        let mut entry = registry.remove(id)?;
        entry.user = user;
        entry.topic = topic;
        Some(entry)
    }

    /// Open handles for every session of `user`.
    pub fn user_connections(&self, user: &UserId) -> Vec<Arc<ClientConnection>> {
        let guard = self.state.lock();
        guard
            .index
            .users_connections(user)
            .iter()
            .filter_map(|id| guard.registry.get(id).map(|e| Arc::clone(&e.handle)))
            .collect()
    }

    /// Open handles for every follower of `topic`.
    pub fn topic_connections(&self, topic: &Topic) -> Vec<Arc<ClientConnection>> {
        let guard = self.state.lock();
        guard
            .index
            .topic_connections(topic)
            .iter()
            .filter_map(|id| guard.registry.get(id).map(|e| Arc::clone(&e.handle)))
            .collect()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// Current counters.
    pub fn stats(&self) -> HubStats {
        let guard = self.state.lock();
        HubStats {
            total_connections: guard.registry.len(),
            total_users: guard.index.user_count(),
            total_topics: guard.index.topic_count(),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let hub = Hub::new(4);
        let (conn, _rx) = hub.register();
        assert!(hub.is_open(&conn.id));
        assert!(hub.connection(&conn.id).is_some());
        assert!(hub.user_of(&conn.id).is_none());
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn subscribe_requires_authentication() {
        let hub = Hub::new(4);
        let (conn, _rx) = hub.register();
        assert_eq!(
            hub.subscribe(&conn.id, Topic::from("evt42")),
            SubscribeOutcome::NotAuthenticated
        );
        assert_eq!(hub.stats().total_topics, 0);

        assert!(hub.bind_user_if_open(&conn.id, UserId::from("u1")));
        assert_eq!(
            hub.subscribe(&conn.id, Topic::from("evt42")),
            SubscribeOutcome::Subscribed { left: None }
        );
        assert_eq!(hub.topic_of(&conn.id), Some(Topic::from("evt42")));
    }

    #[test]
    fn subscribe_reports_switched_topic() {
        let hub = Hub::new(4);
        let (conn, _rx) = hub.register();
        let _ = hub.bind_user_if_open(&conn.id, UserId::from("u1"));
        let _ = hub.subscribe(&conn.id, Topic::from("A"));
        assert_eq!(
            hub.subscribe(&conn.id, Topic::from("B")),
            SubscribeOutcome::Subscribed {
                left: Some(Topic::from("A"))
            }
        );
        assert!(hub.topic_connections(&Topic::from("A")).is_empty());
        assert_eq!(hub.topic_connections(&Topic::from("B")).len(), 1);
    }

    #[test]
    fn subscribe_unknown_connection() {
        let hub = Hub::new(4);
        assert_eq!(
            hub.subscribe(&ConnectionId::from("ghost"), Topic::from("A")),
            SubscribeOutcome::Unknown
        );
    }

    #[test]
    fn bind_discarded_after_close() {
        let hub = Hub::new(4);
        let (conn, _rx) = hub.register();
        conn.close();
        assert!(!hub.bind_user_if_open(&conn.id, UserId::from("u1")));
        assert_eq!(hub.stats().total_users, 0);
    }

    #[test]
    fn bind_discarded_after_teardown() {
        let hub = Hub::new(4);
        let (conn, _rx) = hub.register();
        let _ = hub.teardown(&conn.id);
        assert!(!hub.bind_user_if_open(&conn.id, UserId::from("u1")));
        assert_eq!(hub.stats(), HubStats::default());
    }

    #[test]
    fn teardown_happens_once() {
        let hub = Hub::new(4);
        let (conn, _rx) = hub.register();
        let _ = hub.bind_user_if_open(&conn.id, UserId::from("u1"));
        let _ = hub.subscribe(&conn.id, Topic::from("evt42"));

        let entry = hub.teardown(&conn.id).unwrap();
        assert_eq!(entry.user, Some(UserId::from("u1")));
        assert_eq!(entry.topic, Some(Topic::from("evt42")));
        assert!(!entry.handle.is_open());

        assert!(hub.teardown(&conn.id).is_none());
        assert_eq!(hub.stats(), HubStats::default());
    }

    #[test]
    fn user_connections_spans_sessions() {
        let hub = Hub::new(4);
        let (a, _ra) = hub.register();
        let (b, _rb) = hub.register();
        let (c, _rc) = hub.register();
        let _ = hub.bind_user_if_open(&a.id, UserId::from("u1"));
        let _ = hub.bind_user_if_open(&b.id, UserId::from("u1"));
        let _ = hub.bind_user_if_open(&c.id, UserId::from("u2"));

        let mut ids: Vec<_> = hub
            .user_connections(&UserId::from("u1"))
            .iter()
            .map(|h| h.id.clone())
            .collect();
        ids.sort();
        let mut expected = vec![a.id.clone(), b.id.clone()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn stats_counts_distinct_users_and_topics() {
        let hub = Hub::new(4);
        let (a, _ra) = hub.register();
        let (b, _rb) = hub.register();
        let _ = hub.register();
        let _ = hub.bind_user_if_open(&a.id, UserId::from("u1"));
        let _ = hub.bind_user_if_open(&b.id, UserId::from("u1"));
        let _ = hub.subscribe(&a.id, Topic::from("evt1"));
        let _ = hub.subscribe(&b.id, Topic::from("evt1"));

        assert_eq!(
            hub.stats(),
            HubStats {
                total_connections: 3,
                total_users: 1,
                total_topics: 1,
            }
        );
    }

    #[test]
    fn stats_serialize_camel_case() {
        let json = serde_json::to_value(HubStats::default()).unwrap();
        assert_eq!(json["totalConnections"], 0);
        assert_eq!(json["totalUsers"], 0);
        assert_eq!(json["totalTopics"], 0);
    }
}
