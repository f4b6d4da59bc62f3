//! Connection registry: the single source of truth for live connections.

use std::collections::HashMap;
use std::sync::Arc;

use synap_core::{ConnectionId, Topic, UserId};
use tokio::sync::mpsc;

use super::connection::ClientConnection;

/// Registry record for one connection.
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Outbound handle.
    pub handle: Arc<ClientConnection>,
    /// Bound user, set after successful authentication.
    pub user: Option<UserId>,
    /// The one topic this connection follows, if any.
    pub topic: Option<Topic>,
}

/// Connection id to connection state.
///
/// Not synchronized on its own; the [`Hub`](super::hub::Hub) owns it
/// together with the subscription index behind one lock.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new connection under a fresh id.
    ///
    /// The entry starts anonymous and without a topic.
    pub fn register(&mut self, tx: mpsc::Sender<Arc<str>>) -> Arc<ClientConnection> {
        let mut id = ConnectionId::new();
        while self.entries.contains_key(&id) {
            id = ConnectionId::new();
        }
        let handle = Arc::new(ClientConnection::new(id.clone(), tx));
        let _ = self.entries.insert(
            id,
            ConnectionEntry {
                handle: Arc::clone(&handle),
                user: None,
                topic: None,
            },
        );
        handle
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<&ConnectionEntry> {
        self.entries.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut ConnectionEntry> {
        self.entries.get_mut(id)
    }

    /// Delete a connection and mark its handle closed.
    ///
    /// Removing an absent id is a no-op and returns `None`.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.entries.remove(id)?;
        entry.handle.close();
        Some(entry)
    }

    /// Whether the connection exists and its transport can accept sends.
    pub fn is_open(&self, id: &ConnectionId) -> bool {
        self.entries.get(id).is_some_and(|e| e.handle.is_open())
    }

    /// Iterate all registered connection ids.
    pub fn ids(&self) -> impl Iterator<Item = &ConnectionId> {
        self.entries.keys()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
