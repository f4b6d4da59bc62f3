//! Reverse lookups from users and topics to connection ids.
//!
//! The index and the [`ConnectionRegistry`] are mutated together: every
//! operation here takes the registry as well, so the `user`/`topic` recorded
//! on an entry always agrees with the sets it appears in.
//!
//! Invariants:
//! - a connection id listed under user `u` exists and is bound to `u`
//! - a connection id listed under topic `t` exists and follows `t`
//! - a connection appears under at most one topic
//! - no user or topic maps to an empty set

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use synap_core::{ConnectionId, Topic, UserId};

use super::registry::ConnectionRegistry;

/// User and topic membership for live connections.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    users: HashMap<UserId, HashSet<ConnectionId>>,
    topics: HashMap<Topic, HashSet<ConnectionId>>,
}

impl SubscriptionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a user, replacing any previous binding.
    ///
    /// Returns `false` if the connection is not registered.
    pub fn bind_user(
        &mut self,
        registry: &mut ConnectionRegistry,
        id: &ConnectionId,
        user: UserId,
    ) -> bool {
        let Some(entry) = registry.get_mut(id) else {
            return false;
        };
        if let Some(previous) = entry.user.replace(user.clone()) {
            if previous != user {
                let _ = remove_member(&mut self.users, &previous, id);
            }
        }
        let _ = self.users.entry(user).or_default().insert(id.clone());
        true
    }

    /// Follow `topic`, leaving the connection's previous topic first.
    ///
    /// Returns the topic that was left, if the call switched topics, or
    /// `None` if the connection is not registered.
    pub fn subscribe_topic(
        &mut self,
        registry: &mut ConnectionRegistry,
        id: &ConnectionId,
        topic: Topic,
    ) -> Option<Option<Topic>> {
        let entry = registry.get_mut(id)?;
        let left = match entry.topic.take() {
            Some(previous) if previous != topic => {
                let _ = remove_member(&mut self.topics, &previous, id);
                Some(previous)
            }
            _ => None,
        };
        let _ = self.topics.entry(topic.clone()).or_default().insert(id.clone());
        entry.topic = Some(topic);
        Some(left)
    }

    /// Stop following `topic`.
    ///
    /// The connection's recorded topic is cleared only if it is `topic`.
    /// Returns whether the connection was a member; a repeat call is a no-op.
    pub fn unsubscribe_topic(
        &mut self,
        registry: &mut ConnectionRegistry,
        id: &ConnectionId,
        topic: &Topic,
    ) -> bool {
        let removed = remove_member(&mut self.topics, topic, id);
        if let Some(entry) = registry.get_mut(id) {
            if entry.topic.as_ref() == Some(topic) {
                entry.topic = None;
            }
        }
        removed
    }

    /// Drop every index entry that references the connection.
    ///
    /// Called once per teardown, before the registry entry is removed.
    pub fn release_connection(&mut self, registry: &mut ConnectionRegistry, id: &ConnectionId) {
        let Some(entry) = registry.get_mut(id) else {
            return;
        };
        if let Some(user) = entry.user.take() {
            let _ = remove_member(&mut self.users, &user, id);
        }
        if let Some(topic) = entry.topic.take() {
            let _ = remove_member(&mut self.topics, &topic, id);
        }
    }

    /// Connections currently authenticated as `user` (possibly empty).
    pub fn users_connections(&self, user: &UserId) -> HashSet<ConnectionId> {
        self.users.get(user).cloned().unwrap_or_default()
    }

    /// Connections currently following `topic` (possibly empty).
    pub fn topic_connections(&self, topic: &Topic) -> HashSet<ConnectionId> {
        self.topics.get(topic).cloned().unwrap_or_default()
    }

    /// Number of distinct authenticated users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of topics with at least one follower.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Whether `id` appears anywhere in the index.
    #[cfg(test)]
    fn references(&self, id: &ConnectionId) -> bool {
        self.users.values().any(|s| s.contains(id)) || self.topics.values().any(|s| s.contains(id))
    }
}

fn remove_member<K: Hash + Eq>(
    map: &mut HashMap<K, HashSet<ConnectionId>>,
    key: &K,
    id: &ConnectionId,
) -> bool {
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    let removed = set.remove(id);
    if set.is_empty() {
        let _ = map.remove(key);
    }
    removed
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
