//! Fan-out of outbound messages to connections, users and topics.
//!
//! This is the API controllers use after persisting a change. Delivery is
//! best-effort and at-most-once: closed connections are skipped silently
//! and nothing is retried.

use std::sync::Arc;

use serde_json::Value;
use synap_core::{ConnectionId, OutboundMessage, ServerMessage, Topic, UserId};
use tracing::{debug, trace, warn};

use super::connection::ClientConnection;
use super::hub::Hub;

/// Sends messages to connected clients.
pub struct Broadcaster {
    hub: Arc<Hub>,
}

impl Broadcaster {
    /// Create a broadcaster over `hub`.
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Send to one connection. A closed or unknown connection is a no-op.
    ///
    /// Returns whether the message was enqueued.
    pub fn send_to_connection(&self, id: &ConnectionId, message: &OutboundMessage) -> bool {
        let Some(handle) = self.hub.connection(id) else {
            trace!(conn_id = %id, "send to unknown connection skipped");
            return false;
        };
        if !handle.is_open() {
            return false;
        }
        let Some(text) = encode(message) else {
            return false;
        };
        deliver(&handle, &text)
    }

    /// Send to every open session of `user`.
    ///
    /// Returns the number of connections the message was enqueued on.
    pub fn send_to_user(&self, user: &UserId, message: &OutboundMessage) -> usize {
        let targets = self.hub.user_connections(user);
        let delivered = fan_out(&targets, message);
        debug!(
            user_id = %user,
            message_type = message.message_type(),
            recipients = delivered,
            "sent message to user"
        );
        delivered
    }

    /// Send to every follower of `topic`.
    ///
    /// Returns the number of connections the message was enqueued on.
    pub fn broadcast_to_topic(&self, topic: &Topic, message: &OutboundMessage) -> usize {
        let targets = self.hub.topic_connections(topic);
        let delivered = fan_out(&targets, message);
        debug!(
            %topic,
            message_type = message.message_type(),
            recipients = delivered,
            "broadcast message to topic"
        );
        delivered
    }

    /// `EVENT_UPDATED` to the event's followers.
    pub fn notify_event_updated(&self, topic: &Topic, payload: Value) -> usize {
        self.broadcast_to_topic(topic, &OutboundMessage::stamped(ServerMessage::EventUpdated(payload)))
    }

    /// `TEAM_UPDATED` to the event's followers.
    pub fn notify_team_updated(&self, topic: &Topic, payload: Value) -> usize {
        self.broadcast_to_topic(topic, &OutboundMessage::stamped(ServerMessage::TeamUpdated(payload)))
    }

    /// `SCORE_UPDATED` to the event's followers.
    pub fn notify_score_updated(&self, topic: &Topic, payload: Value) -> usize {
        self.broadcast_to_topic(topic, &OutboundMessage::stamped(ServerMessage::ScoreUpdated(payload)))
    }

    /// `ANNOUNCEMENT_CREATED` to an event's followers, or to the `global`
    /// topic when no event is given.
    pub fn notify_announcement(&self, topic: Option<&Topic>, payload: Value) -> usize {
        let global = Topic::global();
        let topic = topic.unwrap_or(&global);
        self.broadcast_to_topic(
            topic,
            &OutboundMessage::stamped(ServerMessage::AnnouncementCreated(payload)),
        )
    }

    /// `NOTIFICATION_CREATED` to every session of `user`.
    pub fn notify_user(&self, user: &UserId, payload: Value) -> usize {
        self.send_to_user(user, &OutboundMessage::stamped(ServerMessage::NotificationCreated(payload)))
    }
}

fn encode(message: &OutboundMessage) -> Option<Arc<str>> {
    match message.to_json() {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            warn!(message_type = message.message_type(), error = %e, "failed to serialize message");
            None
        }
    }
}

fn fan_out(targets: &[Arc<ClientConnection>], message: &OutboundMessage) -> usize {
    if targets.is_empty() {
        return 0;
    }
    let Some(text) = encode(message) else {
        return 0;
    };
    targets.iter().filter(|h| deliver(h, &text)).count()
}

fn deliver(handle: &ClientConnection, text: &Arc<str>) -> bool {
    // Liveness is checked again here: the connection may have closed since
    // the target list was resolved.
    if !handle.is_open() {
        return false;
    }
    let sent = handle.send(Arc::clone(text));
    if !sent {
        warn!(conn_id = %handle.id, dropped = handle.drop_count(), "outbound queue full, message dropped");
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Setup {
        hub: Arc<Hub>,
        broadcaster: Broadcaster,
    }

    fn setup() -> Setup {
        let hub = Arc::new(Hub::new(8));
        Setup {
            broadcaster: Broadcaster::new(Arc::clone(&hub)),
            hub,
        }
    }

    fn connect(
        hub: &Hub,
        user: Option<&str>,
        topic: Option<&str>,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<str>>) {
        let (conn, rx) = hub.register();
        if let Some(user) = user {
            assert!(hub.bind_user_if_open(&conn.id, UserId::from(user)));
        }
        if let Some(topic) = topic {
            let _ = hub.subscribe(&conn.id, Topic::from(topic));
        }
        (conn, rx)
    }

    fn received(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    fn score(points: u32) -> OutboundMessage {
        OutboundMessage::new(ServerMessage::ScoreUpdated(json!({"teamId": "t1", "score": points})))
    }

    #[test]
    fn send_to_connection_delivers() {
        let s = setup();
        let (conn, mut rx) = connect(&s.hub, None, None);
        assert!(s.broadcaster.send_to_connection(&conn.id, &score(10)));
        let msgs = received(&mut rx);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["type"], "SCORE_UPDATED");
        assert_eq!(msgs[0]["payload"]["score"], 10);
    }

    #[test]
    fn send_to_closed_connection_is_silent() {
        let s = setup();
        let (conn, rx) = connect(&s.hub, None, None);
        drop(rx);
        assert!(!s.broadcaster.send_to_connection(&conn.id, &score(1)));
        assert!(!s.broadcaster.send_to_connection(&ConnectionId::from("ghost"), &score(1)));
        assert_eq!(conn.drop_count(), 0);
    }

    #[test]
    fn send_to_user_reaches_every_tab_and_nobody_else() {
        let s = setup();
        let (_c1, mut r1) = connect(&s.hub, Some("u1"), None);
        let (_c2, mut r2) = connect(&s.hub, Some("u1"), None);
        let (_c3, mut r3) = connect(&s.hub, Some("u2"), None);
        let (_c4, mut r4) = connect(&s.hub, None, None);

        assert_eq!(s.broadcaster.send_to_user(&UserId::from("u1"), &score(5)), 2);
        assert_eq!(received(&mut r1).len(), 1);
        assert_eq!(received(&mut r2).len(), 1);
        assert!(received(&mut r3).is_empty());
        assert!(received(&mut r4).is_empty());
    }

    #[test]
    fn send_to_user_skips_closed_tab() {
        let s = setup();
        let (c1, _r1) = connect(&s.hub, Some("u1"), None);
        let (_c2, mut r2) = connect(&s.hub, Some("u1"), None);
        let _ = s.hub.teardown(&c1.id);

        assert_eq!(s.broadcaster.send_to_user(&UserId::from("u1"), &score(5)), 1);
        assert_eq!(received(&mut r2).len(), 1);
    }

    #[test]
    fn broadcast_to_topic_only_reaches_followers() {
        let s = setup();
        let (_a, mut ra) = connect(&s.hub, Some("u1"), Some("evt42"));
        let (_b, mut rb) = connect(&s.hub, Some("u2"), Some("evt7"));

        assert_eq!(s.broadcaster.broadcast_to_topic(&Topic::from("evt42"), &score(3)), 1);
        let msgs = received(&mut ra);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0], json!({"type": "SCORE_UPDATED", "payload": {"teamId": "t1", "score": 3}}));
        assert!(received(&mut rb).is_empty());
    }

    #[test]
    fn broadcast_to_empty_topic() {
        let s = setup();
        assert_eq!(s.broadcaster.broadcast_to_topic(&Topic::from("nobody"), &score(1)), 0);
    }

    #[test]
    fn per_connection_order_is_preserved() {
        let s = setup();
        let (conn, mut rx) = connect(&s.hub, Some("u1"), Some("evt42"));
        let _ = s.broadcaster.broadcast_to_topic(&Topic::from("evt42"), &score(1));
        let _ = s.broadcaster.send_to_user(&UserId::from("u1"), &score(2));
        let _ = s.broadcaster.send_to_connection(&conn.id, &score(3));

        let scores: Vec<_> = received(&mut rx)
            .iter()
            .map(|m| m["payload"]["score"].as_u64().unwrap())
            .collect();
        assert_eq!(scores, vec![1, 2, 3]);
    }

    #[test]
    fn full_queue_drops_message() {
        let hub = Arc::new(Hub::new(1));
        let broadcaster = Broadcaster::new(Arc::clone(&hub));
        let (conn, _rx) = connect(&hub, Some("u1"), None);
        assert_eq!(broadcaster.send_to_user(&UserId::from("u1"), &score(1)), 1);
        assert_eq!(broadcaster.send_to_user(&UserId::from("u1"), &score(2)), 0);
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn notify_helpers_stamp_and_tag() {
        let s = setup();
        let (_a, mut ra) = connect(&s.hub, Some("u1"), Some("evt42"));

        let _ = s.broadcaster.notify_event_updated(&Topic::from("evt42"), json!({"name": "Hack"}));
        let _ = s.broadcaster.notify_team_updated(&Topic::from("evt42"), json!({"teamId": "t1"}));
        let _ = s.broadcaster.notify_score_updated(&Topic::from("evt42"), json!({"score": 9}));
        let _ = s.broadcaster.notify_user(&UserId::from("u1"), json!({"title": "Hi"}));

        let msgs = received(&mut ra);
        let types: Vec<_> = msgs.iter().map(|m| m["type"].as_str().unwrap().to_owned()).collect();
        assert_eq!(
            types,
            ["EVENT_UPDATED", "TEAM_UPDATED", "SCORE_UPDATED", "NOTIFICATION_CREATED"]
        );
        assert!(msgs.iter().all(|m| m["timestamp"].is_string()));
    }

    #[test]
    fn announcement_defaults_to_global_topic() {
        let s = setup();
        let (_g, mut rg) = connect(&s.hub, Some("u1"), Some(Topic::GLOBAL));
        let (_e, mut re) = connect(&s.hub, Some("u2"), Some("evt42"));

        assert_eq!(s.broadcaster.notify_announcement(None, json!({"text": "Welcome"})), 1);
        assert_eq!(
            s.broadcaster
                .notify_announcement(Some(&Topic::from("evt42")), json!({"text": "Judging starts"})),
            1
        );

        let global = received(&mut rg);
        assert_eq!(global.len(), 1);
        assert_eq!(global[0]["type"], "ANNOUNCEMENT_CREATED");
        assert_eq!(global[0]["payload"]["text"], "Welcome");
        assert_eq!(received(&mut re)[0]["payload"]["text"], "Judging starts");
    }
}
