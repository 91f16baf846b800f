//! Channel subscriber: destination naming and inbound frame intake.

use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, ParticipantId, WireError};

/// STOMP destinations shared with the backend. `{id}` is replaced by a
/// participant id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Destinations {
    /// Per-participant private queue template.
    pub private_queue: String,
    /// Queue carrying every user's messages to the admin.
    pub any_user_queue: String,
    /// Public broadcast topic.
    pub broadcast: String,
    /// Single destination for all outgoing chat messages.
    pub send: String,
}

impl Default for Destinations {
    fn default() -> Self {
        Self {
            private_queue: "/user/{id}/queue/messages".to_string(),
            any_user_queue: "/queue/messages".to_string(),
            broadcast: "/topic/public".to_string(),
            send: "/app/chat.sendMessage".to_string(),
        }
    }
}

impl Destinations {
    pub fn private_queue_for(&self, id: ParticipantId) -> String {
        self.private_queue.replace("{id}", &id.to_string())
    }

    /// Topics a shopper listens on: own queue, the admin's queue, broadcast.
    ///
    /// The backend may route a message to either side's queue, so both are
    /// subscribed and duplicates are left to the message store.
    pub fn for_user(&self, me: ParticipantId, admin: ParticipantId) -> Vec<String> {
        vec![
            self.private_queue_for(me),
            self.private_queue_for(admin),
            self.broadcast.clone(),
        ]
    }

    /// Topics the admin listens on: own queue, the any-user queue, broadcast.
    pub fn for_admin(&self, admin: ParticipantId) -> Vec<String> {
        vec![
            self.private_queue_for(admin),
            self.any_user_queue.clone(),
            self.broadcast.clone(),
        ]
    }
}

/// `(sender == me && receiver == counterparty) || (sender == counterparty && receiver == me)`
pub fn is_relevant(msg: &ChatMessage, me: ParticipantId, counterparty: ParticipantId) -> bool {
    msg.is_between(me, counterparty)
}

/// Parse the body of an inbound MESSAGE frame.
///
/// Callers log and drop errors; a bad frame must never stop intake.
pub fn parse_inbound(body: &str) -> Result<ChatMessage, WireError> {
    ChatMessage::from_json(body.trim_end_matches('\0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sender: i64, receiver: i64) -> ChatMessage {
        parse_inbound(&format!(
            r#"{{"senderId":{},"receiverId":{},"message":"x","sentAt":"2024-05-01T10:00:00Z"}}"#,
            sender, receiver
        ))
        .unwrap()
    }

    #[test]
    fn test_relevance_filter() {
        let msg = frame(5, 9);
        assert!(is_relevant(&msg, 9, 5));
        assert!(is_relevant(&msg, 5, 9));

        for (me, other) in [(9, 1), (5, 5), (1, 9), (9, 9), (5, 1), (2, 3)] {
            assert!(!is_relevant(&msg, me, other), "({}, {})", me, other);
        }
    }

    #[test]
    fn test_user_destinations() {
        let d = Destinations::default();
        assert_eq!(
            d.for_user(9, 1),
            vec![
                "/user/9/queue/messages".to_string(),
                "/user/1/queue/messages".to_string(),
                "/topic/public".to_string(),
            ]
        );
    }

    #[test]
    fn test_admin_destinations() {
        let d = Destinations {
            any_user_queue: "/queue/admin".into(),
            ..Destinations::default()
        };
        assert_eq!(
            d.for_admin(1),
            vec![
                "/user/1/queue/messages".to_string(),
                "/queue/admin".to_string(),
                "/topic/public".to_string(),
            ]
        );
    }

    #[test]
    fn test_malformed_body_is_error_not_panic() {
        assert!(parse_inbound("").is_err());
        assert!(parse_inbound("[1,2,3]").is_err());
        assert!(parse_inbound(r#"{"senderId":"nine"}"#).is_err());
    }
}
