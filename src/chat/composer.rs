//! Outbound composer: send preconditions and envelope construction.

use chrono::{DateTime, Utc};

use super::connection::ConnectionState;
use crate::models::{ChatMessage, Participant};

/// Why a send did not happen. The caller keeps its draft in every case.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendRejection {
    #[error("message is empty")]
    EmptyBody,
    #[error("no conversation selected")]
    NoCounterparty,
    #[error("chat is {0}, message not sent")]
    NotConnected(ConnectionState),
    #[error("chat session is closed")]
    Closed,
}

/// Outcome of a send request: the optimistic message, or why nothing was sent.
pub type SendResult = Result<ChatMessage, SendRejection>;

/// Builds outgoing messages addressed to the single send destination.
#[derive(Debug, Clone)]
pub struct OutboundComposer {
    destination: String,
}

impl OutboundComposer {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Check preconditions and build the envelope for `draft`.
    ///
    /// Order of checks: non-empty body, resolved counterparty, connected.
    /// The returned message is pending and carries a fresh correlation id.
    pub fn compose(
        &self,
        draft: &str,
        me: &Participant,
        counterparty: Option<&Participant>,
        state: ConnectionState,
        now: DateTime<Utc>,
    ) -> SendResult {
        let body = draft.trim();
        if body.is_empty() {
            return Err(SendRejection::EmptyBody);
        }
        let to = counterparty.ok_or(SendRejection::NoCounterparty)?;
        if state != ConnectionState::Connected {
            return Err(SendRejection::NotConnected(state));
        }

        Ok(ChatMessage {
            sender_id: me.id,
            receiver_id: to.id,
            sender_name: me.name.clone(),
            receiver_name: to.name.clone(),
            body: body.to_string(),
            sent_at: now,
            correlation_id: Some(new_correlation_id()),
            server_id: None,
            is_read: false,
            pending: true,
            failed: false,
        })
    }
}

/// Random correlation id; safe under rapid double submission.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> Participant {
        Participant::new(9, "Ana")
    }

    fn admin() -> Participant {
        Participant::new(1, "Admin")
    }

    #[test]
    fn test_compose_builds_pending_envelope() {
        let composer = OutboundComposer::new("/app/chat.sendMessage");
        let now = Utc::now();

        let msg = composer
            .compose("  Hello  ", &me(), Some(&admin()), ConnectionState::Connected, now)
            .unwrap();
        assert_eq!(msg.body, "Hello");
        assert_eq!(msg.sender_id, 9);
        assert_eq!(msg.receiver_id, 1);
        assert_eq!(msg.receiver_name, "Admin");
        assert_eq!(msg.sent_at, now);
        assert!(msg.pending);
        assert!(msg.server_id.is_none());
        assert!(msg.correlation_id.is_some());
    }

    #[test]
    fn test_precondition_order() {
        let composer = OutboundComposer::new("/app/chat.sendMessage");
        let now = Utc::now();

        assert_eq!(
            composer.compose("   ", &me(), None, ConnectionState::Reconnecting, now),
            Err(SendRejection::EmptyBody)
        );
        assert_eq!(
            composer.compose("hi", &me(), None, ConnectionState::Reconnecting, now),
            Err(SendRejection::NoCounterparty)
        );
        assert_eq!(
            composer.compose("hi", &me(), Some(&admin()), ConnectionState::Reconnecting, now),
            Err(SendRejection::NotConnected(ConnectionState::Reconnecting))
        );
    }

    #[test]
    fn test_correlation_ids_unique() {
        let ids: std::collections::HashSet<String> =
            (0..1000).map(|_| new_correlation_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
