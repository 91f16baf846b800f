//! Conversation selector (admin surface): conversation list, active
//! selection, unread counters and last-message previews.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{ChatMessage, ChatUser, ParticipantId};

/// Preview length in characters before truncation.
const PREVIEW_CHARS: usize = 80;

/// One conversation between the admin and a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub counterparty_id: ParticipantId,
    pub counterparty_name: String,
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: u32,
}

impl Conversation {
    fn new(counterparty_id: ParticipantId, counterparty_name: String) -> Self {
        Self {
            counterparty_id,
            counterparty_name,
            last_message_preview: None,
            last_message_at: None,
            unread_count: 0,
        }
    }

    /// Record `msg` as the latest message if it is at least as recent.
    fn note_message(&mut self, msg: &ChatMessage) {
        if self.last_message_at.map_or(true, |at| msg.sent_at >= at) {
            self.last_message_at = Some(msg.sent_at);
            self.last_message_preview = Some(preview(&msg.body));
        }
    }
}

/// Result of feeding one inbound message to the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub counterparty: ParticipantId,
    /// The message belongs to the selected conversation.
    pub is_active: bool,
}

/// Tracks all known conversations and which one is selected.
#[derive(Debug)]
pub struct ConversationSelector {
    admin_id: ParticipantId,
    conversations: HashMap<ParticipantId, Conversation>,
    active: Option<ParticipantId>,
}

impl ConversationSelector {
    pub fn new(admin_id: ParticipantId) -> Self {
        Self {
            admin_id,
            conversations: HashMap::new(),
            active: None,
        }
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.and_then(|id| self.conversations.get(&id))
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Conversation> {
        self.conversations.get(&id)
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Update the conversation a message belongs to.
    ///
    /// Returns `None` for messages that do not involve the admin. Unread
    /// messages from the user count towards `unread_count` only while their
    /// conversation is not selected.
    pub fn observe(&mut self, msg: &ChatMessage) -> Option<Observation> {
        let counterparty = msg.other_party(self.admin_id)?;
        if counterparty == self.admin_id {
            return None;
        }

        let name = if msg.sender_id == counterparty {
            &msg.sender_name
        } else {
            &msg.receiver_name
        };
        let is_active = self.active == Some(counterparty);

        let conv = self.entry(counterparty, name);
        conv.note_message(msg);
        if !is_active && msg.sender_id == counterparty && !msg.is_read {
            conv.unread_count = conv.unread_count.saturating_add(1);
        }

        Some(Observation {
            counterparty,
            is_active,
        })
    }

    /// Make `counterparty` the active conversation, creating it if unknown.
    pub fn select(&mut self, counterparty: ParticipantId) {
        self.entry(counterparty, "");
        self.active = Some(counterparty);
    }

    /// The server acknowledged that the admin has read `counterparty`'s
    /// messages.
    pub fn read_confirmed(&mut self, counterparty: ParticipantId) {
        if let Some(conv) = self.conversations.get_mut(&counterparty) {
            conv.unread_count = 0;
        }
    }

    /// Seed conversations from the backend's chat-user list.
    ///
    /// Known conversations keep their live counters; only the name and a
    /// newer last message are taken over.
    pub fn upsert_user(&mut self, user: &ChatUser, last: Option<&ChatMessage>, unread: u32) {
        let is_new = !self.conversations.contains_key(&user.id);
        let conv = self.entry(user.id, "");
        conv.counterparty_name = user.display_name();
        if let Some(msg) = last {
            conv.note_message(msg);
        }
        if is_new {
            conv.unread_count = unread;
        }
    }

    /// Conversations newest first; those without messages sort last.
    pub fn ordered(&self) -> Vec<&Conversation> {
        let mut list: Vec<&Conversation> = self.conversations.values().collect();
        list.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then_with(|| a.counterparty_id.cmp(&b.counterparty_id))
        });
        list
    }

    fn entry(&mut self, id: ParticipantId, name: &str) -> &mut Conversation {
        let conv = self
            .conversations
            .entry(id)
            .or_insert_with(|| Conversation::new(id, format!("User #{}", id)));
        if !name.trim().is_empty() && conv.counterparty_name.starts_with("User #") {
            conv.counterparty_name = name.to_string();
        }
        conv
    }
}

/// Single-line preview, truncated on a char boundary.
fn preview(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PREVIEW_CHARS {
        let cut: String = flat.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const ADMIN: ParticipantId = 1;
    const A: ParticipantId = 10;
    const B: ParticipantId = 20;

    fn inbound(from: ParticipantId, body: &str, secs: i64) -> ChatMessage {
        ChatMessage {
            sender_id: from,
            receiver_id: ADMIN,
            sender_name: format!("user{}", from),
            receiver_name: "Admin".into(),
            body: body.into(),
            sent_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::seconds(secs),
            correlation_id: None,
            server_id: None,
            is_read: false,
            pending: false,
            failed: false,
        }
    }

    #[test]
    fn test_unread_accounting_with_active_selection() {
        let mut sel = ConversationSelector::new(ADMIN);
        sel.select(B);

        for i in 0..3 {
            let obs = sel.observe(&inbound(A, "from a", i)).unwrap();
            assert!(!obs.is_active);
        }
        let obs = sel.observe(&inbound(B, "from b", 5)).unwrap();
        assert!(obs.is_active);

        assert_eq!(sel.get(A).unwrap().unread_count, 3);
        assert_eq!(sel.get(B).unwrap().unread_count, 0);
    }

    #[test]
    fn test_admin_replies_do_not_count_as_unread() {
        let mut sel = ConversationSelector::new(ADMIN);
        let mut reply = inbound(ADMIN, "on it", 0);
        reply.receiver_id = A;
        reply.receiver_name = "Ana".into();

        let obs = sel.observe(&reply).unwrap();
        assert_eq!(obs.counterparty, A);
        let conv = sel.get(A).unwrap();
        assert_eq!(conv.unread_count, 0);
        assert_eq!(conv.counterparty_name, "Ana");
        assert_eq!(conv.last_message_preview.as_deref(), Some("on it"));
    }

    #[test]
    fn test_unrelated_messages_ignored() {
        let mut sel = ConversationSelector::new(ADMIN);
        let mut msg = inbound(A, "hi", 0);
        msg.receiver_id = B;
        assert!(sel.observe(&msg).is_none());
        assert_eq!(sel.len(), 0);
    }

    #[test]
    fn test_preview_tracks_latest_only() {
        let mut sel = ConversationSelector::new(ADMIN);
        sel.observe(&inbound(A, "newer", 10));
        sel.observe(&inbound(A, "older, late delivery", 5));
        assert_eq!(
            sel.get(A).unwrap().last_message_preview.as_deref(),
            Some("newer")
        );
    }

    #[test]
    fn test_ordering_newest_first_empty_last() {
        let mut sel = ConversationSelector::new(ADMIN);
        sel.select(30);
        sel.observe(&inbound(A, "a", 1));
        sel.observe(&inbound(B, "b", 2));

        let ids: Vec<_> = sel.ordered().iter().map(|c| c.counterparty_id).collect();
        assert_eq!(ids, vec![B, A, 30]);
    }

    #[test]
    fn test_read_confirmed_resets_unread() {
        let mut sel = ConversationSelector::new(ADMIN);
        sel.observe(&inbound(A, "1", 0));
        sel.observe(&inbound(A, "2", 1));
        sel.select(A);
        assert_eq!(sel.get(A).unwrap().unread_count, 2);
        sel.read_confirmed(A);
        assert_eq!(sel.get(A).unwrap().unread_count, 0);
    }

    #[test]
    fn test_upsert_user_keeps_live_counters() {
        let mut sel = ConversationSelector::new(ADMIN);
        let user: ChatUser = serde_json::from_str(r#"{"id":10,"fullName":"Ana Lima"}"#).unwrap();

        sel.upsert_user(&user, None, 4);
        assert_eq!(sel.get(A).unwrap().unread_count, 4);
        assert_eq!(sel.get(A).unwrap().counterparty_name, "Ana Lima");

        sel.observe(&inbound(A, "again", 0));
        sel.upsert_user(&user, None, 0);
        assert_eq!(sel.get(A).unwrap().unread_count, 5);
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(200);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS);
        assert!(p.ends_with("..."));
        assert_eq!(preview("a\n b"), "a b");
    }
}
