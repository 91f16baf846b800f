//! Message store: deduplicated, time-ordered messages of one conversation.

use crate::models::{ChatMessage, ParticipantId};

/// What `insert_if_new` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new entry was added.
    Inserted,
    /// Matched an existing entry and filled in fields it lacked.
    Merged,
    /// Matched an existing entry; nothing changed.
    Duplicate,
}

/// Messages sorted ascending by `sent_at`.
///
/// Invariants: no two entries share a server id, at most one entry carries a
/// given correlation id, and equal timestamps keep arrival order.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Insert `msg` unless an entry with the same server id or correlation id
    /// exists, in which case the newcomer's extra fields are merged in.
    pub fn insert_if_new(&mut self, msg: ChatMessage) -> InsertOutcome {
        if let Some(existing) = self.messages.iter_mut().find(|m| same_message(m, &msg)) {
            return if merge_into(existing, msg) {
                InsertOutcome::Merged
            } else {
                InsertOutcome::Duplicate
            };
        }

        let pos = self
            .messages
            .partition_point(|m| m.sent_at <= msg.sent_at);
        self.messages.insert(pos, msg);
        InsertOutcome::Inserted
    }

    /// Set `is_read` on every unread entry matching `pred`. Returns how many
    /// entries changed.
    pub fn mark_read<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&ChatMessage) -> bool,
    {
        let mut changed = 0;
        for msg in self.messages.iter_mut().filter(|m| !m.is_read) {
            if pred(msg) {
                msg.is_read = true;
                changed += 1;
            }
        }
        changed
    }

    /// Replace the contents with freshly loaded history.
    ///
    /// Current entries are merged back in afterwards, so live messages that
    /// arrived while the history was loading and unconfirmed sends survive.
    pub fn replace_all(&mut self, history: Vec<ChatMessage>) {
        let current: Vec<ChatMessage> = self.messages.drain(..).collect();

        let mut sorted = history;
        sorted.sort_by_key(|m| m.sent_at);
        for msg in sorted.into_iter().chain(current) {
            self.insert_if_new(msg);
        }
    }

    /// Drop every entry. Used when the visible conversation changes.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Find the entry carrying `correlation_id`.
    pub fn find_by_correlation_mut(&mut self, correlation_id: &str) -> Option<&mut ChatMessage> {
        self.messages
            .iter_mut()
            .find(|m| m.correlation_id.as_deref() == Some(correlation_id))
    }

    /// Count unread messages sent by `sender`.
    pub fn unread_from(&self, sender: ParticipantId) -> usize {
        self.messages
            .iter()
            .filter(|m| m.sender_id == sender && !m.is_read)
            .count()
    }
}

fn same_message(a: &ChatMessage, b: &ChatMessage) -> bool {
    let same_server = matches!((a.server_id, b.server_id), (Some(x), Some(y)) if x == y);
    let same_correlation = matches!(
        (&a.correlation_id, &b.correlation_id),
        (Some(x), Some(y)) if x == y
    );
    same_server || same_correlation
}

/// Fold `newer` into `existing`. Returns whether anything changed.
///
/// `sent_at` stays as first seen so a merge never reorders the store.
fn merge_into(existing: &mut ChatMessage, newer: ChatMessage) -> bool {
    let before = existing.clone();

    if existing.server_id.is_none() {
        existing.server_id = newer.server_id;
    }
    if existing.correlation_id.is_none() {
        existing.correlation_id = newer.correlation_id;
    }
    if existing.server_id.is_some() {
        existing.pending = false;
        existing.failed = false;
    } else {
        existing.pending = existing.pending && newer.pending;
    }
    existing.is_read |= newer.is_read;
    if existing.sender_name.is_empty() {
        existing.sender_name = newer.sender_name;
    }
    if existing.receiver_name.is_empty() {
        existing.receiver_name = newer.receiver_name;
    }

    *existing != before
}
