//! Participant models

use serde::{Deserialize, Serialize};

use super::message::ChatMessage;

/// Numeric user id as assigned by the storefront backend.
pub type ParticipantId = i64;

/// One side of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
}

impl Participant {
    pub fn new(id: ParticipantId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Entry of the admin's chat-user list.
///
/// The backend returns its user entity here, so the display name may live in
/// any of several fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUser {
    pub id: ParticipantId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl ChatUser {
    pub fn display_name(&self) -> String {
        [&self.full_name, &self.name, &self.username, &self.email]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| format!("User #{}", self.id))
    }
}

/// A chat user together with the lookups the admin list shows for it.
#[derive(Debug, Clone)]
pub struct ChatUserSummary {
    pub user: ChatUser,
    pub last_message: Option<ChatMessage>,
    pub unread: u32,
}
