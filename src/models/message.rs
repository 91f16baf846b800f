//! Chat message models: the in-memory message and its JSON wire form.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::user::ParticipantId;

/// Errors converting a wire message into a [`ChatMessage`].
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed message JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unparseable sentAt timestamp {0:?}")]
    Timestamp(String),
}

/// One chat message as held by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    pub sender_name: String,
    pub receiver_name: String,
    pub body: String,
    /// Sole ordering key.
    pub sent_at: DateTime<Utc>,
    /// Client token matching an optimistic copy to its server echo.
    pub correlation_id: Option<String>,
    /// Assigned by the backend once persisted.
    pub server_id: Option<i64>,
    pub is_read: bool,
    /// Inserted locally, no server copy seen yet.
    pub pending: bool,
    /// Publishing this local message failed.
    pub failed: bool,
}

impl ChatMessage {
    /// Whether this message travels between `a` and `b` (either direction).
    pub fn is_between(&self, a: ParticipantId, b: ParticipantId) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    /// The participant on the other side from `me`, if `me` takes part.
    pub fn other_party(&self, me: ParticipantId) -> Option<ParticipantId> {
        if self.sender_id == me {
            Some(self.receiver_id)
        } else if self.receiver_id == me {
            Some(self.sender_id)
        } else {
            None
        }
    }

    /// Parse a frame/response body holding a single wire message.
    pub fn from_json(body: &str) -> Result<Self, WireError> {
        let wire: WireMessage = serde_json::from_str(body)?;
        wire.into_message()
    }
}

/// JSON shape exchanged with the backend over STOMP and REST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub sender_id: ParticipantId,
    pub receiver_id: ParticipantId,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub receiver_name: Option<String>,
    pub message: String,
    pub sent_at: String,
    #[serde(default)]
    pub local_id: Option<String>,
    #[serde(default, alias = "read")]
    pub is_read: bool,
}

impl WireMessage {
    /// Convert into a client message. Server copies are never pending.
    pub fn into_message(self) -> Result<ChatMessage, WireError> {
        let sent_at = parse_timestamp(&self.sent_at)?;
        Ok(ChatMessage {
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            sender_name: self.sender_name.unwrap_or_default(),
            receiver_name: self.receiver_name.unwrap_or_default(),
            body: self.message,
            sent_at,
            correlation_id: self.local_id.filter(|s| !s.is_empty()),
            server_id: self.id,
            is_read: self.is_read,
            pending: false,
            failed: false,
        })
    }
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            id: msg.server_id,
            sender_id: msg.sender_id,
            receiver_id: msg.receiver_id,
            sender_name: Some(msg.sender_name.clone()),
            receiver_name: Some(msg.receiver_name.clone()),
            message: msg.body.clone(),
            sent_at: format_timestamp(&msg.sent_at),
            local_id: msg.correlation_id.clone(),
            is_read: msg.is_read,
        }
    }
}

/// Parse an ISO-8601 timestamp. Zone-less local date-times are taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, WireError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .map(|naive| naive.and_utc())
        .map_err(|_| WireError::Timestamp(s.to_string()))
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_server_echo() {
        let json = r#"{"id":501,"senderId":9,"receiverId":1,"senderName":"Ana",
            "receiverName":"Admin","message":"Hello","sentAt":"2024-05-01T10:00:00.000Z",
            "localId":"c1","isRead":false}"#;
        let msg = ChatMessage::from_json(json).unwrap();
        assert_eq!(msg.server_id, Some(501));
        assert_eq!(msg.correlation_id.as_deref(), Some("c1"));
        assert_eq!(msg.body, "Hello");
        assert!(!msg.pending);
        assert_eq!(
            msg.sent_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_local_datetime_and_read_alias() {
        let json = r#"{"senderId":1,"receiverId":9,"message":"hi",
            "sentAt":"2024-05-01T10:00:00.250","read":true}"#;
        let msg = ChatMessage::from_json(json).unwrap();
        assert!(msg.is_read);
        assert!(msg.correlation_id.is_none());
        assert_eq!(msg.sender_name, "");
        assert_eq!(msg.sent_at.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_empty_local_id_is_none() {
        let json = r#"{"senderId":1,"receiverId":9,"message":"hi",
            "sentAt":"2024-05-01T10:00:00Z","localId":""}"#;
        assert!(ChatMessage::from_json(json).unwrap().correlation_id.is_none());
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            ChatMessage::from_json("{not json"),
            Err(WireError::Json(_))
        ));
        let bad_time = r#"{"senderId":1,"receiverId":9,"message":"x","sentAt":"yesterday"}"#;
        assert!(matches!(
            ChatMessage::from_json(bad_time),
            Err(WireError::Timestamp(_))
        ));
    }

    #[test]
    fn test_wire_uses_local_id_field() {
        let msg = ChatMessage {
            sender_id: 9,
            receiver_id: 1,
            sender_name: "Ana".into(),
            receiver_name: "Admin".into(),
            body: "Hello".into(),
            sent_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            correlation_id: Some("c1".into()),
            server_id: None,
            is_read: false,
            pending: true,
            failed: false,
        };
        let value = serde_json::to_value(WireMessage::from(&msg)).unwrap();
        assert_eq!(value["localId"], "c1");
        assert_eq!(value["message"], "Hello");
        assert_eq!(value["sentAt"], "2024-05-01T10:00:00.000Z");
        assert!(value.get("id").is_none());
        assert!(value.get("pending").is_none());
    }

    #[test]
    fn test_other_party() {
        let msg = ChatMessage::from_json(
            r#"{"senderId":5,"receiverId":9,"message":"x","sentAt":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(msg.other_party(5), Some(9));
        assert_eq!(msg.other_party(9), Some(5));
        assert_eq!(msg.other_party(1), None);
        assert!(msg.is_between(9, 5));
        assert!(!msg.is_between(9, 1));
    }
}
