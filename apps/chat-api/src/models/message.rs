use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use minitalk_common::id::{prefix, PrefixedId};
use serde::{Deserialize, Serialize};

use crate::validation::RejectionReason;

/// Priority tag attached to every chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Normal,
    Important,
    Urgent,
}

impl MessageType {
    pub const ALL: [MessageType; 3] = [Self::Normal, Self::Important, Self::Urgent];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Important => "important",
            Self::Urgent => "urgent",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = RejectionReason;

    /// Exact, case-sensitive match on the wire names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(RejectionReason::InvalidType)
    }
}

/// An accepted chat message. Immutable once created; owned by the history store.
///
/// Serialized field names match both the wire protocol and the persisted
/// history file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    /// Sender's pseudo at send time.
    pub pseudo: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub timestamp: DateTime<Utc>,
    /// Connection that sent the message. Only used by clients to spot their own messages.
    pub sender_id: String,
}

impl PrefixedId for ChatMessage {
    const PREFIX: &'static str = prefix::MESSAGE;
}

impl ChatMessage {
    pub fn new(
        pseudo: impl Into<String>,
        content: impl Into<String>,
        kind: MessageType,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Self::generate_id(),
            pseudo: pseudo.into(),
            content: content.into(),
            kind,
            timestamp: minitalk_common::time::now_millis(),
            sender_id: sender_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_parses_wire_names_only() {
        assert_eq!("normal".parse::<MessageType>(), Ok(MessageType::Normal));
        assert_eq!("urgent".parse::<MessageType>(), Ok(MessageType::Urgent));
        assert_eq!(
            "URGENT".parse::<MessageType>(),
            Err(RejectionReason::InvalidType)
        );
        assert_eq!("".parse::<MessageType>(), Err(RejectionReason::InvalidType));
    }

    #[test]
    fn message_serializes_with_wire_field_names() {
        let msg = ChatMessage::new("Bob", "Hi", MessageType::Important, "conn_1");
        let json = serde_json::to_value(&msg).unwrap();

        assert!(json["id"].as_str().unwrap().starts_with("msg_"));
        assert_eq!(json["pseudo"], "Bob");
        assert_eq!(json["type"], "important");
        assert_eq!(json["senderId"], "conn_1");
        let ts = json["timestamp"].as_str().unwrap();
        assert!(ts.ends_with('Z'), "expected UTC ISO-8601, got {ts}");

        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn ids_are_unique() {
        let a = ChatMessage::new("a", "x", MessageType::Normal, "c");
        let b = ChatMessage::new("a", "x", MessageType::Normal, "c");
        assert_ne!(a.id, b.id);
    }
}
