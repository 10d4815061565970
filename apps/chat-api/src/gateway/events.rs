//! Gateway event names and wire-format frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::message::ChatMessage;

use super::registry::PresenceEntry;

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names sent by clients.
pub struct EventName;

impl EventName {
    pub const SET_PSEUDO: &'static str = "auth:set-pseudo";
    pub const SEND_MESSAGE: &'static str = "message:send";
    pub const REQUEST_HISTORY: &'static str = "message:request-history";
    pub const TYPING: &'static str = "user:typing";
    pub const STOP_TYPING: &'static str = "user:stop-typing";
}

// ---------------------------------------------------------------------------
// Client → Server frame
// ---------------------------------------------------------------------------

/// A frame received from the client over WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    /// Request id for events that expect an acknowledgment (`message:send`).
    #[serde(default)]
    pub ack: Option<u64>,
}

// ---------------------------------------------------------------------------
// Client payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SetPseudoPayload {
    pub pseudo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessagePayload {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Extract the `limit` of a `message:request-history` payload.
///
/// Accepts integers, floats (truncated), and numeric strings. Anything else,
/// including a missing field, yields `None`.
pub fn requested_history_limit(data: &Value) -> Option<i64> {
    let as_whole = |f: f64| f.is_finite().then(|| f.trunc() as i64);
    match data.get("limit")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(as_whole)),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(as_whole),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Server → Client frames
// ---------------------------------------------------------------------------

/// A frame sent from the server to the client: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "auth:require-pseudo")]
    RequirePseudo,
    #[serde(rename = "auth:success")]
    AuthSuccess { pseudo: String },
    #[serde(rename = "auth:error")]
    AuthError { message: String },
    #[serde(rename = "message:new")]
    NewMessage(ChatMessage),
    #[serde(rename = "message:history")]
    History(Vec<ChatMessage>),
    #[serde(rename = "message:more-history")]
    MoreHistory(Vec<ChatMessage>),
    #[serde(rename = "users:update")]
    UsersUpdate(Vec<PresenceEntry>),
    #[serde(rename = "user:joined")]
    UserJoined(SystemNotice),
    #[serde(rename = "user:left")]
    UserLeft(SystemNotice),
    #[serde(rename = "user:typing")]
    UserTyping {
        pseudo: String,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "ack")]
    Ack(Ack),
}

impl ServerEvent {
    /// The wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequirePseudo => "auth:require-pseudo",
            Self::AuthSuccess { .. } => "auth:success",
            Self::AuthError { .. } => "auth:error",
            Self::NewMessage(_) => "message:new",
            Self::History(_) => "message:history",
            Self::MoreHistory(_) => "message:more-history",
            Self::UsersUpdate(_) => "users:update",
            Self::UserJoined(_) => "user:joined",
            Self::UserLeft(_) => "user:left",
            Self::UserTyping { .. } => "user:typing",
            Self::Error { .. } => "error",
            Self::Ack(_) => "ack",
        }
    }
}

/// Payload of `user:joined` / `user:left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemNotice {
    pub pseudo: String,
    pub timestamp: DateTime<Utc>,
    pub system: bool,
}

impl SystemNotice {
    pub fn now(pseudo: impl Into<String>) -> Self {
        Self {
            pseudo: pseudo.into(),
            timestamp: minitalk_common::time::now_millis(),
            system: true,
        }
    }
}

/// Reply to a client frame that carried an `ack` id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub ack: u64,
    #[serde(flatten)]
    pub outcome: SendOutcome,
}

/// Outcome of `message:send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SendOutcome {
    Sent {
        #[serde(rename = "messageId")]
        message_id: String,
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
    },
}
