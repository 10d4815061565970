//! The broadcast router: per-connection protocol state machine.
//!
//! Every inbound event is handled synchronously under one state lock, so the
//! session registry and history store are only ever mutated by one event at a
//! time, and broadcasts leave in the order the hub accepted them. Outbound
//! delivery is a non-blocking queue push and persistence runs on its own task,
//! so nothing slow happens while the lock is held.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::Config;
use crate::error::ChatError;
use crate::models::message::ChatMessage;
use crate::validation::{self, RejectionReason};

use super::events::{
    requested_history_limit, Ack, ClientFrame, EventName, SendMessagePayload, SendOutcome,
    ServerEvent, SetPseudoPayload, SystemNotice,
};
use super::fanout::Outbox;
use super::history::{HistoryStore, HistoryWriter};
use super::registry::{PresenceEntry, Session, SessionRegistry};

/// Protocol state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unauthenticated,
    Authenticated,
    /// Disconnected, or never seen by this hub.
    Closed,
}

/// Limits the hub enforces, taken from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct HubLimits {
    pub max_message_length: usize,
    pub history_on_connect: usize,
    pub max_history_page: usize,
}

impl From<&Config> for HubLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_message_length: config.max_message_length,
            history_on_connect: config.history_on_connect,
            max_history_page: config.max_history_page,
        }
    }
}

struct HubState {
    connections: HashMap<String, ConnectionState>,
    sessions: SessionRegistry,
    history: HistoryStore,
}

impl HubState {
    fn state_of(&self, connection_id: &str) -> ConnectionState {
        self.connections
            .get(connection_id)
            .copied()
            .unwrap_or(ConnectionState::Closed)
    }
}

/// Owns the session registry and history store and drives the chat protocol.
pub struct ChatHub {
    state: Mutex<HubState>,
    outbox: Arc<dyn Outbox>,
    writer: Option<HistoryWriter>,
    limits: HubLimits,
}

impl ChatHub {
    pub fn new(limits: HubLimits, history: HistoryStore, outbox: Arc<dyn Outbox>) -> Self {
        let writer = history.writer();
        Self {
            state: Mutex::new(HubState {
                connections: HashMap::new(),
                sessions: SessionRegistry::new(),
                history,
            }),
            outbox,
            writer,
            limits,
        }
    }

    // -----------------------------------------------------------------------
    // Transport entry points
    // -----------------------------------------------------------------------

    /// A new connection arrived: it starts unauthenticated and is asked for a pseudo.
    ///
    /// `open` registers the connection's outbound queue. It runs under the
    /// state lock, so no broadcast can reach the queue before the greeting.
    pub fn connect<R>(&self, connection_id: &str, open: impl FnOnce() -> R) -> R {
        let mut state = self.state.lock();
        let queue = open();
        state
            .connections
            .insert(connection_id.to_string(), ConnectionState::Unauthenticated);
        self.outbox.send_to(connection_id, ServerEvent::RequirePseudo);
        queue
    }

    /// Route one decoded client frame to its handler.
    pub fn dispatch(&self, connection_id: &str, frame: ClientFrame) {
        let ClientFrame { event, data, ack } = frame;
        match event.as_str() {
            EventName::SET_PSEUDO => {
                let _ = self.set_pseudo(connection_id, &data);
            }
            EventName::SEND_MESSAGE => {
                let _ = self.send_message(connection_id, &data, ack);
            }
            EventName::REQUEST_HISTORY => {
                let _ = self.request_history(connection_id, &data);
            }
            EventName::TYPING => {
                self.set_typing(connection_id, true);
            }
            EventName::STOP_TYPING => {
                self.set_typing(connection_id, false);
            }
            other => {
                tracing::debug!(connection_id, event = other, "unknown event");
                self.outbox.send_to(
                    connection_id,
                    ServerEvent::Error {
                        message: format!("Unknown event: {other}"),
                    },
                );
            }
        }
    }

    /// The transport reported the connection gone. Announces the departure
    /// to everyone else if the connection had authenticated.
    pub fn disconnect(&self, connection_id: &str) -> Option<Session> {
        let mut state = self.state.lock();
        state.connections.remove(connection_id);
        let session = state.sessions.remove(connection_id)?;

        self.outbox.broadcast(
            ServerEvent::UserLeft(SystemNotice::now(&session.pseudo)),
            Some(connection_id),
        );
        self.outbox.broadcast(
            ServerEvent::UsersUpdate(state.sessions.list()),
            Some(connection_id),
        );

        tracing::info!(connection_id, pseudo = %session.pseudo, "user left");
        Some(session)
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    /// `auth:set-pseudo`. On success the connection becomes authenticated,
    /// receives recent history, and everyone gets the new presence list.
    pub fn set_pseudo(&self, connection_id: &str, data: &Value) -> Result<Session, ChatError> {
        let mut state = self.state.lock();
        let result = self.authenticate(&mut state, connection_id, data);

        if let Err(err) = &result {
            if err.is_client_facing() {
                tracing::debug!(connection_id, %err, "authentication rejected");
                self.outbox.send_to(
                    connection_id,
                    ServerEvent::AuthError {
                        message: err.to_string(),
                    },
                );
            }
        }
        result
    }

    fn authenticate(
        &self,
        state: &mut HubState,
        connection_id: &str,
        data: &Value,
    ) -> Result<Session, ChatError> {
        match state.state_of(connection_id) {
            ConnectionState::Unauthenticated => {}
            ConnectionState::Authenticated => {
                return Err(ChatError::Conflict(RejectionReason::AlreadyAuthenticated))
            }
            ConnectionState::Closed => {
                return Err(ChatError::Transport("connection closed".to_string()))
            }
        }

        let raw = serde_json::from_value::<SetPseudoPayload>(data.clone())
            .ok()
            .and_then(|p| p.pseudo)
            .filter(|p| !p.is_empty())
            .ok_or(ChatError::Validation(RejectionReason::MissingPayload(
                "Pseudo",
            )))?;
        let pseudo = validation::validate_pseudo(&raw).map_err(ChatError::Validation)?;
        let session = state
            .sessions
            .register(connection_id, &pseudo)
            .map_err(ChatError::Conflict)?;
        state
            .connections
            .insert(connection_id.to_string(), ConnectionState::Authenticated);

        self.outbox.send_to(
            connection_id,
            ServerEvent::AuthSuccess {
                pseudo: session.pseudo.clone(),
            },
        );
        let recent = state.history.recent(self.limits.history_on_connect);
        if !recent.is_empty() {
            self.outbox
                .send_to(connection_id, ServerEvent::History(recent));
        }
        self.outbox.broadcast(
            ServerEvent::UserJoined(SystemNotice::now(&session.pseudo)),
            Some(connection_id),
        );
        self.outbox
            .broadcast(ServerEvent::UsersUpdate(state.sessions.list()), None);

        tracing::info!(connection_id, pseudo = %session.pseudo, "user joined");
        Ok(session)
    }

    /// `message:send`. The accepted message is stored, acknowledged to the
    /// sender (when `ack` is set), then broadcast to every connection,
    /// sender included.
    pub fn send_message(
        &self,
        connection_id: &str,
        data: &Value,
        ack: Option<u64>,
    ) -> Result<ChatMessage, ChatError> {
        let mut state = self.state.lock();
        let result = self.accept_message(&mut state, connection_id, data);

        match &result {
            Ok(message) => {
                if let Some(ack) = ack {
                    self.outbox.send_to(
                        connection_id,
                        ServerEvent::Ack(Ack {
                            ack,
                            outcome: SendOutcome::Sent {
                                message_id: message.id.clone(),
                                timestamp: message.timestamp,
                            },
                        }),
                    );
                }
                self.outbox
                    .broadcast(ServerEvent::NewMessage(message.clone()), None);
                tracing::debug!(
                    connection_id,
                    message_id = %message.id,
                    pseudo = %message.pseudo,
                    kind = %message.kind,
                    "message accepted"
                );
            }
            Err(err) if err.is_client_facing() => {
                tracing::debug!(connection_id, %err, "message rejected");
                let text = err.to_string();
                self.outbox.send_to(
                    connection_id,
                    ServerEvent::Error {
                        message: text.clone(),
                    },
                );
                if let Some(ack) = ack {
                    self.outbox.send_to(
                        connection_id,
                        ServerEvent::Ack(Ack {
                            ack,
                            outcome: SendOutcome::Error { error: text },
                        }),
                    );
                }
            }
            Err(_) => {}
        }
        result
    }

    fn accept_message(
        &self,
        state: &mut HubState,
        connection_id: &str,
        data: &Value,
    ) -> Result<ChatMessage, ChatError> {
        let pseudo = match state.state_of(connection_id) {
            ConnectionState::Closed => {
                return Err(ChatError::Transport("connection closed".to_string()))
            }
            ConnectionState::Unauthenticated => return Err(ChatError::AuthRequired),
            ConnectionState::Authenticated => state
                .sessions
                .get(connection_id)
                .map(|s| s.pseudo.clone())
                .ok_or(ChatError::AuthRequired)?,
        };

        let payload = serde_json::from_value::<SendMessagePayload>(data.clone()).map_err(|_| {
            ChatError::Validation(RejectionReason::MissingPayload("Message data"))
        })?;
        let validated = validation::validate_message(
            payload.content.as_deref().unwrap_or_default(),
            payload.kind.as_deref().unwrap_or_default(),
            self.limits.max_message_length,
        )
        .map_err(ChatError::Validation)?;

        let message = ChatMessage::new(pseudo, validated.content, validated.kind, connection_id);
        state.history.append(message.clone());
        Ok(message)
    }

    /// `message:request-history`. Replies to the requester only.
    pub fn request_history(
        &self,
        connection_id: &str,
        data: &Value,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let state = self.state.lock();
        match state.state_of(connection_id) {
            ConnectionState::Authenticated => {}
            ConnectionState::Unauthenticated => {
                let err = ChatError::AuthRequired;
                self.outbox.send_to(
                    connection_id,
                    ServerEvent::Error {
                        message: err.to_string(),
                    },
                );
                return Err(err);
            }
            ConnectionState::Closed => {
                return Err(ChatError::Transport("connection closed".to_string()))
            }
        }

        let limit = self.history_page_size(data);
        let messages = state.history.recent(limit);
        self.outbox
            .send_to(connection_id, ServerEvent::MoreHistory(messages.clone()));
        Ok(messages)
    }

    /// Requested page size clamped to `[1, max_history_page]`; missing or
    /// non-numeric limits use the post-auth default.
    fn history_page_size(&self, data: &Value) -> usize {
        let max = self.limits.max_history_page.max(1);
        match requested_history_limit(data) {
            Some(limit) => limit.clamp(1, max as i64) as usize,
            None => self.limits.history_on_connect.clamp(1, max),
        }
    }

    /// `user:typing` / `user:stop-typing`. Others are told only when the flag
    /// actually flips. Returns whether a broadcast went out.
    pub fn set_typing(&self, connection_id: &str, typing: bool) -> bool {
        let mut state = self.state.lock();
        if !state.sessions.set_typing(connection_id, typing) {
            return false;
        }
        let Some(session) = state.sessions.get(connection_id) else {
            return false;
        };
        self.outbox.broadcast(
            ServerEvent::UserTyping {
                pseudo: session.pseudo.clone(),
                is_typing: typing,
            },
            Some(connection_id),
        );
        true
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    pub fn state_of(&self, connection_id: &str) -> ConnectionState {
        self.state.lock().state_of(connection_id)
    }

    /// Number of authenticated users.
    pub fn connected_users(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn users(&self) -> Vec<PresenceEntry> {
        self.state.lock().sessions.list()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Flush any pending history write. Call once on graceful shutdown.
    pub async fn shutdown(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }
}
