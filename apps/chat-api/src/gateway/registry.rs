//! Session registry: live connection → authenticated identity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::validation::RejectionReason;

/// Server-side record binding a live connection to its pseudo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub connection_id: String,
    pub pseudo: String,
    pub joined_at: DateTime<Utc>,
    pub is_typing: bool,
}

/// One row of the `users:update` presence list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub id: String,
    pub pseudo: String,
    pub joined_at: DateTime<Utc>,
}

struct SessionEntry {
    session: Session,
    /// Registration order, used to keep presence lists stable.
    order: u64,
}

/// Registry of authenticated sessions.
///
/// Not synchronised on its own: the hub owns it behind its state lock, so all
/// mutation happens on one path at a time.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, SessionEntry>,
    next_order: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session after a successful `auth:set-pseudo`.
    ///
    /// Fails with `PseudoTaken` if any live session already uses the pseudo,
    /// compared case-insensitively.
    pub fn register(
        &mut self,
        connection_id: &str,
        pseudo: &str,
    ) -> Result<Session, RejectionReason> {
        if self.sessions.contains_key(connection_id) {
            return Err(RejectionReason::AlreadyAuthenticated);
        }
        if self.is_pseudo_taken(pseudo) {
            return Err(RejectionReason::PseudoTaken);
        }

        let session = Session {
            connection_id: connection_id.to_string(),
            pseudo: pseudo.to_string(),
            joined_at: minitalk_common::time::now_millis(),
            is_typing: false,
        };
        let order = self.next_order;
        self.next_order += 1;
        self.sessions.insert(
            connection_id.to_string(),
            SessionEntry {
                session: session.clone(),
                order,
            },
        );
        Ok(session)
    }

    pub fn get(&self, connection_id: &str) -> Option<&Session> {
        self.sessions.get(connection_id).map(|e| &e.session)
    }

    /// Set the typing flag. Returns `true` only if the flag actually changed.
    pub fn set_typing(&mut self, connection_id: &str, typing: bool) -> bool {
        match self.sessions.get_mut(connection_id) {
            Some(entry) if entry.session.is_typing != typing => {
                entry.session.is_typing = typing;
                true
            }
            _ => false,
        }
    }

    /// Remove a session. `None` if the connection never authenticated.
    pub fn remove(&mut self, connection_id: &str) -> Option<Session> {
        self.sessions.remove(connection_id).map(|e| e.session)
    }

    /// Presence list in join order.
    pub fn list(&self) -> Vec<PresenceEntry> {
        let mut entries: Vec<&SessionEntry> = self.sessions.values().collect();
        entries.sort_by_key(|e| e.order);
        entries
            .into_iter()
            .map(|e| PresenceEntry {
                id: e.session.connection_id.clone(),
                pseudo: e.session.pseudo.clone(),
                joined_at: e.session.joined_at,
            })
            .collect()
    }

    pub fn is_pseudo_taken(&self, pseudo: &str) -> bool {
        let wanted = pseudo.to_lowercase();
        self.sessions
            .values()
            .any(|e| e.session.pseudo.to_lowercase() == wanted)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_registry_with_session() -> SessionRegistry {
        let mut registry = SessionRegistry::new();
        registry.register("conn_a", "Alice").unwrap();
        registry
    }

    #[test]
    fn register_and_get_session() {
        let registry = make_registry_with_session();
        let session = registry.get("conn_a").unwrap();
        assert_eq!(session.pseudo, "Alice");
        assert!(!session.is_typing);
        assert!(registry.get("bogus").is_none());
    }

    #[test]
    fn pseudo_uniqueness_is_case_insensitive() {
        let mut registry = make_registry_with_session();
        assert_eq!(
            registry.register("conn_b", "alice"),
            Err(RejectionReason::PseudoTaken)
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn pseudo_is_free_again_after_removal() {
        let mut registry = make_registry_with_session();
        let removed = registry.remove("conn_a").unwrap();
        assert_eq!(removed.pseudo, "Alice");
        assert!(registry.register("conn_b", "ALICE").is_ok());
    }

    #[test]
    fn registering_twice_on_one_connection_is_rejected() {
        let mut registry = make_registry_with_session();
        assert_eq!(
            registry.register("conn_a", "Other"),
            Err(RejectionReason::AlreadyAuthenticated)
        );
    }

    #[test]
    fn set_typing_reports_only_transitions() {
        let mut registry = make_registry_with_session();

        assert!(registry.set_typing("conn_a", true));
        // Already typing; nothing changes.
        assert!(!registry.set_typing("conn_a", true));
        assert!(registry.set_typing("conn_a", false));
        assert!(!registry.set_typing("conn_a", false));
        // Unknown connection never changes anything.
        assert!(!registry.set_typing("bogus", true));
    }

    #[test]
    fn remove_unknown_returns_none() {
        let mut registry = SessionRegistry::new();
        assert!(registry.remove("never_authenticated").is_none());
    }

    #[test]
    fn list_is_in_join_order() {
        let mut registry = SessionRegistry::new();
        for (conn, pseudo) in [("c3", "Carol"), ("c1", "Alice"), ("c2", "Bob")] {
            registry.register(conn, pseudo).unwrap();
        }
        registry.remove("c1");
        registry.register("c4", "Dave").unwrap();

        let pseudos: Vec<String> = registry.list().into_iter().map(|p| p.pseudo).collect();
        assert_eq!(pseudos, vec!["Carol", "Bob", "Dave"]);
    }

    #[test]
    fn presence_entry_uses_wire_names() {
        let registry = make_registry_with_session();
        let json = serde_json::to_value(&registry.list()[0]).unwrap();
        assert_eq!(json["id"], "conn_a");
        assert_eq!(json["pseudo"], "Alice");
        assert!(json["joinedAt"].is_string());
    }
}
