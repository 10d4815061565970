//! Outbound delivery: per-connection queues and the broadcast fan-out loop.
//!
//! Each live WebSocket owns one bounded queue. The hub pushes events with
//! `try_send`, so delivery never blocks the event path; a connection whose
//! queue is full simply misses the event (at-most-once, best effort).

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::events::ServerEvent;

/// Per-connection queue depth. Slow readers that fall this far behind drop events.
const OUTBOUND_CAPACITY: usize = 256;

/// An event queued for one connection. Shared so a broadcast is built once.
pub type OutboundFrame = Arc<ServerEvent>;

/// What the hub needs from the transport layer.
pub trait Outbox: Send + Sync {
    /// Deliver an event to one connection. Unknown connections are ignored.
    fn send_to(&self, connection_id: &str, event: ServerEvent);

    /// Deliver an event to every live connection, optionally skipping one.
    fn broadcast(&self, event: ServerEvent, exclude: Option<&str>);
}

/// The live connection set, keyed by connection id.
pub struct ConnectionTable {
    connections: DashMap<String, mpsc::Sender<OutboundFrame>>,
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Add a connection and return the receiving end of its queue.
    pub fn open(&self, connection_id: &str) -> mpsc::Receiver<OutboundFrame> {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        self.connections.insert(connection_id.to_string(), tx);
        rx
    }

    /// Drop a connection's queue. Returns whether it was present.
    pub fn close(&self, connection_id: &str) -> bool {
        self.connections.remove(connection_id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn deliver(connection_id: &str, sender: &mpsc::Sender<OutboundFrame>, frame: OutboundFrame) {
        match sender.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                tracing::warn!(
                    connection_id,
                    event = frame.name(),
                    "outbound queue full; dropping event"
                );
            }
            Err(TrySendError::Closed(_)) => {
                // Connection is shutting down; its entry is about to be removed.
            }
        }
    }
}

impl Outbox for ConnectionTable {
    fn send_to(&self, connection_id: &str, event: ServerEvent) {
        if let Some(sender) = self.connections.get(connection_id) {
            Self::deliver(connection_id, sender.value(), Arc::new(event));
        }
    }

    fn broadcast(&self, event: ServerEvent, exclude: Option<&str>) {
        let frame = Arc::new(event);
        for entry in self.connections.iter() {
            if exclude == Some(entry.key().as_str()) {
                continue;
            }
            Self::deliver(entry.key(), entry.value(), frame.clone());
        }
    }
}
