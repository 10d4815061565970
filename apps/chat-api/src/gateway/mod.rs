//! Real-time chat gateway: WebSocket transport, fan-out, and the protocol hub.

pub mod events;
pub mod fanout;
pub mod history;
pub mod hub;
pub mod registry;
pub mod server;
