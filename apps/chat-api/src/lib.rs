pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod sanitize;
pub mod validation;

use std::sync::Arc;

use config::Config;
use gateway::fanout::ConnectionTable;
use gateway::history::HistoryStore;
use gateway::hub::{ChatHub, HubLimits};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub connections: Arc<ConnectionTable>,
    pub hub: Arc<ChatHub>,
}

impl AppState {
    /// Wire the hub to a fresh connection table around an already-loaded history.
    pub fn new(config: Config, history: HistoryStore) -> Self {
        let connections = Arc::new(ConnectionTable::new());
        let hub = ChatHub::new(HubLimits::from(&config), history, connections.clone());
        Self {
            config: Arc::new(config),
            connections,
            hub: Arc::new(hub),
        }
    }
}
