use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::validation::DEFAULT_MAX_MESSAGE_LENGTH;

/// Chat relay configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Where the recent-message history is persisted as a JSON array.
    pub history_file: PathBuf,
    /// Maximum message length after sanitizing.
    pub max_message_length: usize,
    /// Number of messages the history store retains.
    pub history_capacity: usize,
    /// Messages pushed to a client right after it authenticates.
    pub history_on_connect: usize,
    /// Upper clamp for `message:request-history`.
    pub max_history_page: usize,
    /// Trailing debounce window for history writes.
    pub persist_debounce: Duration,
    /// Insert demo messages when the history is empty at startup.
    pub seed_demo_history: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            history_file: PathBuf::from("data/history.json"),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            history_capacity: 50,
            history_on_connect: 25,
            max_history_page: 100,
            persist_debounce: Duration::from_millis(300),
            seed_demo_history: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; missing or unparseable values fall back to
    /// the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: var_or("PORT", defaults.port),
            history_file: std::env::var("HISTORY_FILE")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.history_file),
            max_message_length: var_or("MAX_MESSAGE_LENGTH", defaults.max_message_length).max(1),
            history_capacity: var_or("HISTORY_CAPACITY", defaults.history_capacity).max(1),
            history_on_connect: var_or("HISTORY_ON_CONNECT", defaults.history_on_connect),
            max_history_page: var_or("MAX_HISTORY_PAGE", defaults.max_history_page).max(1),
            persist_debounce: Duration::from_millis(var_or(
                "PERSIST_DEBOUNCE_MS",
                defaults.persist_debounce.as_millis() as u64,
            )),
            seed_demo_history: var_or("SEED_DEMO_HISTORY", defaults.seed_demo_history),
        }
    }
}

fn var_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
