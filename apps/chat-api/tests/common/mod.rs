#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chat_api::config::Config;
use chat_api::gateway::history::{HistoryStore, HistoryWriter};
use chat_api::AppState;

/// How long to wait for an expected frame before failing.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration pointing at a throwaway history file.
pub fn test_config(dir: &Path) -> Config {
    Config {
        port: 0,
        history_file: dir.join("history.json"),
        persist_debounce: Duration::from_millis(50),
        seed_demo_history: false,
        ..Config::default()
    }
}

/// App state without a history writer, for HTTP-only tests.
pub fn test_state() -> AppState {
    let config = Config {
        seed_demo_history: false,
        ..Config::default()
    };
    let history = HistoryStore::new(config.history_capacity);
    AppState::new(config, history)
}

/// A real server on an ephemeral port. Dropping it removes the temp dir.
pub struct TestApp {
    pub addr: SocketAddr,
    pub state: AppState,
    pub dir: TempDir,
}

impl TestApp {
    pub fn history_file(&self) -> std::path::PathBuf {
        self.state.config.history_file.clone()
    }
}

/// Start an actual TCP server for WebSocket testing. The server runs in the background.
pub async fn spawn_app(seed_demo: bool) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path());

    let (writer, _task) = HistoryWriter::spawn(config.history_file.clone(), config.persist_debounce);
    let mut history = HistoryStore::new(config.history_capacity).with_writer(writer);
    if seed_demo {
        history.seed_demo_content();
    }

    let state = AppState::new(config, history);
    let app = chat_api::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { addr, state, dir }
}

/// A WebSocket client speaking the chat protocol.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect and consume the `auth:require-pseudo` greeting.
    pub async fn connect(addr: SocketAddr) -> Self {
        let url = format!("ws://{addr}/ws");
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("ws connect");
        let mut client = Self { ws };

        let greeting = client.recv().await;
        assert_eq!(greeting["event"], "auth:require-pseudo");
        assert!(greeting.get("data").is_none());
        client
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .expect("ws send");
    }

    pub async fn emit(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data });
        self.send_raw(&frame.to_string()).await;
    }

    pub async fn emit_with_ack(&mut self, event: &str, data: Value, ack: u64) {
        let frame = json!({ "event": event, "data": data, "ack": ack });
        self.send_raw(&frame.to_string()).await;
    }

    /// Next raw WebSocket message.
    pub async fn next_message(&mut self) -> Message {
        time::timeout(RECV_TIMEOUT, self.ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error")
    }

    /// Next JSON text frame.
    pub async fn recv(&mut self) -> Value {
        loop {
            match self.next_message().await {
                Message::Text(text) => {
                    return serde_json::from_str(text.as_str()).expect("frame is JSON")
                }
                Message::Close(frame) => panic!("connection closed: {frame:?}"),
                _ => continue,
            }
        }
    }

    /// Receive exactly `names.len()` frames and check their event names in order.
    pub async fn expect_events(&mut self, names: &[&str]) -> Vec<Value> {
        let mut frames = Vec::with_capacity(names.len());
        for name in names {
            let frame = self.recv().await;
            assert_eq!(frame["event"], *name, "unexpected frame: {frame}");
            frames.push(frame);
        }
        frames
    }

    /// Fail if any frame arrives within `wait`.
    pub async fn assert_silent(&mut self, wait: Duration) {
        if let Ok(msg) = time::timeout(wait, self.ws.next()).await {
            panic!("expected no frame, got {msg:?}");
        }
    }

    /// Set a pseudo and consume the frames up to and including `users:update`.
    pub async fn authenticate(&mut self, pseudo: &str) -> Vec<Value> {
        self.emit("auth:set-pseudo", json!({ "pseudo": pseudo })).await;

        let mut frames = Vec::new();
        loop {
            let frame = self.recv().await;
            let done = frame["event"] == "users:update";
            frames.push(frame);
            if done {
                break;
            }
        }
        assert_eq!(frames[0]["event"], "auth:success", "frames: {frames:?}");
        frames
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
