//! Bounded recent-message history with debounced persistence.
//!
//! The store itself is plain in-memory state owned by the hub. Durability is
//! delegated to a [`HistoryWriter`] task: every append hands it a snapshot,
//! and the task writes only once the stream of snapshots has been quiet for
//! the debounce window (trailing debounce). A burst of messages costs one
//! disk write.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::error::PersistenceError;
use crate::models::message::{ChatMessage, MessageType};

/// Pseudo used for the demo messages seeded into an empty history.
pub const DEMO_PSEUDO: &str = "MiniTalk";
const DEMO_SENDER_ID: &str = "system";

/// Bounded, insertion-ordered buffer of recent messages.
pub struct HistoryStore {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
    writer: Option<HistoryWriter>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
            writer: None,
        }
    }

    /// Attach a writer; later appends schedule debounced persists through it.
    pub fn with_writer(mut self, writer: HistoryWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn writer(&self) -> Option<HistoryWriter> {
        self.writer.clone()
    }

    /// Append a message, evicting the oldest entries beyond capacity.
    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
        self.persist();
    }

    /// The last `min(limit, len)` messages, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ChatMessage> {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages.iter().skip(skip).cloned().collect()
    }

    /// Replace the buffer with the contents of the history file.
    ///
    /// A missing or blank file leaves the store empty and is not an error.
    /// Files holding more than `capacity` entries are cut to the newest ones.
    /// Returns the number of messages loaded.
    pub async fn load_from_durable_storage(&mut self, path: &Path) -> Result<usize, PersistenceError> {
        let loaded = read_history_file(path).await?;
        let skip = loaded.len().saturating_sub(self.capacity);
        self.messages = loaded.into_iter().skip(skip).collect();
        Ok(self.messages.len())
    }

    /// Hand the current buffer to the writer. Calls inside the debounce window
    /// collapse into a single write. No-op without a writer.
    pub fn persist(&self) {
        if let Some(writer) = &self.writer {
            writer.schedule(self.messages.iter().cloned().collect());
        }
    }

    /// Fill an empty store with a few fixed example messages.
    /// Returns `false` (and does nothing) if the store already has content.
    pub fn seed_demo_content(&mut self) -> bool {
        if !self.messages.is_empty() {
            return false;
        }

        let demo = [
            (
                "Welcome to MiniTalk! Pick a pseudo and say hello.",
                MessageType::Normal,
            ),
            (
                "Tag a message as important when it should stand out.",
                MessageType::Important,
            ),
            (
                "Urgent messages are highlighted for everyone. Use them sparingly.",
                MessageType::Urgent,
            ),
        ];
        for (content, kind) in demo {
            self.messages
                .push_back(ChatMessage::new(DEMO_PSEUDO, content, kind, DEMO_SENDER_ID));
        }
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
        self.persist();
        true
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Debounced writer
// ---------------------------------------------------------------------------

enum WriterCommand {
    Persist(Vec<ChatMessage>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background task that owns the history file.
///
/// Cloneable; the task exits once every handle is dropped, writing any
/// pending snapshot first.
#[derive(Clone)]
pub struct HistoryWriter {
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl HistoryWriter {
    /// Spawn the writer task on the current Tokio runtime.
    pub fn spawn(path: PathBuf, debounce: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_writer(path, debounce, rx));
        (Self { tx }, handle)
    }

    /// Queue a snapshot; restarts the debounce timer.
    pub fn schedule(&self, snapshot: Vec<ChatMessage>) {
        if self.tx.send(WriterCommand::Persist(snapshot)).is_err() {
            tracing::warn!("history writer stopped; snapshot dropped");
        }
    }

    /// Write any pending snapshot now and wait for it to hit the disk.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

async fn run_writer(
    path: PathBuf,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
) {
    let mut pending: Option<Vec<ChatMessage>> = None;
    let deadline = time::sleep(debounce);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(WriterCommand::Persist(snapshot)) => {
                    pending = Some(snapshot);
                    deadline.as_mut().reset(Instant::now() + debounce);
                }
                Some(WriterCommand::Flush(done)) => {
                    if let Some(snapshot) = pending.take() {
                        write_logged(&path, &snapshot).await;
                    }
                    let _ = done.send(());
                }
                None => {
                    if let Some(snapshot) = pending.take() {
                        write_logged(&path, &snapshot).await;
                    }
                    break;
                }
            },
            () = &mut deadline, if pending.is_some() => {
                if let Some(snapshot) = pending.take() {
                    write_logged(&path, &snapshot).await;
                }
            }
        }
    }
}

async fn write_logged(path: &Path, messages: &[ChatMessage]) {
    match write_history_file(path, messages).await {
        Ok(()) => tracing::debug!(path = %path.display(), count = messages.len(), "history persisted"),
        Err(err) => tracing::error!(%err, "failed to persist history"),
    }
}

// ---------------------------------------------------------------------------
// File format: a JSON array of messages
// ---------------------------------------------------------------------------

async fn read_history_file(path: &Path) -> Result<Vec<ChatMessage>, PersistenceError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write via a sibling temp file, then rename over the target.
async fn write_history_file(path: &Path, messages: &[ChatMessage]) -> Result<(), PersistenceError> {
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_vec_pretty(messages).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, json).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}
