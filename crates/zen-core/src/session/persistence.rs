//! Conversation persistence
//!
//! The loop writes conversations, messages and tool execution records
//! through [`ConversationStore`]. Two stores ship with the crate: an
//! in-memory one and an append-only JSON-lines one on disk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result, ToolError};
use crate::session::context::Turn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Success,
    Error,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One dispatched tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub id: String,
    pub message_id: Option<String>,
    pub tool_name: String,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub status: ExecutionStatus,
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// A created record that has not reached a terminal status.
/// Finishing consumes it, so it cannot be finished twice.
#[derive(Debug)]
pub struct PendingExecution(ToolExecutionRecord);

impl PendingExecution {
    pub fn new(message_id: Option<String>, tool_name: impl Into<String>, input: Value) -> Self {
        Self(ToolExecutionRecord {
            id: Uuid::new_v4().to_string(),
            message_id,
            tool_name: tool_name.into(),
            input,
            output: None,
            error: None,
            status: ExecutionStatus::Pending,
            duration_ms: None,
            created_at: Utc::now(),
        })
    }

    pub fn record(&self) -> &ToolExecutionRecord {
        &self.0
    }

    pub fn succeed(self, output: Value, duration: Duration) -> ToolExecutionRecord {
        ToolExecutionRecord {
            output: Some(output),
            status: ExecutionStatus::Success,
            duration_ms: Some(duration.as_millis() as u64),
            ..self.0
        }
    }

    pub fn fail(self, error: &ToolError, duration: Duration) -> ToolExecutionRecord {
        ToolExecutionRecord {
            error: Some(error.to_string()),
            status: ExecutionStatus::Error,
            duration_ms: Some(duration.as_millis() as u64),
            ..self.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredConversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    #[serde(flatten)]
    pub turn: Turn,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    fn new(conversation_id: &str, turn: &Turn) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            turn: turn.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Persistence collaborator
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation and return its id
    async fn create_conversation(&self, title: &str) -> Result<String>;

    /// Append a turn and return the new message id
    async fn append_message(&self, conversation_id: &str, turn: &Turn) -> Result<String>;

    /// All turns of a conversation, oldest first
    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Turn>>;

    /// Store a new record in `pending` status
    async fn create_execution_record(&self, record: &ToolExecutionRecord) -> Result<()>;

    /// Move a pending record to its terminal status
    async fn update_execution_record(&self, record: &ToolExecutionRecord) -> Result<()>;
}

fn check_transition(
    id: &str,
    current: Option<ExecutionStatus>,
    next: ExecutionStatus,
) -> Result<()> {
    match current {
        None => Err(Error::Storage(format!("Unknown execution record {}", id))),
        Some(ExecutionStatus::Pending) if next.is_terminal() => Ok(()),
        Some(status) => Err(Error::Storage(format!(
            "Execution record {} cannot move from {:?} to {:?}",
            id, status, next
        ))),
    }
}

#[derive(Default)]
struct MemoryState {
    conversations: Vec<StoredConversation>,
    messages: HashMap<String, Vec<StoredMessage>>,
    executions: Vec<ToolExecutionRecord>,
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversations(&self) -> Vec<StoredConversation> {
        self.state.lock().conversations.clone()
    }

    pub fn messages(&self, conversation_id: &str) -> Vec<StoredMessage> {
        self.state
            .lock()
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Execution records in creation order
    pub fn executions(&self) -> Vec<ToolExecutionRecord> {
        self.state.lock().executions.clone()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, title: &str) -> Result<String> {
        let conversation = StoredConversation {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        let id = conversation.id.clone();
        let mut state = self.state.lock();
        state.messages.insert(id.clone(), Vec::new());
        state.conversations.push(conversation);
        Ok(id)
    }

    async fn append_message(&self, conversation_id: &str, turn: &Turn) -> Result<String> {
        let mut state = self.state.lock();
        let messages = state
            .messages
            .get_mut(conversation_id)
            .ok_or_else(|| Error::Storage(format!("Unknown conversation {}", conversation_id)))?;
        let message = StoredMessage::new(conversation_id, turn);
        let id = message.id.clone();
        messages.push(message);
        Ok(id)
    }

    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        let state = self.state.lock();
        let messages = state
            .messages
            .get(conversation_id)
            .ok_or_else(|| Error::Storage(format!("Unknown conversation {}", conversation_id)))?;
        Ok(messages.iter().map(|m| m.turn.clone()).collect())
    }

    async fn create_execution_record(&self, record: &ToolExecutionRecord) -> Result<()> {
        self.state.lock().executions.push(record.clone());
        Ok(())
    }

    async fn update_execution_record(&self, record: &ToolExecutionRecord) -> Result<()> {
        let mut state = self.state.lock();
        let existing = state.executions.iter_mut().find(|r| r.id == record.id);
        check_transition(&record.id, existing.as_ref().map(|r| r.status), record.status)?;
        if let Some(existing) = existing {
            *existing = record.clone();
        }
        Ok(())
    }
}

/// Append-only JSON-lines store
///
/// Layout under the data directory:
/// - `conversations.jsonl`: one [`StoredConversation`] per line
/// - `messages.jsonl`: one [`StoredMessage`] per line
/// - `executions.jsonl`: one record snapshot per line; the last snapshot
///   for an id is its current state
pub struct JsonlStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
    statuses: Mutex<HashMap<String, ExecutionStatus>>,
    conversation_ids: Mutex<HashSet<String>>,
}

impl JsonlStore {
    const CONVERSATIONS: &'static str = "conversations.jsonl";
    const MESSAGES: &'static str = "messages.jsonl";
    const EXECUTIONS: &'static str = "executions.jsonl";

    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        debug!("Opened JSONL store at {:?}", dir);
        let store = Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
            statuses: Mutex::new(HashMap::new()),
            conversation_ids: Mutex::new(HashSet::new()),
        };
        store.reload_conversation_ids().await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn append_line<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let mut line = serde_json::to_string(value)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut handle = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))
            .await?;
        handle.write_all(line.as_bytes()).await?;
        handle.flush().await?;
        Ok(())
    }

    async fn read_lines<T: for<'de> Deserialize<'de>>(&self, file: &str) -> Result<Vec<T>> {
        let content = match tokio::fs::read_to_string(self.dir.join(file)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(Error::from))
            .collect()
    }

    pub async fn conversations(&self) -> Result<Vec<StoredConversation>> {
        self.read_lines(Self::CONVERSATIONS).await
    }

    /// Current state of every execution record, in creation order
    pub async fn executions(&self) -> Result<Vec<ToolExecutionRecord>> {
        let snapshots: Vec<ToolExecutionRecord> = self.read_lines(Self::EXECUTIONS).await?;
        let mut order = Vec::new();
        let mut latest: HashMap<String, ToolExecutionRecord> = HashMap::new();
        for record in snapshots {
            if !latest.contains_key(&record.id) {
                order.push(record.id.clone());
            }
            latest.insert(record.id.clone(), record);
        }
        Ok(order.into_iter().filter_map(|id| latest.remove(&id)).collect())
    }

    async fn reload_conversation_ids(&self) -> Result<()> {
        let ids: HashSet<String> = self.conversations().await?.into_iter().map(|c| c.id).collect();
        *self.conversation_ids.lock() = ids;
        Ok(())
    }

    /// Known ids are cached; the file is only re-read on a miss, which
    /// picks up conversations written by another handle.
    async fn ensure_conversation(&self, conversation_id: &str) -> Result<()> {
        if self.conversation_ids.lock().contains(conversation_id) {
            return Ok(());
        }
        self.reload_conversation_ids().await?;
        if self.conversation_ids.lock().contains(conversation_id) {
            Ok(())
        } else {
            Err(Error::Storage(format!("Unknown conversation {}", conversation_id)))
        }
    }
}

#[async_trait]
impl ConversationStore for JsonlStore {
    async fn create_conversation(&self, title: &str) -> Result<String> {
        let conversation = StoredConversation {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.append_line(Self::CONVERSATIONS, &conversation).await?;
        self.conversation_ids.lock().insert(conversation.id.clone());
        Ok(conversation.id)
    }

    async fn append_message(&self, conversation_id: &str, turn: &Turn) -> Result<String> {
        self.ensure_conversation(conversation_id).await?;
        let message = StoredMessage::new(conversation_id, turn);
        self.append_line(Self::MESSAGES, &message).await?;
        Ok(message.id)
    }

    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Turn>> {
        self.ensure_conversation(conversation_id).await?;
        let messages: Vec<StoredMessage> = self.read_lines(Self::MESSAGES).await?;
        Ok(messages
            .into_iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.turn)
            .collect())
    }

    async fn create_execution_record(&self, record: &ToolExecutionRecord) -> Result<()> {
        self.append_line(Self::EXECUTIONS, record).await?;
        self.statuses.lock().insert(record.id.clone(), record.status);
        Ok(())
    }

    async fn update_execution_record(&self, record: &ToolExecutionRecord) -> Result<()> {
        let current = self.statuses.lock().get(&record.id).copied();
        check_transition(&record.id, current, record.status)?;
        self.append_line(Self::EXECUTIONS, record).await?;
        self.statuses.lock().insert(record.id.clone(), record.status);
        Ok(())
    }
}
