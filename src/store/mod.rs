//! Context store client
//!
//! Typed access to the remote persistent store: an append-only message log,
//! a typed fact/goal table, a health check and a best-effort semantic search
//! over past messages.

mod context;
mod in_memory;
mod rest;

pub use context::{memory_context, relevant_history};
pub use in_memory::{InMemoryStore, StoreOp};
pub use rest::RestStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a context store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed store response: {0}")]
    Malformed(String),

    #[error("memory record not found: {0}")]
    NotFound(String),

    #[error("store unavailable")]
    Unavailable,
}

/// Author of a logged message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A message to append to the conversation log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub channel: String,
    pub metadata: serde_json::Value,
}

impl NewMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            channel: channel.into(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A message returned by history search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub similarity: Option<f64>,
}

/// Kind of a memory record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Fact,
    Goal,
    CompletedGoal,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Goal => "goal",
            Self::CompletedGoal => "completed_goal",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored fact or goal. Completing a goal mutates `kind` in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    pub content: String,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Remote persistent store used for conversation history and memory.
///
/// Ordering contract for [`ContextStore::list_memory`]:
/// facts newest first; goals by deadline ascending (no deadline last), then
/// newest first.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Cheap read used to classify the store as reachable at startup.
    async fn health_check(&self) -> StoreResult<()>;

    /// Append to the message log.
    async fn log_message(&self, message: NewMessage) -> StoreResult<()>;

    /// Insert a fact or goal and return the stored record.
    async fn insert_memory(
        &self,
        kind: MemoryKind,
        content: &str,
        deadline: Option<DateTime<Utc>>,
    ) -> StoreResult<MemoryRecord>;

    /// Transition a goal to a completed goal in place.
    async fn complete_goal(&self, id: &str) -> StoreResult<MemoryRecord>;

    async fn list_memory(&self, kind: MemoryKind, limit: usize) -> StoreResult<Vec<MemoryRecord>>;

    /// Records of `kind`, newest first regardless of deadline.
    async fn recent_memory(
        &self,
        kind: MemoryKind,
        limit: usize,
    ) -> StoreResult<Vec<MemoryRecord>>;

    /// Nearest-neighbour lookup over past messages. Best-effort: any failure
    /// yields an empty list.
    async fn search_messages(&self, query: &str, limit: usize) -> Vec<StoredMessage>;
}
