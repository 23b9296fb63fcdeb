//! In-process store with the same contract as the remote one.
//!
//! Keeps an operation journal so callers can assert which writes happened
//! and in what order.

use super::{
    ContextStore, MemoryKind, MemoryRecord, MessageRole, NewMessage, StoreError, StoreResult,
    StoredMessage,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A write performed against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    LogMessage { role: MessageRole, content: String },
    InsertMemory { kind: MemoryKind, content: String },
    CompleteGoal { id: String },
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<NewMessage>,
    memory: Vec<MemoryRecord>,
    operations: Vec<StoreOp>,
    next_id: u64,
    last_created: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    search_results: Vec<StoredMessage>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned results returned by `search_messages`.
    pub fn with_search_results(mut self, results: Vec<StoredMessage>) -> Self {
        self.search_results = results;
        self
    }

    /// Make every write fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn operations(&self) -> Vec<StoreOp> {
        self.lock().operations.clone()
    }

    pub fn messages(&self) -> Vec<NewMessage> {
        self.lock().messages.clone()
    }

    pub fn records(&self) -> Vec<MemoryRecord> {
        self.lock().memory.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned journal is still readable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContextStore for InMemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn log_message(&self, message: NewMessage) -> StoreResult<()> {
        self.check_writable()?;
        let mut inner = self.lock();
        inner.operations.push(StoreOp::LogMessage {
            role: message.role,
            content: message.content.clone(),
        });
        inner.messages.push(message);
        Ok(())
    }

    async fn insert_memory(
        &self,
        kind: MemoryKind,
        content: &str,
        deadline: Option<DateTime<Utc>>,
    ) -> StoreResult<MemoryRecord> {
        self.check_writable()?;
        let mut inner = self.lock();
        inner.next_id += 1;

        // Strictly increasing creation times keep recency ordering total
        let now = Utc::now();
        let created_at = match inner.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        inner.last_created = Some(created_at);

        let record = MemoryRecord {
            id: format!("mem-{}", inner.next_id),
            kind,
            content: content.to_string(),
            deadline,
            completed_at: None,
            created_at,
        };
        inner.operations.push(StoreOp::InsertMemory {
            kind,
            content: content.to_string(),
        });
        inner.memory.push(record.clone());
        Ok(record)
    }

    async fn complete_goal(&self, id: &str) -> StoreResult<MemoryRecord> {
        self.check_writable()?;
        let mut inner = self.lock();
        let record = inner
            .memory
            .iter_mut()
            .find(|r| r.id == id && r.kind == MemoryKind::Goal)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.kind = MemoryKind::CompletedGoal;
        record.completed_at = Some(Utc::now());
        let record = record.clone();
        inner.operations.push(StoreOp::CompleteGoal { id: id.to_string() });
        Ok(record)
    }

    async fn list_memory(&self, kind: MemoryKind, limit: usize) -> StoreResult<Vec<MemoryRecord>> {
        let inner = self.lock();
        let mut records: Vec<MemoryRecord> = inner
            .memory
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect();

        if kind == MemoryKind::Goal {
            records.sort_by(|a, b| match (a.deadline, b.deadline) {
                (Some(x), Some(y)) => x.cmp(&y).then(b.created_at.cmp(&a.created_at)),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => b.created_at.cmp(&a.created_at),
            });
        } else {
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        records.truncate(limit);
        Ok(records)
    }

    async fn recent_memory(
        &self,
        kind: MemoryKind,
        limit: usize,
    ) -> StoreResult<Vec<MemoryRecord>> {
        let inner = self.lock();
        let mut records: Vec<MemoryRecord> = inner
            .memory
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn search_messages(&self, _query: &str, limit: usize) -> Vec<StoredMessage> {
        self.search_results.iter().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_goal_ordering() {
        let store = InMemoryStore::new();
        let soon = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        store.insert_memory(MemoryKind::Goal, "no deadline old", None).await.unwrap();
        store.insert_memory(MemoryKind::Goal, "later", Some(later)).await.unwrap();
        store.insert_memory(MemoryKind::Goal, "no deadline new", None).await.unwrap();
        store.insert_memory(MemoryKind::Goal, "soon", Some(soon)).await.unwrap();

        let goals = store.list_memory(MemoryKind::Goal, 10).await.unwrap();
        let names: Vec<&str> = goals.iter().map(|g| g.content.as_str()).collect();
        assert_eq!(names, vec!["soon", "later", "no deadline new", "no deadline old"]);
    }

    #[tokio::test]
    async fn test_recent_goals_newest_first() {
        let store = InMemoryStore::new();
        let soon = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        store.insert_memory(MemoryKind::Goal, "old", Some(soon)).await.unwrap();
        store.insert_memory(MemoryKind::Goal, "new", None).await.unwrap();

        let goals = store.recent_memory(MemoryKind::Goal, 1).await.unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].content, "new");
    }

    #[tokio::test]
    async fn test_complete_goal_mutates_in_place() {
        let store = InMemoryStore::new();
        let goal = store.insert_memory(MemoryKind::Goal, "run 5k", None).await.unwrap();
        let done = store.complete_goal(&goal.id).await.unwrap();

        assert_eq!(done.id, goal.id);
        assert_eq!(done.kind, MemoryKind::CompletedGoal);
        assert!(done.completed_at.is_some());
        assert_eq!(store.records().len(), 1);
        assert!(store.complete_goal(&goal.id).await.is_err());
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let store = InMemoryStore::new();
        store.set_fail_writes(true);
        let result = store
            .log_message(NewMessage::new(MessageRole::User, "hi", "cli"))
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable)));
        assert!(store.operations().is_empty());
    }
}
