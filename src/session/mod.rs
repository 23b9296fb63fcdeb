//! Durable session state.
//!
//! One [`SessionManager`] owns the only in-memory [`SessionState`]. Every
//! mutator rewrites the whole record to `{session_file}`; a failed write is
//! logged and the in-memory state stays authoritative until the next
//! successful one.
//!
//! Engine invocations go through a ticket: [`SessionManager::begin_invocation`]
//! captures the token the request resumes from, and
//! [`SessionManager::commit_invocation`] only applies a result when the token
//! is still the one captured and no later-started invocation has committed.

mod state;
mod usage;

pub use state::{Model, PermissionMode, SessionState, ThinkingDepth, TokenUsage};
pub use usage::{estimate_tokens, pricing, ModelPricing, TokenUsageSummary};

use crate::{HearthError, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

/// Captured at invocation start, presented again at commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationTicket {
    seq: u64,
    token_at_start: Option<String>,
}

impl InvocationTicket {
    /// Token the invocation resumes from
    pub fn continuation_token(&self) -> Option<&str> {
        self.token_at_start.as_deref()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Outcome of [`SessionManager::commit_invocation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Token and usage applied; `new_session` when the token changed
    Applied { new_session: bool },
    /// A newer invocation or a reset got there first; result discarded
    Superseded,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    next_seq: u64,
    last_committed_seq: u64,
}

/// Single owner of the session record
#[derive(Debug)]
pub struct SessionManager {
    path: PathBuf,
    inner: RwLock<Inner>,
    /// Serializes token read -> invoke -> token write for the conversation
    invocation_lock: Mutex<()>,
}

impl SessionManager {
    /// Load the session file, or create it with defaults when absent.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let state = if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await?;
            let state: SessionState = serde_json::from_str(&content).map_err(|e| {
                HearthError::Session(format!("corrupt session file {:?}: {}", path, e))
            })?;
            info!(
                "Loaded session state (resuming: {})",
                state.continuation_token.is_some()
            );
            state
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let state = SessionState::default();
            write_state(&path, &state).await?;
            info!("Created session state at {:?}", path);
            state
        };

        Ok(Self {
            path,
            inner: RwLock::new(Inner {
                state,
                next_seq: 1,
                last_committed_seq: 0,
            }),
            invocation_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> SessionState {
        self.inner.read().await.state.clone()
    }

    pub async fn continuation_token(&self) -> Option<String> {
        self.inner.read().await.state.continuation_token.clone()
    }

    /// Hold for the whole read -> invoke -> commit sequence of a turn.
    pub async fn lock_invocations(&self) -> MutexGuard<'_, ()> {
        self.invocation_lock.lock().await
    }

    pub async fn set_continuation_token(&self, token: Option<String>) {
        self.mutate(|state| {
            state.continuation_token = token;
            state.touch();
        })
        .await;
    }

    pub async fn set_project(&self, project_id: Option<String>) {
        self.mutate(|state| state.current_project_id = project_id).await;
    }

    pub async fn set_permission_mode(&self, mode: PermissionMode) {
        self.mutate(|state| state.permission_mode = mode).await;
    }

    pub async fn set_model(&self, model: Model) {
        self.mutate(|state| state.model = model).await;
    }

    pub async fn set_thinking_depth(&self, depth: ThinkingDepth) {
        self.mutate(|state| state.thinking_depth = depth).await;
    }

    pub async fn set_verbose(&self, verbose: bool) {
        self.mutate(|state| state.verbose = verbose).await;
    }

    /// Forget the continuation token so the next turn starts fresh. Lifetime
    /// counters and preferences are kept.
    pub async fn clear(&self) {
        self.mutate(|state| {
            state.continuation_token = None;
            state.touch();
        })
        .await;
        info!("Session cleared");
    }

    /// Update `last_activity_at` only.
    pub async fn touch(&self) {
        self.mutate(SessionState::touch).await;
    }

    pub async fn record_usage(&self, input: u64, output: u64, is_new_session: bool) {
        self.mutate(|state| state.add_usage(input, output, is_new_session))
            .await;
    }

    pub async fn token_usage_summary(&self) -> TokenUsageSummary {
        let inner = self.inner.read().await;
        TokenUsageSummary::from_usage(inner.state.model, &inner.state.token_usage)
    }

    pub async fn last_activity_at(&self) -> DateTime<Utc> {
        self.inner.read().await.state.last_activity_at
    }

    pub async fn begin_invocation(&self) -> InvocationTicket {
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        InvocationTicket {
            seq,
            token_at_start: inner.state.continuation_token.clone(),
        }
    }

    /// Compare-and-swap the continuation token and record usage.
    ///
    /// The result is discarded when the session token no longer equals the
    /// ticket's starting token, or when an invocation that started later has
    /// already committed.
    pub async fn commit_invocation(
        &self,
        ticket: &InvocationTicket,
        token: Option<String>,
        usage: Option<(u64, u64)>,
    ) -> CommitOutcome {
        let mut inner = self.inner.write().await;

        if inner.state.continuation_token != ticket.token_at_start
            || ticket.seq <= inner.last_committed_seq
        {
            info!(
                "Discarding superseded invocation #{} (last committed #{})",
                ticket.seq, inner.last_committed_seq
            );
            return CommitOutcome::Superseded;
        }

        let new_session = token != ticket.token_at_start;
        inner.state.continuation_token = token;
        inner.state.touch();
        if let Some((input, output)) = usage {
            inner.state.add_usage(input, output, new_session);
        }
        inner.last_committed_seq = ticket.seq;
        self.persist(&inner.state).await;

        debug!("Committed invocation #{} (new session: {})", ticket.seq, new_session);
        CommitOutcome::Applied { new_session }
    }

    /// Apply `f` and persist while holding the write lock, so file order
    /// matches mutation order.
    async fn mutate<F>(&self, f: F)
    where
        F: FnOnce(&mut SessionState),
    {
        let mut inner = self.inner.write().await;
        f(&mut inner.state);
        self.persist(&inner.state).await;
    }

    async fn persist(&self, state: &SessionState) {
        if let Err(e) = write_state(&self.path, state).await {
            warn!("Failed to persist session state to {:?}: {}", self.path, e);
        }
    }
}

/// Overwrite the session file wholesale via a sibling temp file.
async fn write_state(path: &Path, state: &SessionState) -> Result<()> {
    let content = serde_json::to_string_pretty(state)?;
    let tmp_path = path.with_extension("json.tmp");
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    drop(file);
    fs::rename(&tmp_path, path).await?;
    Ok(())
}
