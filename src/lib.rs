//! Hearth - personal assistant relay
//!
//! Relays chat messages to an external reasoning engine while keeping
//! conversational continuity:
//! - Enriches every request with workspace documents and stored memory
//! - Tracks the engine session, model and token usage across restarts
//! - Applies memory-write intents the engine embeds in its replies
//! - Runs timer-driven proactive check-ins with a fail-closed decision protocol

pub mod commands;
pub mod config;
pub mod engine;
pub mod intents;
pub mod proactive;
pub mod prompt;
pub mod relay;
pub mod session;
pub mod store;
pub mod workspace;

pub use config::HearthConfig;
pub use engine::{Engine, EngineGateway, EngineInvocationResult, EngineRequest};
pub use intents::{MemoryIntent, MemoryIntentProcessor, ProcessedResponse};
pub use proactive::{Decision, DecisionProtocol, QuietHours};
pub use prompt::PromptBuilder;
pub use relay::Relay;
pub use session::{CommitOutcome, InvocationTicket, SessionManager, SessionState};
pub use store::{ContextStore, InMemoryStore, RestStore, StoreError};
pub use workspace::{WorkspaceDocs, WorkspaceLoader};

/// Result type for Hearth operations
pub type Result<T> = std::result::Result<T, HearthError>;

/// Errors that can occur in Hearth
#[derive(Debug, thiserror::Error)]
pub enum HearthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session state error: {0}")]
    Session(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
