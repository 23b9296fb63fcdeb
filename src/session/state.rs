//! Persisted session record and its enumerations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Engine capability/cost tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    TierA,
    #[default]
    TierB,
    TierC,
}

impl Model {
    pub fn all() -> &'static [Model] {
        &[Model::TierA, Model::TierB, Model::TierC]
    }

    /// Model alias understood by the engine
    pub fn engine_alias(&self) -> &'static str {
        match self {
            Model::TierA => "opus",
            Model::TierB => "sonnet",
            Model::TierC => "haiku",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Model::TierA => "tier-a",
            Model::TierB => "tier-b",
            Model::TierC => "tier-c",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.engine_alias())
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a" | "tier-a" | "tier_a" | "opus" => Ok(Model::TierA),
            "b" | "tier-b" | "tier_b" | "sonnet" => Ok(Model::TierB),
            "c" | "tier-c" | "tier_c" | "haiku" => Ok(Model::TierC),
            other => Err(format!("unknown model '{}' (expected a, b or c)", other)),
        }
    }
}

/// Tool-use gating mode, enforced by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    #[default]
    Ask,
    AutoEdit,
    PlanFirst,
    Unrestricted,
}

impl PermissionMode {
    pub fn all() -> &'static [PermissionMode] {
        &[
            PermissionMode::Ask,
            PermissionMode::AutoEdit,
            PermissionMode::PlanFirst,
            PermissionMode::Unrestricted,
        ]
    }

    /// Mode name understood by the engine
    pub fn engine_name(&self) -> &'static str {
        match self {
            PermissionMode::Ask => "default",
            PermissionMode::AutoEdit => "acceptEdits",
            PermissionMode::PlanFirst => "plan",
            PermissionMode::Unrestricted => "bypassPermissions",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PermissionMode::Ask => "ask",
            PermissionMode::AutoEdit => "auto-edit",
            PermissionMode::PlanFirst => "plan",
            PermissionMode::Unrestricted => "unrestricted",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ask" | "default" => Ok(PermissionMode::Ask),
            "auto-edit" | "autoedit" | "auto_edit" | "acceptedits" => Ok(PermissionMode::AutoEdit),
            "plan" | "plan-first" | "planfirst" => Ok(PermissionMode::PlanFirst),
            "unrestricted" | "bypass" | "bypasspermissions" => Ok(PermissionMode::Unrestricted),
            other => Err(format!(
                "unknown mode '{}' (expected ask, auto-edit, plan or unrestricted)",
                other
            )),
        }
    }
}

/// How hard the engine is asked to think
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingDepth {
    High,
    #[default]
    Medium,
    Low,
}

impl ThinkingDepth {
    /// Keyword placed in the prompt preamble; `None` leaves the engine default.
    pub fn directive(&self) -> Option<&'static str> {
        match self {
            ThinkingDepth::High => Some("ultrathink"),
            ThinkingDepth::Medium => Some("think hard"),
            ThinkingDepth::Low => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ThinkingDepth::High => "high",
            ThinkingDepth::Medium => "medium",
            ThinkingDepth::Low => "low",
        }
    }
}

impl fmt::Display for ThinkingDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ThinkingDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(ThinkingDepth::High),
            "medium" | "med" => Ok(ThinkingDepth::Medium),
            "low" => Ok(ThinkingDepth::Low),
            other => Err(format!(
                "unknown thinking depth '{}' (expected high, medium or low)",
                other
            )),
        }
    }
}

/// Token counters. Lifetime totals only grow; session counters restart with
/// every newly established continuation token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total_input: u64,
    pub total_output: u64,
    pub session_input: u64,
    pub session_output: u64,
    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
}

/// The single durable session record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Engine session to resume; `None` starts fresh
    pub continuation_token: Option<String>,
    pub model: Model,
    pub permission_mode: PermissionMode,
    pub thinking_depth: ThinkingDepth,
    pub verbose: bool,
    pub token_usage: TokenUsage,
    pub current_project_id: Option<String>,
    pub last_activity_at: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            continuation_token: None,
            model: Model::default(),
            permission_mode: PermissionMode::default(),
            thinking_depth: ThinkingDepth::default(),
            verbose: false,
            token_usage: TokenUsage::default(),
            current_project_id: None,
            last_activity_at: Utc::now(),
        }
    }
}

impl SessionState {
    pub(crate) fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Add usage; when `is_new_session` the session counters restart first.
    pub(crate) fn add_usage(&mut self, input: u64, output: u64, is_new_session: bool) {
        let usage = &mut self.token_usage;
        if is_new_session {
            usage.session_input = 0;
            usage.session_output = 0;
        }
        usage.total_input += input;
        usage.total_output += output;
        usage.session_input += input;
        usage.session_output += output;
        usage.last_updated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_enums() {
        assert_eq!("b".parse::<Model>().unwrap(), Model::TierB);
        assert_eq!("Opus".parse::<Model>().unwrap(), Model::TierA);
        assert!("gpt".parse::<Model>().is_err());
        assert_eq!("auto-edit".parse::<PermissionMode>().unwrap(), PermissionMode::AutoEdit);
        assert_eq!("plan".parse::<PermissionMode>().unwrap(), PermissionMode::PlanFirst);
        assert_eq!("LOW".parse::<ThinkingDepth>().unwrap(), ThinkingDepth::Low);
    }

    #[test]
    fn test_engine_names() {
        assert_eq!(Model::TierC.engine_alias(), "haiku");
        assert_eq!(PermissionMode::Unrestricted.engine_name(), "bypassPermissions");
        assert_eq!(ThinkingDepth::Low.directive(), None);
    }

    #[test]
    fn test_old_files_fill_defaults() {
        let state: SessionState =
            serde_json::from_str(r#"{"continuation_token":"abc","model":"tier_a"}"#).unwrap();
        assert_eq!(state.continuation_token.as_deref(), Some("abc"));
        assert_eq!(state.model, Model::TierA);
        assert_eq!(state.permission_mode, PermissionMode::Ask);
        assert_eq!(state.token_usage, TokenUsage::default());
    }

    #[test]
    fn test_add_usage_resets_session_counters() {
        let mut state = SessionState::default();
        state.add_usage(7, 3, false);
        state.add_usage(100, 50, true);
        state.add_usage(10, 5, false);
        assert_eq!(state.token_usage.session_input, 110);
        assert_eq!(state.token_usage.session_output, 55);
        assert_eq!(state.token_usage.total_input, 117);
        assert_eq!(state.token_usage.total_output, 58);
    }
}
