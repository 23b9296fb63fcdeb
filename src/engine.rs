//! Subprocess invocation gateway
//!
//! Runs the reasoning engine as a one-shot child process. Each call is
//! independent: arguments come entirely from the [`EngineRequest`], and the
//! continuation token flows back through [`EngineInvocationResult`].

use crate::session::{Model, PermissionMode};
use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Flag the engine sets in children it spawns; nested runs refuse to start
/// while it is present.
const NESTED_SESSION_ENV: &str = "CLAUDECODE";
const TEAM_MODE_ENV: &str = "CLAUDE_CODE_EXPERIMENTAL_AGENT_TEAMS";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

fn session_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^[ \t]*Session ID:[ \t]*(\S+)[ \t]*\r?$").unwrap())
}

/// One engine call
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub prompt: String,
    pub resume: bool,
    pub continuation_token: Option<String>,
    pub model: Option<Model>,
    pub permission_mode: Option<PermissionMode>,
    pub working_dir: PathBuf,
    pub image_path: Option<PathBuf>,
    pub team_mode: bool,
}

impl EngineRequest {
    pub fn new(prompt: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            resume: false,
            continuation_token: None,
            model: None,
            permission_mode: None,
            working_dir: working_dir.into(),
            image_path: None,
            team_mode: false,
        }
    }

    /// Resume `token` when present
    pub fn with_resume(mut self, token: Option<String>) -> Self {
        self.resume = true;
        self.continuation_token = token;
        self
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = Some(mode);
        self
    }

    pub fn with_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    pub fn with_team_mode(mut self, team_mode: bool) -> Self {
        self.team_mode = team_mode;
        self
    }

    /// Prompt as handed to the engine, with any attachment referenced
    pub fn full_prompt(&self) -> String {
        match &self.image_path {
            Some(path) => format!("{}\n\n[Image attached: {}]", self.prompt, path.display()),
            None => self.prompt.clone(),
        }
    }
}

/// Result of one engine call. `error` set means failure and `content` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineInvocationResult {
    pub content: String,
    pub continuation_token: Option<String>,
    pub error: Option<String>,
}

impl EngineInvocationResult {
    pub fn success(content: impl Into<String>, continuation_token: Option<String>) -> Self {
        Self {
            content: content.into(),
            continuation_token,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            continuation_token: None,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Anything that can answer an [`EngineRequest`]
#[async_trait]
pub trait Engine: Send + Sync {
    async fn invoke(&self, request: EngineRequest) -> EngineInvocationResult;
}

/// Argument list for a request, in a fixed order
pub fn build_args(request: &EngineRequest) -> Vec<String> {
    let mut args = vec!["-p".to_string(), request.full_prompt()];

    if request.resume {
        if let Some(token) = &request.continuation_token {
            args.push("--resume".to_string());
            args.push(token.clone());
        }
    }
    if let Some(model) = request.model {
        args.push("--model".to_string());
        args.push(model.engine_alias().to_string());
    }
    if let Some(mode) = request.permission_mode {
        args.push("--mode".to_string());
        args.push(mode.engine_name().to_string());
    }
    args.push("--output-format".to_string());
    args.push("text".to_string());
    if request.team_mode {
        args.push("--teammate-mode".to_string());
        args.push("in-process".to_string());
    }
    args
}

/// Last `Session ID: <token>` marker in the output
pub fn extract_session_id(output: &str) -> Option<String> {
    session_marker_regex()
        .captures_iter(output)
        .last()
        .map(|caps| caps[1].to_string())
}

/// Output with marker lines removed, trimmed
pub fn strip_session_marker(output: &str) -> String {
    session_marker_regex()
        .replace_all(output, "")
        .trim()
        .to_string()
}

/// A freshly reported token wins; otherwise the previous one carries over.
pub fn resolve_token(previous: Option<&str>, extracted: Option<&str>) -> Option<String> {
    extracted.or(previous).map(str::to_string)
}

/// Map a finished child to a result
pub fn interpret_output(
    exit_code: Option<i32>,
    stdout: &str,
    stderr: &str,
    previous_token: Option<&str>,
) -> EngineInvocationResult {
    match exit_code {
        Some(0) => {
            let extracted = extract_session_id(stdout);
            EngineInvocationResult::success(
                strip_session_marker(stdout),
                resolve_token(previous_token, extracted.as_deref()),
            )
        }
        code => {
            let stderr = stderr.trim();
            if !stderr.is_empty() {
                EngineInvocationResult::failure(stderr)
            } else {
                match code {
                    Some(code) => EngineInvocationResult::failure(format!("exited with code {}", code)),
                    None => EngineInvocationResult::failure("terminated by signal"),
                }
            }
        }
    }
}

/// Runs the engine binary
#[derive(Debug, Clone)]
pub struct EngineGateway {
    binary: PathBuf,
    timeout: Duration,
}

impl EngineGateway {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, request: &EngineRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(build_args(request))
            .current_dir(&request.working_dir)
            .env_remove(NESTED_SESSION_ENV)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if request.team_mode {
            cmd.env(TEAM_MODE_ENV, "1");
        } else {
            cmd.env_remove(TEAM_MODE_ENV);
        }
        cmd
    }
}

#[async_trait]
impl Engine for EngineGateway {
    async fn invoke(&self, request: EngineRequest) -> EngineInvocationResult {
        debug!(
            "Invoking engine {:?} (resume: {}, dir: {:?})",
            self.binary,
            request.resume && request.continuation_token.is_some(),
            request.working_dir
        );

        let child = match self.command(&request).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn engine {:?}: {}", self.binary, e);
                return EngineInvocationResult::failure(format!(
                    "failed to start {}: {}",
                    self.binary.display(),
                    e
                ));
            }
        };

        // Dropping the future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Engine I/O failed: {}", e);
                return EngineInvocationResult::failure(format!("engine I/O failed: {}", e));
            }
            Err(_) => {
                warn!("Engine timed out after {:?}", self.timeout);
                return EngineInvocationResult::failure(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let previous = if request.resume {
            request.continuation_token.as_deref()
        } else {
            None
        };
        let result = interpret_output(output.status.code(), &stdout, &stderr, previous);
        if let Some(error) = &result.error {
            warn!("Engine failed: {}", error);
        }
        result
    }
}
