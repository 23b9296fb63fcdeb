//! Relay orchestration
//!
//! Turns one inbound message into one outbound reply: workspace documents
//! and store context are gathered concurrently, the enriched prompt goes to
//! the engine under the session's invocation lock, and the reply is
//! post-processed for memory intents before it is returned.

use crate::commands::{help_text, parse_command, parse_toggle, ParsedCommand, RelayCommand};
use crate::config::HearthConfig;
use crate::engine::{Engine, EngineRequest};
use crate::intents::{strip_intents, MemoryIntentProcessor};
use crate::proactive::{DecisionContext, DecisionProtocol};
use crate::prompt::PromptBuilder;
use crate::session::{
    estimate_tokens, CommitOutcome, Model, PermissionMode, SessionManager, SessionState,
    ThinkingDepth,
};
use crate::store::{memory_context, relevant_history, ContextStore, MessageRole, NewMessage};
use crate::workspace::WorkspaceLoader;
use chrono::Utc;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Past messages pulled into each prompt by semantic search
const RELEVANT_HISTORY_LIMIT: usize = 5;

pub struct Relay {
    config: HearthConfig,
    session: Arc<SessionManager>,
    engine: Arc<dyn Engine>,
    store: Option<Arc<dyn ContextStore>>,
    workspace: WorkspaceLoader,
    intents: MemoryIntentProcessor,
}

impl Relay {
    /// `store` is `None` when memory features are disabled.
    pub fn new(
        config: HearthConfig,
        session: Arc<SessionManager>,
        engine: Arc<dyn Engine>,
        store: Option<Arc<dyn ContextStore>>,
    ) -> Self {
        let workspace = WorkspaceLoader::new(config.workspace_dir.clone());
        let intents = MemoryIntentProcessor::new(store.clone(), config.timezone);
        Self {
            config,
            session,
            engine,
            store,
            workspace,
            intents,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn memory_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Reply to a chat message or slash command.
    pub async fn handle_message(&self, text: &str) -> String {
        self.handle(text, None).await
    }

    /// Reply to an image with an optional caption.
    pub async fn handle_image(&self, caption: &str, image_path: &Path) -> String {
        let caption = if caption.trim().is_empty() {
            "Please look at this image."
        } else {
            caption
        };
        self.handle(caption, Some(image_path)).await
    }

    async fn handle(&self, text: &str, image_path: Option<&Path>) -> String {
        if image_path.is_none() {
            match parse_command(text) {
                Some(ParsedCommand::Known(cmd, args)) => return self.run_command(cmd, &args).await,
                Some(ParsedCommand::Unknown(name)) => {
                    return format!("Unknown command /{}. Try /help", name)
                }
                None => {}
            }
        }

        let (docs, store_context, history) = tokio::join!(
            self.workspace.load(),
            self.memory_context(),
            self.relevant_history(text),
        );

        let metadata = match image_path {
            Some(path) => json!({ "image": path.display().to_string() }),
            None => json!({}),
        };
        self.log(MessageRole::User, text, metadata).await;

        let guard = self.session.lock_invocations().await;
        let ticket = self.session.begin_invocation().await;
        let state = self.session.snapshot().await;

        let mut builder =
            PromptBuilder::new(self.config.timezone).with_thinking(state.thinking_depth);
        if let Some(name) = &self.config.user_name {
            builder = builder.with_user_name(name);
        }
        let prompt = builder.build(
            text,
            &docs,
            Some(store_context.as_str()),
            Some(history.as_str()),
        );

        let mut request = EngineRequest::new(prompt, self.working_dir(&state))
            .with_resume(ticket.continuation_token().map(str::to_string))
            .with_model(state.model)
            .with_permission_mode(state.permission_mode)
            .with_team_mode(self.config.engine.team_mode);
        if let Some(path) = image_path {
            request = request.with_image(path);
        }
        let input_tokens = estimate_tokens(&request.full_prompt());

        let result = self.engine.invoke(request).await;
        if let Some(error) = result.error {
            return format!("Error: {}", error);
        }

        let output_tokens = estimate_tokens(&result.content);
        let outcome = self
            .session
            .commit_invocation(
                &ticket,
                result.continuation_token,
                Some((input_tokens, output_tokens)),
            )
            .await;
        drop(guard);

        let text = match outcome {
            CommitOutcome::Applied { new_session } => {
                if new_session {
                    info!("Engine session established");
                }
                self.intents.process(&result.content).await.text
            }
            CommitOutcome::Superseded => {
                warn!("Reply arrived after the session moved on; memory tags ignored");
                strip_intents(&result.content)
            }
        };
        self.log(MessageRole::Assistant, &text, json!({})).await;

        if state.verbose {
            format!(
                "{}\n\n---\n{} | ~{} in / ~{} out",
                text, state.model, input_tokens, output_tokens
            )
        } else {
            text
        }
    }

    /// Apply one slash command. Invalid arguments leave state untouched.
    pub async fn run_command(&self, cmd: RelayCommand, args: &str) -> String {
        let state = self.session.snapshot().await;
        if cmd.takes_args() && args.is_empty() {
            let current = match cmd {
                RelayCommand::Model => state.model.to_string(),
                RelayCommand::Mode => state.permission_mode.to_string(),
                RelayCommand::Thinking => state.thinking_depth.to_string(),
                RelayCommand::Verbose => on_off(state.verbose).to_string(),
                _ => self.project_label(&state),
            };
            return format!("Current: {}\nUsage: {}", current, cmd.usage());
        }

        match cmd {
            RelayCommand::New => {
                self.session.clear().await;
                "Started a new conversation.".to_string()
            }
            RelayCommand::Model => match args.parse::<Model>() {
                Ok(model) => {
                    self.session.set_model(model).await;
                    format!("Model set to {}", model)
                }
                Err(e) => e,
            },
            RelayCommand::Mode => match args.parse::<PermissionMode>() {
                Ok(mode) => {
                    self.session.set_permission_mode(mode).await;
                    format!("Permission mode set to {}", mode)
                }
                Err(e) => e,
            },
            RelayCommand::Thinking => match args.parse::<ThinkingDepth>() {
                Ok(depth) => {
                    self.session.set_thinking_depth(depth).await;
                    format!("Thinking depth set to {}", depth)
                }
                Err(e) => e,
            },
            RelayCommand::Verbose => match parse_toggle(args) {
                Some(verbose) => {
                    self.session.set_verbose(verbose).await;
                    format!("Verbose {}", on_off(verbose))
                }
                None => format!("Usage: {}", cmd.usage()),
            },
            RelayCommand::Usage => self.session.token_usage_summary().await.to_string(),
            RelayCommand::Status => self.status_report().await,
            RelayCommand::Project => self.switch_project(args).await,
            RelayCommand::Help => help_text(),
        }
    }

    async fn switch_project(&self, id: &str) -> String {
        if id.eq_ignore_ascii_case("none") {
            self.session.set_project(None).await;
            return format!(
                "Project cleared. Working in {}",
                self.config.workspace_dir.display()
            );
        }
        match self.config.project_dir(id) {
            Some(dir) => {
                let message = format!("Switched to project {} ({})", id, dir.display());
                self.session.set_project(Some(id.to_string())).await;
                message
            }
            None => {
                let known: Vec<&str> = self.config.projects.keys().map(String::as_str).collect();
                if known.is_empty() {
                    format!("Unknown project '{}'. No projects are configured.", id)
                } else {
                    format!("Unknown project '{}'. Known: {}", id, known.join(", "))
                }
            }
        }
    }

    pub async fn status_report(&self) -> String {
        let state = self.session.snapshot().await;
        let last_activity = state
            .last_activity_at
            .with_timezone(&self.config.timezone)
            .format("%Y-%m-%d %H:%M");
        format!(
            "Model: {}\nMode: {}\nThinking: {}\nVerbose: {}\nProject: {}\nSession: {}\nMemory: {}\nLast activity: {}",
            state.model,
            state.permission_mode,
            state.thinking_depth,
            on_off(state.verbose),
            self.project_label(&state),
            if state.continuation_token.is_some() { "resuming" } else { "fresh" },
            if self.memory_enabled() { "enabled" } else { "disabled" },
            last_activity,
        )
    }

    fn project_label(&self, state: &SessionState) -> String {
        match &state.current_project_id {
            Some(id) => format!("{} ({})", id, self.working_dir(state).display()),
            None => "none".to_string(),
        }
    }

    /// Current project's directory, else the workspace directory.
    fn working_dir(&self, state: &SessionState) -> PathBuf {
        match state.current_project_id.as_deref() {
            Some(id) => match self.config.project_dir(id) {
                Some(dir) => dir.to_path_buf(),
                None => {
                    warn!("Project '{}' is no longer configured", id);
                    self.config.workspace_dir.clone()
                }
            },
            None => self.config.workspace_dir.clone(),
        }
    }

    /// One proactive cycle. Returns the message to deliver, if any.
    pub async fn check_in(&self) -> Option<String> {
        let now = Utc::now();
        if let Some(quiet) = &self.config.proactive.quiet_hours {
            if quiet.contains_instant(now, self.config.timezone) {
                debug!("Skipping check-in during quiet hours");
                return None;
            }
        }

        let state = self.session.snapshot().await;
        let context = DecisionContext {
            user_name: self.config.user_name.clone(),
            local_time: now
                .with_timezone(&self.config.timezone)
                .format("%A, %Y-%m-%d %H:%M")
                .to_string(),
            memory: self.memory_context().await,
            last_activity: Some(state.last_activity_at),
        };

        let decision = DecisionProtocol::new(self.engine.clone(), self.working_dir(&state))
            .with_model(state.model)
            .decide(&context)
            .await;
        if !decision.should_act {
            return None;
        }

        let message = decision.message?;
        self.log(
            MessageRole::Assistant,
            &message,
            json!({ "proactive": true, "reason": decision.reason }),
        )
        .await;
        Some(message)
    }

    /// Check in every configured interval until `output_tx` closes.
    pub async fn run_proactive(self: Arc<Self>, output_tx: mpsc::Sender<String>) {
        let period = self.config.proactive.interval;
        info!("Proactive check-ins every {} minutes", period.as_secs() / 60);

        let mut ticks = IntervalStream::new(interval_at(Instant::now() + period, period));
        while ticks.next().await.is_some() {
            if let Some(message) = self.check_in().await {
                if output_tx.send(message).await.is_err() {
                    break;
                }
            }
        }
    }

    /// Reply to every inbound line until the input closes. Proactive
    /// messages share `output_tx` when enabled.
    pub async fn run(
        self: Arc<Self>,
        mut input_rx: mpsc::Receiver<String>,
        output_tx: mpsc::Sender<String>,
    ) {
        let proactive = if self.config.proactive.enabled {
            Some(tokio::spawn(self.clone().run_proactive(output_tx.clone())))
        } else {
            None
        };

        while let Some(line) = input_rx.recv().await {
            if line.trim().is_empty() {
                continue;
            }
            let reply = self.handle_message(&line).await;
            if output_tx.send(reply).await.is_err() {
                break;
            }
        }

        if let Some(handle) = proactive {
            handle.abort();
        }
    }

    async fn memory_context(&self) -> String {
        match &self.store {
            Some(store) => memory_context(store.as_ref()).await,
            None => String::new(),
        }
    }

    async fn relevant_history(&self, query: &str) -> String {
        match &self.store {
            Some(store) => relevant_history(store.as_ref(), query, RELEVANT_HISTORY_LIMIT).await,
            None => String::new(),
        }
    }

    async fn log(&self, role: MessageRole, content: &str, metadata: serde_json::Value) {
        let Some(store) = &self.store else {
            return;
        };
        if content.is_empty() {
            return;
        }
        let message = NewMessage::new(role, content, &self.config.channel).with_metadata(metadata);
        if let Err(e) = store.log_message(message).await {
            warn!("Failed to log {} message: {}", role, e);
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
