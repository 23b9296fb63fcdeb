//! Proactive decision protocol
//!
//! Asks the engine whether to reach out unprompted. The reply must follow a
//! three-line format; anything else is read as "do nothing".

use crate::engine::{Engine, EngineRequest};
use crate::session::Model;
use crate::{HearthError, Result};
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

fn decision_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*(DECISION|MESSAGE|REASON):[ \t]*(.*?)\s*$").unwrap())
}

/// Local-time window in which no proactive message is sent. `start > end`
/// wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    /// Parse `HH:MM` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |text: &str| {
            NaiveTime::parse_from_str(text.trim(), "%H:%M").map_err(|e| {
                HearthError::Config(format!("invalid quiet hours time '{}': {}", text, e))
            })
        };
        Ok(Self {
            start: parse(start)?,
            end: parse(end)?,
        })
    }

    /// `start` is inclusive, `end` exclusive.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }

    /// Whether `now` falls in the window on the wall clock of `tz`.
    pub fn contains_instant(&self, now: DateTime<Utc>, tz: Tz) -> bool {
        self.contains(now.with_timezone(&tz).time())
    }
}

/// Inputs to one decision
#[derive(Debug, Clone, Default)]
pub struct DecisionContext {
    pub user_name: Option<String>,
    /// Current local time, preformatted
    pub local_time: String,
    /// Rendered facts and goals
    pub memory: String,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Parsed decision. `should_act` implies a message is present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decision {
    pub should_act: bool,
    pub message: Option<String>,
    pub reason: String,
}

impl Decision {
    fn no_action(reason: impl Into<String>) -> Self {
        Self {
            should_act: false,
            message: None,
            reason: reason.into(),
        }
    }
}

pub fn build_decision_prompt(context: &DecisionContext, now: DateTime<Utc>) -> String {
    let mut prompt = String::from(
        "You are a personal assistant deciding whether to send the user an unprompted check-in message.\n\
         Only reach out when it is genuinely useful: an approaching deadline, a goal worth a nudge, or a timely follow-up.\n\n",
    );

    if let Some(name) = &context.user_name {
        prompt.push_str(&format!("User: {}\n", name));
    }
    prompt.push_str(&format!("Current time: {}\n", context.local_time));
    match context.last_activity {
        Some(at) => {
            let idle = now.signed_duration_since(at);
            prompt.push_str(&format!(
                "Last conversation: {} hours {} minutes ago\n",
                idle.num_hours(),
                idle.num_minutes() % 60
            ));
        }
        None => prompt.push_str("Last conversation: unknown\n"),
    }
    if !context.memory.trim().is_empty() {
        prompt.push_str(&format!("\n=== Stored Memory ===\n{}\n", context.memory.trim()));
    }

    prompt.push_str(
        "\nRespond with exactly three lines and nothing else:\n\
         DECISION: YES or NO\n\
         MESSAGE: the message to send, or none\n\
         REASON: one short sentence",
    );
    prompt
}

/// Fail-closed parse of a decision reply.
pub fn parse_decision(output: &str) -> Decision {
    let mut decision = None;
    let mut message = None;
    let mut reason = String::new();

    for caps in decision_line_regex().captures_iter(output) {
        let value = caps[2].to_string();
        match caps[1].to_uppercase().as_str() {
            "DECISION" if decision.is_none() => decision = Some(value),
            "MESSAGE" if message.is_none() => message = Some(value),
            "REASON" if reason.is_empty() => reason = value,
            _ => {}
        }
    }

    let Some(decision) = decision else {
        return Decision::no_action("no decision line");
    };
    if decision != "YES" {
        return Decision::no_action(reason);
    }
    match message {
        Some(message) if !message.is_empty() && !message.eq_ignore_ascii_case("none") => Decision {
            should_act: true,
            message: Some(message),
            reason,
        },
        _ => Decision::no_action(reason),
    }
}

/// Runs one decision against the engine
pub struct DecisionProtocol {
    engine: Arc<dyn Engine>,
    working_dir: PathBuf,
    model: Option<Model>,
}

impl DecisionProtocol {
    pub fn new(engine: Arc<dyn Engine>, working_dir: PathBuf) -> Self {
        Self {
            engine,
            working_dir,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    /// Never resumes the conversation; engine failures decide "no".
    pub async fn decide(&self, context: &DecisionContext) -> Decision {
        let mut request =
            EngineRequest::new(build_decision_prompt(context, Utc::now()), &self.working_dir);
        if let Some(model) = self.model {
            request = request.with_model(model);
        }

        let result = self.engine.invoke(request).await;
        if let Some(error) = result.error {
            warn!("Proactive decision failed: {}", error);
            return Decision::no_action(format!("engine error: {}", error));
        }

        let decision = parse_decision(&result.content);
        if decision.should_act {
            info!("Proactive decision: act ({})", decision.reason);
        } else {
            debug!("Proactive decision: wait ({})", decision.reason);
        }
        decision
    }
}
