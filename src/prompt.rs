//! Prompt enrichment
//!
//! Composes the single payload handed to the engine. Sections appear in a
//! fixed order and a section with no content is left out entirely.

use crate::session::ThinkingDepth;
use crate::workspace::WorkspaceDocs;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Teaches the engine the memory tag grammar handled by
/// [`crate::intents::MemoryIntentProcessor`].
pub const MEMORY_INSTRUCTIONS: &str = r#"You can update long-term memory by embedding tags in your reply. Tags are removed before the user sees it.
- [REMEMBER: fact] stores a fact worth keeping
- [GOAL: goal text] or [GOAL: goal text | DEADLINE: date] tracks a goal
- [DONE: part of goal text] marks the matching open goal complete
Use tags sparingly and only for information the user would expect you to keep."#;

/// Builds the enriched prompt for one request
pub struct PromptBuilder<'a> {
    timezone: Tz,
    user_name: Option<&'a str>,
    thinking: ThinkingDepth,
}

impl<'a> PromptBuilder<'a> {
    /// `timezone` is the user's, used for the current-time line.
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            user_name: None,
            thinking: ThinkingDepth::Low,
        }
    }

    pub fn with_user_name(mut self, name: &'a str) -> Self {
        self.user_name = Some(name);
        self
    }

    pub fn with_thinking(mut self, depth: ThinkingDepth) -> Self {
        self.thinking = depth;
        self
    }

    pub fn build(
        &self,
        user_message: &str,
        docs: &WorkspaceDocs,
        store_context: Option<&str>,
        relevant_history: Option<&str>,
    ) -> String {
        self.build_at(Utc::now(), user_message, docs, store_context, relevant_history)
    }

    /// Same as [`PromptBuilder::build`] with an explicit clock.
    pub fn build_at(
        &self,
        now: DateTime<Utc>,
        user_message: &str,
        docs: &WorkspaceDocs,
        store_context: Option<&str>,
        relevant_history: Option<&str>,
    ) -> String {
        let mut sections: Vec<String> = vec![self.preamble(now)];

        if let Some(name) = self.user_name.map(str::trim).filter(|n| !n.is_empty()) {
            sections.push(format!("You are speaking with {}.", name));
        }

        push_section(&mut sections, "Persona", &docs.persona);
        push_section(&mut sections, "Workspace Guide", &docs.guide);
        push_section(&mut sections, "Environment Notes", &docs.environment);
        push_section(&mut sections, "Curated Memory", &docs.memory);
        push_section(&mut sections, "Stored Memory", store_context.unwrap_or_default());
        push_section(
            &mut sections,
            "Relevant Past Messages",
            relevant_history.unwrap_or_default(),
        );
        push_section(&mut sections, "Memory Management", MEMORY_INSTRUCTIONS);

        sections.push(format!("=== User Message ===\n{}", user_message));
        sections.join("\n\n")
    }

    fn preamble(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.timezone);
        let mut preamble = format!(
            "You are a personal assistant relayed through a chat client. Keep replies concise.\nCurrent time: {} ({})",
            local.format("%A, %Y-%m-%d %H:%M %Z"),
            self.timezone.name()
        );
        if let Some(directive) = self.thinking.directive() {
            preamble.push('\n');
            preamble.push_str(directive);
        }
        preamble
    }
}

fn push_section(sections: &mut Vec<String>, title: &str, body: &str) {
    let body = body.trim();
    if !body.is_empty() {
        sections.push(format!("=== {} ===\n{}", title, body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_empty_docs_emit_no_headers() {
        let prompt = PromptBuilder::new(Tz::UTC).build_at(
            fixed_now(),
            "hello",
            &WorkspaceDocs::default(),
            Some("   "),
            None,
        );
        for header in [
            "Persona",
            "Workspace Guide",
            "Environment Notes",
            "Curated Memory",
            "Stored Memory",
            "Relevant Past Messages",
        ] {
            assert!(!prompt.contains(header), "unexpected {} section", header);
        }
        assert!(prompt.contains("=== Memory Management ==="));
        assert!(prompt.ends_with("=== User Message ===\nhello"));
    }

    #[test]
    fn test_section_order() {
        let docs = WorkspaceDocs {
            persona: "P".to_string(),
            guide: "G".to_string(),
            environment: "E".to_string(),
            memory: "M".to_string(),
        };
        let prompt = PromptBuilder::new(Tz::UTC)
            .with_user_name("Sam")
            .build_at(fixed_now(), "hi", &docs, Some("FACTS:\n- x"), Some("[user]: y"));

        let markers = [
            "Current time:",
            "You are speaking with Sam.",
            "=== Persona ===",
            "=== Workspace Guide ===",
            "=== Environment Notes ===",
            "=== Curated Memory ===",
            "=== Stored Memory ===",
            "=== Relevant Past Messages ===",
            "=== Memory Management ===",
            "=== User Message ===",
        ];
        let positions: Vec<usize> = markers
            .iter()
            .map(|m| prompt.find(m).unwrap_or_else(|| panic!("missing {}", m)))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn test_time_follows_daylight_saving() {
        let docs = WorkspaceDocs::default();
        let builder = PromptBuilder::new(chrono_tz::Europe::Berlin);

        let summer = builder.build_at(fixed_now(), "hi", &docs, None, None);
        assert!(summer.contains("Current time: Monday, 2026-10-19 14:30 CEST (Europe/Berlin)"));

        let winter_now = Utc.with_ymd_and_hms(2026, 1, 19, 12, 30, 0).unwrap();
        let winter = builder.build_at(winter_now, "hi", &docs, None, None);
        assert!(winter.contains("Current time: Monday, 2026-01-19 13:30 CET (Europe/Berlin)"));
    }

    #[test]
    fn test_thinking_directive() {
        let docs = WorkspaceDocs::default();
        let high = PromptBuilder::new(Tz::UTC)
            .with_thinking(ThinkingDepth::High)
            .build_at(fixed_now(), "hi", &docs, None, None);
        assert!(high.contains("\nultrathink\n"));

        let low = PromptBuilder::new(Tz::UTC)
            .with_thinking(ThinkingDepth::Low)
            .build_at(fixed_now(), "hi", &docs, None, None);
        assert!(!low.contains("ultrathink"));
        assert!(!low.contains("think hard"));
    }

    #[test]
    fn test_deterministic_for_fixed_clock() {
        let docs = WorkspaceDocs {
            persona: "Warm".to_string(),
            ..Default::default()
        };
        let builder =
            PromptBuilder::new(chrono_tz::America::Chicago).with_thinking(ThinkingDepth::Medium);
        assert_eq!(
            builder.build_at(fixed_now(), "hi", &docs, None, None),
            builder.build_at(fixed_now(), "hi", &docs, None, None)
        );
    }
}
