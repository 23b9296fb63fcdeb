//! Memory-intent post-processing
//!
//! The engine asks for memory writes by embedding tags in its reply:
//! `[REMEMBER: ...]`, `[GOAL: ... | DEADLINE: ...]` and `[DONE: ...]`.
//! [`MemoryIntentProcessor`] applies them against the store and hands back
//! the reply with every tag removed. Store failures never block the reply.

use crate::store::{ContextStore, MemoryKind, MemoryRecord, StoreError, StoreResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// How many of the newest open goals a DONE tag is matched against
const OPEN_GOAL_SCAN_LIMIT: usize = 100;

fn remember_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[REMEMBER:\s*([^\]]+?)\s*\]").unwrap())
}

fn goal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\[GOAL:\s*([^\]]+?)(?:\s*\|\s*DEADLINE:\s*([^\]]+?))?\s*\]").unwrap()
    })
}

fn done_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[DONE:\s*([^\]]+?)\s*\]").unwrap())
}

/// A memory write requested by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryIntent {
    Remember { content: String },
    Goal { content: String, deadline: Option<String> },
    Done { search: String },
}

impl MemoryIntent {
    fn is_blank(&self) -> bool {
        match self {
            Self::Remember { content } | Self::Goal { content, .. } => content.is_empty(),
            Self::Done { search } => search.is_empty(),
        }
    }
}

/// What a successful write did
#[derive(Debug, Clone, PartialEq)]
pub enum IntentEffect {
    FactStored(MemoryRecord),
    GoalStored(MemoryRecord),
    GoalCompleted(MemoryRecord),
    /// DONE matched no open goal
    NoMatchingGoal,
}

/// Outcome of applying one intent
#[derive(Debug)]
pub struct IntentWrite {
    pub intent: MemoryIntent,
    pub result: StoreResult<IntentEffect>,
}

/// Reply with tags stripped, plus the write outcomes in application order
#[derive(Debug)]
pub struct ProcessedResponse {
    pub text: String,
    pub writes: Vec<IntentWrite>,
}

impl ProcessedResponse {
    pub fn failed_writes(&self) -> usize {
        self.writes.iter().filter(|w| w.result.is_err()).count()
    }
}

/// All tags in `raw`: every REMEMBER, then every GOAL, then every DONE.
/// A tag never spans a closing bracket and blank tags yield nothing.
pub fn parse_intents(raw: &str) -> Vec<MemoryIntent> {
    let remembers = remember_regex()
        .captures_iter(raw)
        .map(|caps| MemoryIntent::Remember {
            content: caps[1].trim().to_string(),
        });
    let goals = goal_regex().captures_iter(raw).map(|caps| MemoryIntent::Goal {
        content: caps[1].trim().to_string(),
        deadline: caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|d| !d.is_empty()),
    });
    let dones = done_regex().captures_iter(raw).map(|caps| MemoryIntent::Done {
        search: caps[1].trim().to_string(),
    });
    remembers
        .chain(goals)
        .chain(dones)
        .filter(|intent| !intent.is_blank())
        .collect()
}

/// Remove every tag and trim.
pub fn strip_intents(raw: &str) -> String {
    let text = remember_regex().replace_all(raw, "");
    let text = goal_regex().replace_all(&text, "");
    let text = done_regex().replace_all(&text, "");
    text.trim().to_string()
}

/// Most recently created open goal whose content contains `search`,
/// ignoring case.
pub fn find_goal_match<'a>(goals: &'a [MemoryRecord], search: &str) -> Option<&'a MemoryRecord> {
    let needle = search.to_lowercase();
    goals
        .iter()
        .filter(|g| g.kind == MemoryKind::Goal)
        .filter(|g| g.content.to_lowercase().contains(&needle))
        .max_by_key(|g| g.created_at)
}

/// Interpret deadline text as RFC 3339, `YYYY-MM-DD HH:MM` or `YYYY-MM-DD`
/// (end of that day), local times in `tz`. A local time skipped by a
/// daylight-saving jump does not parse; an ambiguous one takes the earlier instant.
pub fn parse_deadline(text: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| NaiveTime::from_hms_opt(23, 59, 59).map(|t| date.and_time(t)))
        })?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Applies memory intents against an optional store
pub struct MemoryIntentProcessor {
    store: Option<Arc<dyn ContextStore>>,
    timezone: Tz,
}

impl MemoryIntentProcessor {
    pub fn new(store: Option<Arc<dyn ContextStore>>, timezone: Tz) -> Self {
        Self { store, timezone }
    }

    pub async fn process(&self, raw: &str) -> ProcessedResponse {
        let intents = parse_intents(raw);
        let mut writes = Vec::with_capacity(intents.len());

        for intent in intents {
            let result = match &self.store {
                Some(store) => self.apply(store.as_ref(), &intent).await,
                None => Err(StoreError::Unavailable),
            };
            if let Err(e) = &result {
                warn!("Memory write {:?} failed: {}", intent, e);
            }
            writes.push(IntentWrite { intent, result });
        }

        ProcessedResponse {
            text: strip_intents(raw),
            writes,
        }
    }

    async fn apply(
        &self,
        store: &dyn ContextStore,
        intent: &MemoryIntent,
    ) -> StoreResult<IntentEffect> {
        match intent {
            MemoryIntent::Remember { content } => {
                let record = store.insert_memory(MemoryKind::Fact, content, None).await?;
                info!("Stored fact: {}", content);
                Ok(IntentEffect::FactStored(record))
            }
            MemoryIntent::Goal { content, deadline } => {
                let (content, deadline) = match deadline {
                    Some(text) => match parse_deadline(text, self.timezone) {
                        Some(at) => (content.clone(), Some(at)),
                        None => {
                            debug!("Keeping unparsed deadline in goal text: {}", text);
                            (format!("{} (deadline: {})", content, text), None)
                        }
                    },
                    None => (content.clone(), None),
                };
                let record = store
                    .insert_memory(MemoryKind::Goal, &content, deadline)
                    .await?;
                info!("Stored goal: {}", content);
                Ok(IntentEffect::GoalStored(record))
            }
            MemoryIntent::Done { search } => {
                let goals = store
                    .recent_memory(MemoryKind::Goal, OPEN_GOAL_SCAN_LIMIT)
                    .await?;
                match find_goal_match(&goals, search) {
                    Some(goal) => {
                        let record = store.complete_goal(&goal.id).await?;
                        info!("Completed goal: {}", record.content);
                        Ok(IntentEffect::GoalCompleted(record))
                    }
                    None => {
                        warn!("No open goal matches '{}'", search);
                        Ok(IntentEffect::NoMatchingGoal)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreOp};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn utc() -> Tz {
        Tz::UTC
    }

    fn goal(id: &str, content: &str, minutes_ago: i64) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            kind: MemoryKind::Goal,
            content: content.to_string(),
            deadline: None,
            completed_at: None,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_parse_intents_order_and_case() {
        let intents = parse_intents(
            "[done: taxes] ok [goal: run 5k | deadline: 2026-12-01] [Remember: likes tea]",
        );
        assert_eq!(
            intents,
            vec![
                MemoryIntent::Remember {
                    content: "likes tea".to_string()
                },
                MemoryIntent::Goal {
                    content: "run 5k".to_string(),
                    deadline: Some("2026-12-01".to_string())
                },
                MemoryIntent::Done {
                    search: "taxes".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_goal_without_deadline() {
        assert_eq!(
            parse_intents("[GOAL: learn piano ]"),
            vec![MemoryIntent::Goal {
                content: "learn piano".to_string(),
                deadline: None
            }]
        );
    }

    #[test]
    fn test_strip_intents() {
        assert_eq!(
            strip_intents("Sure! [REMEMBER: call mom tomorrow]"),
            "Sure!".to_string()
        );
        assert_eq!(strip_intents("no tags here"), "no tags here");
    }

    #[test]
    fn test_find_goal_match_prefers_newest() {
        let goals = vec![
            goal("1", "Finish the tax return", 60),
            goal("2", "File TAX extension", 5),
            goal("3", "Walk the dog", 1),
        ];
        assert_eq!(find_goal_match(&goals, "tax").map(|g| g.id.as_str()), Some("2"));
        assert!(find_goal_match(&goals, "piano").is_none());
    }

    #[test]
    fn test_parse_deadline_formats() {
        let berlin = chrono_tz::Europe::Berlin;
        assert_eq!(
            parse_deadline("2026-12-01 09:00", berlin).unwrap().to_rfc3339(),
            "2026-12-01T08:00:00+00:00"
        );
        assert_eq!(
            parse_deadline("2026-07-01 09:00", berlin).unwrap().to_rfc3339(),
            "2026-07-01T07:00:00+00:00"
        );
        // Clocks jump from 02:00 to 03:00
        assert!(parse_deadline("2026-03-29 02:30", berlin).is_none());
        assert_eq!(
            parse_deadline("2026-12-01", utc()).unwrap().to_rfc3339(),
            "2026-12-01T23:59:59+00:00"
        );
        assert!(parse_deadline("2026-12-01T10:00:00Z", utc()).is_some());
        assert!(parse_deadline("next friday", utc()).is_none());
    }

    #[tokio::test]
    async fn test_process_applies_in_order() {
        let store = Arc::new(InMemoryStore::new());
        let processor = MemoryIntentProcessor::new(Some(store.clone()), utc());

        let processed = processor
            .process("[REMEMBER: X][GOAL: Y | DEADLINE: Z][DONE: Y]")
            .await;

        assert_eq!(processed.text, "");
        assert_eq!(processed.failed_writes(), 0);
        let ops = store.operations();
        assert_eq!(ops.len(), 3);
        assert!(matches!(&ops[0], StoreOp::InsertMemory { kind: MemoryKind::Fact, content } if content == "X"));
        assert!(matches!(&ops[1], StoreOp::InsertMemory { kind: MemoryKind::Goal, content } if content == "Y (deadline: Z)"));
        assert!(matches!(&ops[2], StoreOp::CompleteGoal { .. }));
    }

    #[test]
    fn test_blank_tags_yield_nothing() {
        assert!(parse_intents("[DONE: ] [REMEMBER:   ] [GOAL:  ]").is_empty());
        assert_eq!(strip_intents("ok [DONE: ]"), "ok");
    }

    #[test]
    fn test_tags_do_not_span_brackets() {
        let text = "See [REMEMBER:] the docs [link] for details";
        assert!(parse_intents(text).is_empty());
        assert_eq!(strip_intents(text), text);
    }

    #[tokio::test]
    async fn test_blank_done_leaves_goals_open() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_memory(MemoryKind::Goal, "run a marathon", None)
            .await
            .unwrap();
        let processor = MemoryIntentProcessor::new(Some(store.clone()), utc());

        let processed = processor.process("ok [DONE: ]").await;
        assert_eq!(processed.text, "ok");
        assert!(processed.writes.is_empty());
        assert!(!store
            .operations()
            .iter()
            .any(|op| matches!(op, StoreOp::CompleteGoal { .. })));
        assert_eq!(store.records()[0].kind, MemoryKind::Goal);
    }

    #[tokio::test]
    async fn test_done_finds_newest_goal_behind_deadlines() {
        let store = Arc::new(InMemoryStore::new());
        let due = Utc::now() + Duration::days(1);
        for i in 0..OPEN_GOAL_SCAN_LIMIT + 5 {
            store
                .insert_memory(MemoryKind::Goal, &format!("chore {}", i), Some(due))
                .await
                .unwrap();
        }
        let target = store
            .insert_memory(MemoryKind::Goal, "learn the cello", None)
            .await
            .unwrap();
        let processor = MemoryIntentProcessor::new(Some(store.clone()), utc());

        let processed = processor.process("Bravo! [DONE: cello]").await;
        match &processed.writes[0].result {
            Ok(IntentEffect::GoalCompleted(record)) => assert_eq!(record.id, target.id),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_done_without_match_is_noop() {
        let store = Arc::new(InMemoryStore::new());
        let processor = MemoryIntentProcessor::new(Some(store.clone()), utc());

        let processed = processor.process("Nice work. [DONE: marathon]").await;
        assert_eq!(processed.text, "Nice work.");
        assert!(matches!(
            processed.writes[0].result,
            Ok(IntentEffect::NoMatchingGoal)
        ));
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_still_strips() {
        let store = Arc::new(InMemoryStore::new());
        store.set_fail_writes(true);
        let processor = MemoryIntentProcessor::new(Some(store.clone()), utc());

        let processed = processor.process("Noted! [REMEMBER: likes tea]").await;
        assert_eq!(processed.text, "Noted!");
        assert_eq!(processed.failed_writes(), 1);
    }

    #[tokio::test]
    async fn test_without_store() {
        let processor = MemoryIntentProcessor::new(None, utc());
        let processed = processor.process("Ok [GOAL: ship it]").await;
        assert_eq!(processed.text, "Ok");
        assert!(matches!(
            processed.writes[0].result,
            Err(StoreError::Unavailable)
        ));
    }
}
