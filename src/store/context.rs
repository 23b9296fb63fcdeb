//! Store-derived prompt context

use super::{ContextStore, MemoryKind, MemoryRecord};
use tracing::warn;

const FACT_LIMIT: usize = 50;
const GOAL_LIMIT: usize = 20;

/// Render stored facts and open goals for the prompt. Read failures are
/// logged and rendered as absence.
pub async fn memory_context(store: &dyn ContextStore) -> String {
    let (facts, goals) = tokio::join!(
        store.list_memory(MemoryKind::Fact, FACT_LIMIT),
        store.list_memory(MemoryKind::Goal, GOAL_LIMIT),
    );

    let mut context = String::new();

    match facts {
        Ok(facts) if !facts.is_empty() => {
            context.push_str("FACTS:\n");
            for fact in &facts {
                context.push_str(&format!("- {}\n", fact.content));
            }
        }
        Ok(_) => {}
        Err(e) => warn!("Failed to load facts: {}", e),
    }

    match goals {
        Ok(goals) if !goals.is_empty() => {
            if !context.is_empty() {
                context.push('\n');
            }
            context.push_str("GOALS:\n");
            for goal in &goals {
                context.push_str(&format_goal(goal));
                context.push('\n');
            }
        }
        Ok(_) => {}
        Err(e) => warn!("Failed to load goals: {}", e),
    }

    context.trim_end().to_string()
}

/// Render semantically related past messages, most similar first.
pub async fn relevant_history(store: &dyn ContextStore, query: &str, limit: usize) -> String {
    if query.trim().is_empty() {
        return String::new();
    }
    store
        .search_messages(query, limit)
        .await
        .iter()
        .map(|m| format!("[{}]: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_goal(goal: &MemoryRecord) -> String {
    match goal.deadline {
        Some(deadline) => format!("- {} (deadline: {})", goal.content, deadline.format("%Y-%m-%d")),
        None => format!("- {}", goal.content),
    }
}
