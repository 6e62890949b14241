//! Activity log entries
//!
//! Every thought, override and dream summary is appended as an
//! [`ActivityRecord`]. Records are never mutated; the consolidation engine
//! reads them back most-recent-first in bounded batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::CognitiveState;

/// Category tags written by the scheduler
pub mod category {
    pub const WAKING: &str = "waking";
    pub const PERCEPTION: &str = "perception";
    pub const REFLECTION: &str = "reflection";
    pub const QUESTION: &str = "question";
    pub const PLANNING: &str = "planning";
    pub const INSIGHT: &str = "insight";
    pub const GOAL_PROGRESS: &str = "goal_progress";
    pub const SYSTEM_OVERRIDE: &str = "system_override";
    pub const DREAM_CONSOLIDATION: &str = "dream_consolidation";
}

/// Immutable activity log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Store-assigned row id (None until persisted)
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    /// Free-form category tag (see [`category`])
    pub category: String,
    pub content: String,
    /// Energy level at creation
    pub energy_level: f64,
    /// Scheduler state at creation
    pub state: CognitiveState,
}

impl ActivityRecord {
    pub fn new(category: &str, content: &str, energy_level: f64, state: CognitiveState) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            category: category.to_string(),
            content: content.to_string(),
            energy_level,
            state,
        }
    }

    /// First `max_chars` characters of the content (UTF-8 safe)
    pub fn excerpt(&self, max_chars: usize) -> String {
        self.content.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_is_char_safe() {
        let record = ActivityRecord::new(
            category::REFLECTION,
            "ünïcödé thoughts about recursion",
            0.8,
            CognitiveState::Active,
        );
        assert_eq!(record.excerpt(7), "ünïcödé");
        assert_eq!(record.excerpt(500), record.content);
        assert!(record.id.is_none());
    }
}
