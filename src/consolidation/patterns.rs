//! Pattern store records and consolidated insights

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recurring theme extracted from recent activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPattern {
    pub id: String,
    pub description: String,
    pub occurrences: u32,
    /// Strength in [0, 1]
    pub strength: f64,
    pub first_seen: DateTime<Utc>,
    /// Last time this pattern was created or strengthened
    pub last_seen: DateTime<Utc>,
    pub related_concepts: Vec<String>,
}

impl MemoryPattern {
    /// New pattern at the given initial strength
    pub fn new(description: &str, strength: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.to_string(),
            occurrences: 1,
            strength: strength.clamp(0.0, 1.0),
            first_seen: now,
            last_seen: now,
            related_concepts: vec![],
        }
    }

    /// Seen again: one more occurrence, stronger, refreshed
    pub fn strengthen(&mut self, step: f64, now: DateTime<Utc>) {
        self.occurrences += 1;
        self.strength = (self.strength + step).min(1.0);
        self.last_seen = now;
    }

    /// Weak and not refreshed within `max_age`
    pub fn is_stale(&self, min_strength: f64, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.strength < min_strength && now - self.last_seen > max_age
    }
}

/// A summary synthesized from a batch of activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedInsight {
    pub timestamp: DateTime<Utc>,
    pub insight: String,
    /// Short excerpts of the activities it came from
    pub source_excerpts: Vec<String>,
    pub confidence: f64,
    /// pattern / principle / strategy / observation
    pub category: String,
    pub applications: Vec<String>,
}
