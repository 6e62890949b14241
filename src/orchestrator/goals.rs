//! Goal, step and pursuit-session records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Goal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    /// Goal is active and being worked on
    Active,
    /// Goal is paused/deferred
    Paused,
    /// Goal is completed
    Completed,
    /// Goal was abandoned
    Abandoned,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Paused => "paused",
            GoalStatus::Completed => "completed",
            GoalStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(GoalStatus::Active),
            "paused" => Some(GoalStatus::Paused),
            "completed" => Some(GoalStatus::Completed),
            "abandoned" => Some(GoalStatus::Abandoned),
            _ => None,
        }
    }

    /// Completed and Abandoned goals never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, GoalStatus::Completed | GoalStatus::Abandoned)
    }
}

/// A goal the agent pursues across cycles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub description: String,
    /// Higher = more urgent
    pub priority: f64,
    pub status: GoalStatus,
    /// Completed steps / total steps
    pub progress: f64,
    pub required_skills: Vec<String>,
    pub knowledge_gaps: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    /// Create a new active goal
    pub fn new(description: &str, priority: f64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.to_string(),
            priority,
            status: GoalStatus::Active,
            progress: 0.0,
            required_skills: vec![],
            knowledge_gaps: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_skills(mut self, skills: &[&str]) -> Self {
        self.required_skills = skills.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_knowledge_gaps(mut self, gaps: &[&str]) -> Self {
        self.knowledge_gaps = gaps.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Short format for listings
    pub fn format_short(&self) -> String {
        let status_icon = match self.status {
            GoalStatus::Active => "●",
            GoalStatus::Paused => "○",
            GoalStatus::Completed => "✓",
            GoalStatus::Abandoned => "✗",
        };
        format!("{} {} ({:.0}%)", status_icon, self.description, self.progress * 100.0)
    }
}

/// Step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(StepStatus::Pending),
            "in_progress" => Some(StepStatus::InProgress),
            "completed" => Some(StepStatus::Completed),
            "failed" => Some(StepStatus::Failed),
            _ => None,
        }
    }

    /// Pending or InProgress
    pub fn is_open(&self) -> bool {
        matches!(self, StepStatus::Pending | StepStatus::InProgress)
    }
}

/// Smallest schedulable unit of goal-directed work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalStep {
    pub id: String,
    pub goal_id: String,
    pub description: String,
    pub status: StepStatus,
    pub priority: f64,
    /// Expected effort in [0, 1]
    pub estimated_effort: f64,
    /// Effort applied so far; never decreases
    pub actual_effort: f64,
    pub required_skills: Vec<String>,
    /// Step ids that must be Completed first
    pub dependencies: Vec<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GoalStep {
    pub fn new(
        id: String,
        goal_id: &str,
        description: String,
        priority: f64,
        estimated_effort: f64,
        required_skills: Vec<String>,
    ) -> Self {
        Self {
            id,
            goal_id: goal_id.to_string(),
            description,
            status: StepStatus::Pending,
            priority,
            estimated_effort,
            actual_effort: 0.0,
            required_skills,
            dependencies: vec![],
            attempts: 0,
            max_attempts: 3,
            started_at: None,
            completed_at: None,
        }
    }
}

/// One bounded slice of work on one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PursuitSession {
    pub id: String,
    pub goal_id: String,
    pub step_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub effort_applied: f64,
    pub progress_delta: f64,
    pub skills_practiced: Vec<String>,
    /// True when this session completed the step
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_names() {
        for status in [
            GoalStatus::Active,
            GoalStatus::Paused,
            GoalStatus::Completed,
            GoalStatus::Abandoned,
        ] {
            assert_eq!(GoalStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(StepStatus::parse("IN_PROGRESS"), Some(StepStatus::InProgress));
        assert_eq!(StepStatus::parse("bogus"), None);
    }

    #[test]
    fn test_goal_builder() {
        let goal = Goal::new("Learn category theory", 0.9)
            .with_id("g1")
            .with_skills(&["math"])
            .with_knowledge_gaps(&["functors"]);

        assert_eq!(goal.id, "g1");
        assert_eq!(goal.status, GoalStatus::Active);
        assert_eq!(goal.required_skills, vec!["math"]);
        assert!(goal.format_short().contains("0%"));
        assert!(!goal.status.is_terminal());
    }
}
