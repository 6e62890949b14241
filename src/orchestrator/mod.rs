//! Goal Orchestrator
//!
//! Turns goals into active drivers of behaviour:
//! - Decomposes each goal into dependency-ordered steps (once per goal id)
//! - Picks the next unit of work by priority score
//! - Simulates bounded effort per session against a time budget
//! - Tracks step/goal progress and a pursuit-session log
//!
//! The orchestrator never touches the store. Everything it changes is
//! reported back through [`PursuitReport`] and the scheduler persists it.

mod goals;
mod skills;

pub use goals::{Goal, GoalStatus, GoalStep, PursuitSession, StepStatus};
pub use skills::{
    skill_readiness, NoSkillSystem, Skill, SkillProficiencyLookup, SkillRegistry,
    DEFAULT_PROFICIENCY, UNKNOWN_SKILL_PROFICIENCY,
};

use chrono::Utc;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Session log entries kept in memory for statistics
const SESSION_LOG_CAPACITY: usize = 500;

/// Configuration for goal pursuit
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Time budget per active tick
    pub pursuit_budget: Duration,
    /// Simulated time one session consumes from the budget
    pub session_cost: Duration,
    /// Effort applied per session
    pub session_effort: f64,
    /// Step completes once actual effort reaches this share of the estimate
    pub completion_ratio: f64,
    /// Skills below this proficiency get a practice step
    pub skill_gap_threshold: f64,
    /// Attempts before a step is marked Failed
    pub max_attempts: u32,
    /// Hard cap on sessions per `pursue` call
    pub max_sessions_per_pursuit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pursuit_budget: Duration::from_secs(10),
            session_cost: Duration::from_secs(5),
            session_effort: 0.5,
            completion_ratio: 0.8,
            skill_gap_threshold: 0.7,
            max_attempts: 3,
            max_sessions_per_pursuit: 32,
        }
    }
}

/// The next step to work on
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub goal_id: String,
    pub step_id: String,
    pub score: f64,
}

/// Outcome of one `pursue` call
#[derive(Debug, Clone, Default)]
pub struct PursuitReport {
    pub sessions: Vec<PursuitSession>,
    pub steps_completed: usize,
    pub steps_failed: usize,
    /// Goals that reached Completed during this call
    pub goals_completed: Vec<String>,
    /// Goals whose steps or status changed (deduplicated)
    pub touched_goals: Vec<String>,
}

impl PursuitReport {
    pub fn total_progress(&self) -> f64 {
        self.sessions.iter().map(|s| s.progress_delta).sum()
    }

    fn touch(&mut self, goal_id: &str) {
        if !self.touched_goals.iter().any(|g| g == goal_id) {
            self.touched_goals.push(goal_id.to_string());
        }
    }
}

/// Orchestrator statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrchestratorStats {
    pub total_sessions: u64,
    pub steps_completed: u64,
    pub goals_completed: u64,
    pub success_rate: f64,
    pub active_goals: usize,
}

/// Goal orchestrator
pub struct GoalOrchestrator {
    config: OrchestratorConfig,
    skills: Arc<dyn SkillProficiencyLookup>,
    goals: Vec<Goal>,
    steps: HashMap<String, Vec<GoalStep>>,
    sessions: VecDeque<PursuitSession>,
    total_sessions: u64,
    successful_sessions: u64,
    steps_completed: u64,
    goals_completed: u64,
}

impl GoalOrchestrator {
    /// Create an orchestrator without a skill tracker
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_skills(config, Arc::new(NoSkillSystem))
    }

    /// Create with a skill tracker
    pub fn with_skills(config: OrchestratorConfig, skills: Arc<dyn SkillProficiencyLookup>) -> Self {
        Self {
            config,
            skills,
            goals: Vec::new(),
            steps: HashMap::new(),
            sessions: VecDeque::new(),
            total_sessions: 0,
            successful_sessions: 0,
            steps_completed: 0,
            goals_completed: 0,
        }
    }

    /// Restore goals and steps loaded from the store
    ///
    /// Steps must be grouped per goal in their original order.
    pub fn load(&mut self, goals: Vec<Goal>, steps: Vec<GoalStep>) {
        self.goals = goals;
        self.steps.clear();
        for step in steps {
            self.steps.entry(step.goal_id.clone()).or_default().push(step);
        }
        info!(
            "Orchestrator loaded {} goals, {} with steps",
            self.goals.len(),
            self.steps.len()
        );
    }

    /// Register a goal and decompose it. Returns the newly created steps.
    pub fn add_goal(&mut self, goal: Goal) -> Vec<GoalStep> {
        if self.goal(&goal.id).is_some() {
            debug!("Goal {} already registered", goal.id);
            return Vec::new();
        }
        let created = self.decompose_goal(&goal);
        self.goals.push(goal);
        created
    }

    pub fn goal(&self, goal_id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == goal_id)
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn active_goals(&self) -> impl Iterator<Item = &Goal> {
        self.goals.iter().filter(|g| g.status == GoalStatus::Active)
    }

    /// Steps for a goal, in decomposition order
    pub fn steps_for(&self, goal_id: &str) -> &[GoalStep] {
        self.steps.get(goal_id).map(|s| s.as_slice()).unwrap_or(&[])
    }

    /// Recent pursuit sessions (oldest first)
    pub fn sessions(&self) -> impl Iterator<Item = &PursuitSession> {
        self.sessions.iter()
    }

    /// Deterministic step plan for a goal
    ///
    /// Order: knowledge gaps, skill practice (only weak skills), three
    /// execution steps, then a validation step depending on all the others.
    pub fn plan_steps(&self, goal: &Goal) -> Vec<GoalStep> {
        let max_attempts = self.config.max_attempts;
        let mut steps = Vec::new();

        for (i, gap) in goal.knowledge_gaps.iter().enumerate() {
            steps.push(GoalStep::new(
                format!("{}:gap:{}", goal.id, i),
                &goal.id,
                format!("Learn about: {}", gap),
                0.8,
                0.6,
                vec!["research".to_string(), "learning".to_string()],
            ));
        }

        for (i, skill) in goal.required_skills.iter().enumerate() {
            let proficiency = self
                .skills
                .proficiency(skill)
                .unwrap_or(UNKNOWN_SKILL_PROFICIENCY);
            if proficiency < self.config.skill_gap_threshold {
                steps.push(GoalStep::new(
                    format!("{}:skill:{}", goal.id, i),
                    &goal.id,
                    format!("Practice skill: {}", skill),
                    0.7,
                    0.8,
                    vec![skill.clone()],
                ));
            }
        }

        let execution = [
            format!("Begin work on: {}", goal.description),
            format!("Make progress on: {}", goal.description),
            format!("Complete core work on: {}", goal.description),
        ];
        for (i, description) in execution.into_iter().enumerate() {
            steps.push(GoalStep::new(
                format!("{}:exec:{}", goal.id, i),
                &goal.id,
                description,
                0.6 + 0.1 * i as f64,
                0.7,
                goal.required_skills.clone(),
            ));
        }

        let mut validation = GoalStep::new(
            format!("{}:validate", goal.id),
            &goal.id,
            format!("Validate achievement of: {}", goal.description),
            0.9,
            0.3,
            vec!["reflection".to_string(), "evaluation".to_string()],
        );
        validation.dependencies = steps.iter().map(|s| s.id.clone()).collect();
        steps.push(validation);

        for step in &mut steps {
            step.max_attempts = max_attempts;
        }
        steps
    }

    /// Decompose a goal once. Returns the created steps, or nothing if the
    /// goal already has steps.
    pub fn decompose_goal(&mut self, goal: &Goal) -> Vec<GoalStep> {
        if self.steps.contains_key(&goal.id) {
            return Vec::new();
        }
        let steps = self.plan_steps(goal);
        info!("Decomposed goal '{}' into {} steps", goal.description, steps.len());
        self.steps.insert(goal.id.clone(), steps.clone());
        steps
    }

    /// Decompose every active goal that has no steps yet. Returns their ids.
    pub fn decompose_pending(&mut self) -> Vec<String> {
        let pending: Vec<Goal> = self
            .goals
            .iter()
            .filter(|g| g.status == GoalStatus::Active && !self.steps.contains_key(&g.id))
            .cloned()
            .collect();

        pending
            .iter()
            .map(|goal| {
                self.decompose_goal(goal);
                goal.id.clone()
            })
            .collect()
    }

    /// Move a goal to a new status (external pause/abandon). Terminal goals stay put.
    pub fn set_goal_status(&mut self, goal_id: &str, status: GoalStatus) -> Option<&Goal> {
        let goal = self.goals.iter_mut().find(|g| g.id == goal_id)?;
        if goal.status.is_terminal() {
            warn!("Goal {} is {}, ignoring change to {}", goal_id, goal.status.as_str(), status.as_str());
            return Some(goal);
        }
        goal.status = status;
        goal.updated_at = Utc::now();
        Some(goal)
    }

    /// Score a candidate step
    fn score(&self, goal: &Goal, step: &GoalStep) -> f64 {
        let mut score = goal.priority * step.priority;
        if step.status == StepStatus::InProgress {
            score += 0.2;
        }
        score -= step.estimated_effort * 0.1;
        score += skill_readiness(self.skills.as_ref(), &step.required_skills) * 0.3;
        score -= step.attempts as f64 * 0.1;
        score
    }

    /// Highest-scoring eligible step across all active goals
    pub fn select_next_work(&self) -> Option<WorkItem> {
        let mut goals: Vec<&Goal> = self.active_goals().collect();
        goals.sort_by(|a, b| b.priority.total_cmp(&a.priority));

        let mut best: Option<WorkItem> = None;
        for goal in goals {
            let steps = self.steps_for(&goal.id);
            let eligible = steps.iter().filter(|s| {
                s.status.is_open() && s.attempts < s.max_attempts && dependencies_met(s, steps)
            });

            for step in eligible {
                let score = self.score(goal, step);
                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(WorkItem {
                        goal_id: goal.id.clone(),
                        step_id: step.id.clone(),
                        score,
                    });
                }
            }
        }
        best
    }

    /// Apply one bounded session of effort to a step
    ///
    /// Returns None if the step is not eligible (missing, closed, blocked or
    /// its goal is not active).
    pub fn work_on_step(&mut self, goal_id: &str, step_id: &str) -> Option<PursuitSession> {
        if self.goal(goal_id)?.status != GoalStatus::Active {
            return None;
        }

        let steps = self.steps.get_mut(goal_id)?;
        let idx = steps.iter().position(|s| s.id == step_id)?;
        if !steps[idx].status.is_open() || !dependencies_met(&steps[idx], steps) {
            debug!("Step {} is not eligible for work", step_id);
            return None;
        }

        let started_at = Utc::now();
        let effort = self.config.session_effort;
        let readiness = skill_readiness(self.skills.as_ref(), &steps[idx].required_skills);
        let jitter: f64 = rand::thread_rng().gen_range(0.7..=1.0);
        let progress_delta = readiness * effort * jitter;

        let step = &mut steps[idx];
        if step.status == StepStatus::Pending {
            step.status = StepStatus::InProgress;
            step.started_at = Some(started_at);
        }
        step.attempts += 1;
        step.actual_effort += effort;

        let success = step.actual_effort >= step.estimated_effort * self.config.completion_ratio;
        if success {
            step.status = StepStatus::Completed;
            step.completed_at = Some(Utc::now());
            self.steps_completed += 1;
            info!("Step completed: {}", step.description);
        } else if step.attempts >= step.max_attempts {
            step.status = StepStatus::Failed;
            warn!("Step failed after {} attempts: {}", step.attempts, step.description);
        }
        let skills_practiced = step.required_skills.clone();

        for skill in &skills_practiced {
            self.skills.record_practice(skill, progress_delta);
        }

        let total = steps.len();
        let completed = steps.iter().filter(|s| s.status == StepStatus::Completed).count();

        if let Some(goal) = self.goals.iter_mut().find(|g| g.id == goal_id) {
            goal.progress = if total == 0 { 0.0 } else { completed as f64 / total as f64 };
            goal.updated_at = Utc::now();
            if total > 0 && completed == total {
                goal.status = GoalStatus::Completed;
                goal.progress = 1.0;
                self.goals_completed += 1;
                info!("Goal completed: {}", goal.description);
            }
        }

        let session = PursuitSession {
            id: uuid::Uuid::new_v4().to_string(),
            goal_id: goal_id.to_string(),
            step_id: step_id.to_string(),
            started_at,
            ended_at: Utc::now(),
            effort_applied: effort,
            progress_delta,
            skills_practiced,
            success,
        };

        self.total_sessions += 1;
        if success {
            self.successful_sessions += 1;
        }
        if self.sessions.len() >= SESSION_LOG_CAPACITY {
            self.sessions.pop_front();
        }
        self.sessions.push_back(session.clone());

        Some(session)
    }

    /// Work on goals until the budget is spent or nothing is eligible
    pub fn pursue(&mut self, budget: Duration) -> PursuitReport {
        let mut report = PursuitReport::default();
        let cost = self.config.session_cost.max(Duration::from_millis(1));
        let mut spent = Duration::ZERO;

        while spent < budget && report.sessions.len() < self.config.max_sessions_per_pursuit {
            let Some(work) = self.select_next_work() else {
                debug!("No eligible goal work");
                break;
            };
            let Some(session) = self.work_on_step(&work.goal_id, &work.step_id) else {
                break;
            };
            spent += cost;

            report.touch(&work.goal_id);
            if session.success {
                report.steps_completed += 1;
            } else if self
                .steps_for(&work.goal_id)
                .iter()
                .any(|s| s.id == work.step_id && s.status == StepStatus::Failed)
            {
                report.steps_failed += 1;
            }
            if self.goal(&work.goal_id).map(|g| g.status) == Some(GoalStatus::Completed) {
                report.goals_completed.push(work.goal_id.clone());
            }
            report.sessions.push(session);
        }

        report
    }

    /// Orchestrator statistics
    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            total_sessions: self.total_sessions,
            steps_completed: self.steps_completed,
            goals_completed: self.goals_completed,
            success_rate: if self.total_sessions == 0 {
                0.0
            } else {
                self.successful_sessions as f64 / self.total_sessions as f64
            },
            active_goals: self.active_goals().count(),
        }
    }
}

/// All dependencies reference Completed steps
fn dependencies_met(step: &GoalStep, all: &[GoalStep]) -> bool {
    step.dependencies.iter().all(|dep| {
        all.iter()
            .any(|s| &s.id == dep && s.status == StepStatus::Completed)
    })
}
