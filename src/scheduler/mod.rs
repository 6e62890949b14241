//! Autonomous Cognitive Scheduler
//!
//! Owns the whole loop. Each tick:
//! 1. Apply queued control commands (tick boundary)
//! 2. Decide the next state from energy signals
//! 3. Dispatch: waking thought, active processing + goal pursuit, rest, or dream
//! 4. Persist what changed and publish events
//!
//! One task owns the scheduler and ticks take `&mut self`, so two ticks can
//! never overlap. The only suspension point inside a tick is the text
//! generation call, which always runs under a timeout.

mod control;
mod events;
mod state;

pub use control::{ControlCommand, ControlHandle, ControlOutcome};
pub use events::{EventKind, SchedulerEvent};
pub use state::{CognitiveState, TransitionSignals};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::activity::{category, ActivityRecord};
use crate::consolidation::{ConsolidationConfig, ConsolidationEngine, ConsolidationReport, ConsolidationStats};
use crate::energy::{EnergyState, EnergyThresholds};
use crate::llm::{self, GenerationRequest, TextGenerator};
use crate::orchestrator::{
    Goal, GoalOrchestrator, GoalStatus, OrchestratorConfig, OrchestratorStats, PursuitReport, SkillProficiencyLookup,
};
use crate::store::Persistence;

/// Thought kinds cycled through during active processing
const THOUGHT_ROTATION: [&str; 5] = [
    category::PERCEPTION,
    category::REFLECTION,
    category::QUESTION,
    category::PLANNING,
    category::INSIGHT,
];

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cadence of `run`
    pub tick_interval: Duration,
    /// Save an energy snapshot every N ticks
    pub persist_every: u64,
    /// While resting, dream on ticks divisible by N
    pub dream_every: u64,
    /// Activity records handed to each dream
    pub activity_batch: usize,
    /// Energy consumed per active tick
    pub active_cost: f64,
    /// Energy restored per resting tick
    pub rest_restore: f64,
    /// Energy restored by a dream
    pub dream_restore: f64,
    /// Curiosity gained per active thought
    pub curiosity_gain: f64,
    /// Amount applied by `boost_energy`
    pub boost_amount: f64,
    /// Minimum energy after `force_wake`
    pub force_wake_floor: f64,
    /// Timeout for thought generation
    pub llm_timeout: Duration,
    /// Observer channel capacity
    pub event_capacity: usize,
    /// Control queue capacity
    pub control_capacity: usize,
    pub thresholds: EnergyThresholds,
    pub orchestrator: OrchestratorConfig,
    pub consolidation: ConsolidationConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            persist_every: 5,
            dream_every: 3,
            activity_batch: 10,
            active_cost: 0.05,
            rest_restore: 0.15,
            dream_restore: 0.1,
            curiosity_gain: 0.02,
            boost_amount: 0.2,
            force_wake_floor: 0.5,
            llm_timeout: Duration::from_secs(30),
            event_capacity: 256,
            control_capacity: 32,
            thresholds: EnergyThresholds::default(),
            orchestrator: OrchestratorConfig::default(),
            consolidation: ConsolidationConfig::default(),
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub from: CognitiveState,
    pub to: CognitiveState,
}

impl TickReport {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Scheduler statistics
#[derive(Debug, Clone)]
pub struct SchedulerStats {
    pub state: CognitiveState,
    pub tick: u64,
    pub energy: EnergyState,
    pub thoughts: u64,
    pub dreams: u64,
    /// A write failed and has not been retried successfully yet
    pub degraded: bool,
    /// Goals and patterns waiting to be rewritten
    pub pending_writes: usize,
    pub orchestrator: OrchestratorStats,
    pub consolidation: ConsolidationStats,
}

/// The cognitive scheduler
pub struct CognitiveScheduler {
    config: SchedulerConfig,
    state: CognitiveState,
    energy: EnergyState,
    tick: u64,
    store: Arc<dyn Persistence>,
    generator: Arc<dyn TextGenerator>,
    orchestrator: GoalOrchestrator,
    consolidation: ConsolidationEngine,
    events: broadcast::Sender<SchedulerEvent>,
    control_tx: mpsc::Sender<ControlCommand>,
    control_rx: mpsc::Receiver<ControlCommand>,
    thoughts: u64,
    dreams: u64,
    degraded: bool,
    /// Goals whose rows failed to save
    pending_goals: BTreeSet<String>,
    /// Patterns whose upsert failed
    pending_patterns: BTreeSet<String>,
    /// Pruned pattern ids whose delete failed
    pending_prunes: BTreeSet<String>,
}

impl CognitiveScheduler {
    /// Create a scheduler in `Initializing`
    pub fn new(config: SchedulerConfig, store: Arc<dyn Persistence>, generator: Arc<dyn TextGenerator>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (control_tx, control_rx) = mpsc::channel(config.control_capacity.max(1));
        let orchestrator = GoalOrchestrator::new(config.orchestrator.clone());
        let consolidation = ConsolidationEngine::new(config.consolidation.clone(), generator.clone());

        Self {
            config,
            state: CognitiveState::Initializing,
            energy: EnergyState::default(),
            tick: 0,
            store,
            generator,
            orchestrator,
            consolidation,
            events,
            control_tx,
            control_rx,
            thoughts: 0,
            dreams: 0,
            degraded: false,
            pending_goals: BTreeSet::new(),
            pending_patterns: BTreeSet::new(),
            pending_prunes: BTreeSet::new(),
        }
    }

    /// Attach a skill tracker. Call before `start`.
    pub fn with_skill_system(mut self, skills: Arc<dyn SkillProficiencyLookup>) -> Self {
        self.orchestrator = GoalOrchestrator::with_skills(self.config.orchestrator.clone(), skills);
        self
    }

    pub fn state(&self) -> CognitiveState {
        self.state
    }

    pub fn energy(&self) -> &EnergyState {
        &self.energy
    }

    pub fn orchestrator(&self) -> &GoalOrchestrator {
        &self.orchestrator
    }

    pub fn consolidation(&self) -> &ConsolidationEngine {
        &self.consolidation
    }

    /// New observer. Slow observers lose events instead of stalling ticks.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Handle for queuing control commands
    pub fn control(&self) -> ControlHandle {
        ControlHandle::new(self.control_tx.clone())
    }

    /// Restore durable state and move to `Waking`
    ///
    /// Fails only if the store cannot be read.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != CognitiveState::Initializing {
            warn!("Scheduler already started ({})", self.state);
            return Ok(());
        }

        if let Some(energy) = self
            .store
            .load_latest_energy()
            .context("Failed to load energy snapshot")?
        {
            info!(
                "Restored energy snapshot: energy={:.2} fatigue={:.2}",
                energy.energy, energy.fatigue
            );
            self.energy = energy;
        }

        let goals = self.store.load_goals().context("Failed to load goals")?;
        let steps = self.store.load_steps().context("Failed to load goal steps")?;
        self.orchestrator.load(goals, steps);

        let patterns = self.store.load_patterns().context("Failed to load memory patterns")?;
        self.consolidation.load(patterns);

        for goal_id in self.orchestrator.decompose_pending() {
            self.persist_goal(&goal_id);
        }

        info!("Cognitive scheduler started with {} generator", self.generator.name());
        self.transition(CognitiveState::Waking);
        Ok(())
    }

    /// Register, decompose and persist a new goal
    pub fn add_goal(&mut self, goal: Goal) {
        let goal_id = goal.id.clone();
        info!("Adding goal: {}", goal.description);
        self.orchestrator.add_goal(goal);
        self.persist_goal(&goal_id);
    }

    /// Pause, resume or abandon a goal. False if the goal is unknown.
    pub fn set_goal_status(&mut self, goal_id: &str, status: GoalStatus) -> bool {
        if self.orchestrator.set_goal_status(goal_id, status).is_none() {
            return false;
        }
        self.persist_goal(goal_id);
        true
    }

    /// One decide, dispatch, persist, emit cycle. None once shut down.
    pub async fn tick(&mut self) -> Option<TickReport> {
        if self.state.is_terminal() {
            return None;
        }
        self.drain_control();

        self.tick += 1;
        let from = self.state;
        let mut signals = TransitionSignals {
            needs_rest: self.energy.needs_rest(&self.config.thresholds),
            can_wake: self.energy.can_wake(&self.config.thresholds),
            dream_due: self.config.dream_every > 0 && self.tick % self.config.dream_every == 0,
        };

        match from {
            CognitiveState::Waking => self.waking_thought().await,
            CognitiveState::Active if !signals.needs_rest => self.active_processing().await,
            CognitiveState::Resting if !signals.can_wake => {
                self.energy.restore(self.config.rest_restore);
            }
            CognitiveState::Dreaming => {
                self.dream().await;
                signals.can_wake = self.energy.can_wake(&self.config.thresholds);
            }
            _ => {}
        }

        let to = from.next(signals);
        self.transition(to);

        if self.config.persist_every > 0 && self.tick % self.config.persist_every == 0 {
            self.checkpoint();
        }

        self.emit(SchedulerEvent::metrics(self.state, &self.energy, self.tick));
        debug!(
            "Tick {}: {} -> {} (energy={:.2} fatigue={:.2})",
            self.tick, from, to, self.energy.energy, self.energy.fatigue
        );

        Some(TickReport { tick: self.tick, from, to })
    }

    /// Flush the final snapshot and shut down. Later control commands are
    /// refused at the handle.
    pub fn stop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.checkpoint();
        self.control_rx.close();
        self.transition(CognitiveState::Shutdown);
        info!("Cognitive scheduler stopped after {} ticks", self.tick);
    }

    /// Tick on the configured cadence until `shutdown` flips to true
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.state == CognitiveState::Initializing {
            self.start().await?;
        }

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Scheduler loop running every {:?}", self.config.tick_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.tick().await.is_none() {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler shutting down");
                        break;
                    }
                }
            }
        }

        self.stop();
        Ok(())
    }

    /// Apply one control command
    pub fn apply_control(&mut self, command: ControlCommand) -> ControlOutcome {
        let from = self.state;
        let Some(to) = command.target(from) else {
            info!("Ignoring {} while {}", command.as_str(), from);
            return ControlOutcome::Ignored { command, state: from };
        };

        match command {
            ControlCommand::BoostEnergy => self.energy.boost(self.config.boost_amount),
            ControlCommand::ForceWake => self.energy.ensure_energy_at_least(self.config.force_wake_floor),
            ControlCommand::ForceRest | ControlCommand::TriggerDream => {}
        }
        self.transition(to);

        let content = format!("Control override: {} ({} -> {})", command.as_str(), from, to);
        info!("{}", content);
        self.record_activity(category::SYSTEM_OVERRIDE, &content);
        self.emit(SchedulerEvent::thought(category::SYSTEM_OVERRIDE, &content, self.state));

        ControlOutcome::Applied { command, from, to }
    }

    /// Scheduler statistics
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            state: self.state,
            tick: self.tick,
            energy: self.energy.clone(),
            thoughts: self.thoughts,
            dreams: self.dreams,
            degraded: self.degraded,
            pending_writes: self.pending_goals.len() + self.pending_patterns.len() + self.pending_prunes.len(),
            orchestrator: self.orchestrator.stats(),
            consolidation: self.consolidation.stats(),
        }
    }

    fn drain_control(&mut self) {
        while let Ok(command) = self.control_rx.try_recv() {
            self.apply_control(command);
        }
    }

    fn transition(&mut self, to: CognitiveState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!("State: {} -> {}", from, to);
        self.emit(SchedulerEvent::state_change(from, to, self.tick));
    }

    /// Best-effort publish
    fn emit(&self, event: SchedulerEvent) {
        let _ = self.events.send(event);
    }

    fn energy_readout(&self) -> String {
        format!(
            "Energy: {:.2}, Fatigue: {:.2}, Curiosity: {:.2}",
            self.energy.energy, self.energy.fatigue, self.energy.curiosity
        )
    }

    async fn think(&mut self, kind: &str, prompt: String, temperature: f32, max_tokens: u32) {
        let request = GenerationRequest::new(prompt, temperature, max_tokens);
        let generated =
            llm::generate_or_placeholder(self.generator.as_ref(), &request, self.config.llm_timeout).await;

        self.thoughts += 1;
        self.record_activity(kind, &generated.text);
        self.emit(SchedulerEvent::thought(kind, &generated.text, self.state));
    }

    async fn waking_thought(&mut self) {
        let prompt = format!(
            "You are waking up from rest. {}\n\n\
            Generate a brief waking thought: what are you noticing as you become aware? \
            Keep it to one or two sentences.",
            self.energy_readout()
        );
        self.think(category::WAKING, prompt, 0.7, 150).await;
    }

    async fn active_processing(&mut self) {
        let kind = THOUGHT_ROTATION[(self.tick % THOUGHT_ROTATION.len() as u64) as usize];
        let focus = match kind {
            category::PERCEPTION => "Notice something about your current situation.",
            category::REFLECTION => "Reflect on something you recently experienced.",
            category::QUESTION => "Ask yourself a question you are curious about.",
            category::PLANNING => "Plan what you want to explore next.",
            _ => "Share an insight that connects your recent thoughts.",
        };
        let goals = self
            .orchestrator
            .active_goals()
            .take(3)
            .map(|g| g.format_short())
            .collect::<Vec<_>>();
        let goal_context = if goals.is_empty() {
            String::new()
        } else {
            format!("\nCurrent goals:\n{}\n", goals.join("\n"))
        };
        let prompt = format!(
            "You are thinking autonomously. {}\n{}\n{} Keep it to two or three sentences.",
            self.energy_readout(),
            goal_context,
            focus
        );
        self.think(kind, prompt, 0.8, 200).await;

        let report = self.orchestrator.pursue(self.config.orchestrator.pursuit_budget);
        self.persist_pursuit(&report);

        self.energy.consume(self.config.active_cost);
        self.energy.stimulate_curiosity(self.config.curiosity_gain);
    }

    async fn dream(&mut self) {
        let batch = match self.store.recent_activities(self.config.activity_batch) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Failed to read activity for consolidation: {:#}", e);
                self.degraded = true;
                Vec::new()
            }
        };

        let report = self.consolidation.consolidate(&batch, Utc::now()).await;
        self.persist_consolidation(&report);

        let summary = format!(
            "Dream consolidated {} records: {} patterns ({} new, {} strengthened), {} pruned{}",
            report.records_considered,
            report.patterns_found,
            report.patterns_created,
            report.patterns_strengthened,
            report.patterns_pruned(),
            report
                .insight
                .as_ref()
                .map(|i| format!(". Insight: {}", i.insight))
                .unwrap_or_default()
        );
        self.record_activity(category::DREAM_CONSOLIDATION, &summary);
        self.emit(SchedulerEvent::new(
            EventKind::Consolidation,
            json!({
                "records": report.records_considered,
                "patterns_found": report.patterns_found,
                "patterns_created": report.patterns_created,
                "patterns_strengthened": report.patterns_strengthened,
                "patterns_pruned": report.patterns_pruned(),
                "insight": report.insight.as_ref().map(|i| i.insight.clone()),
                "degraded": report.degraded,
            }),
        ));

        self.energy.restore(self.config.dream_restore);
        self.energy.reset_rest_counter(Utc::now());
        self.dreams += 1;
        self.checkpoint();
    }

    /// Log a persistence failure and enter degraded mode
    fn note_failure(&mut self, what: &str, error: anyhow::Error) {
        warn!("Failed to persist {}: {:#}", what, error);
        self.degraded = true;
    }

    fn record_activity(&mut self, kind: &str, content: &str) {
        let record = ActivityRecord::new(kind, content, self.energy.energy, self.state);
        if let Err(e) = self.store.append_activity(&record) {
            self.note_failure("activity", e);
        }
    }

    /// Retry failed goal and pattern writes, then save an energy snapshot.
    /// Degraded mode clears only once nothing is left pending.
    fn checkpoint(&mut self) {
        self.flush_pending();
        let saved = match self.store.save_energy(&self.energy) {
            Ok(()) => true,
            Err(e) => {
                self.note_failure("energy snapshot", e);
                false
            }
        };

        let pending = self.pending_goals.len() + self.pending_patterns.len() + self.pending_prunes.len();
        if saved && pending == 0 {
            if self.degraded {
                info!("Persistence recovered");
            }
            self.degraded = false;
        } else if pending > 0 {
            debug!("{} writes still pending", pending);
        }
    }

    fn flush_pending(&mut self) {
        for goal_id in std::mem::take(&mut self.pending_goals) {
            self.persist_goal(&goal_id);
        }

        for pattern_id in std::mem::take(&mut self.pending_patterns) {
            let Some(pattern) = self.consolidation.patterns().iter().find(|p| p.id == pattern_id).cloned() else {
                continue;
            };
            if let Err(e) = self.store.upsert_pattern(&pattern) {
                self.note_failure("memory pattern", e);
                self.pending_patterns.insert(pattern_id);
            }
        }

        if !self.pending_prunes.is_empty() {
            let ids: Vec<String> = self.pending_prunes.iter().cloned().collect();
            match self.store.delete_patterns(&ids) {
                Ok(_) => self.pending_prunes.clear(),
                Err(e) => self.note_failure("pattern pruning", e),
            }
        }
    }

    fn write_goal(&self, goal_id: &str) -> Result<()> {
        let Some(goal) = self.orchestrator.goal(goal_id) else {
            return Ok(());
        };
        self.store.upsert_goal(goal)?;
        let steps = self.orchestrator.steps_for(goal_id);
        if !steps.is_empty() {
            self.store.upsert_steps(steps)?;
        }
        Ok(())
    }

    /// Write a goal with its steps, queuing it for retry on failure
    fn persist_goal(&mut self, goal_id: &str) {
        match self.write_goal(goal_id) {
            Ok(()) => {
                self.pending_goals.remove(goal_id);
            }
            Err(e) => {
                self.note_failure("goal", e);
                self.pending_goals.insert(goal_id.to_string());
            }
        }
    }

    fn persist_pursuit(&mut self, report: &PursuitReport) {
        for session in &report.sessions {
            if let Err(e) = self.store.append_session(session) {
                self.note_failure("pursuit session", e);
            }
        }
        for goal_id in &report.touched_goals {
            self.persist_goal(goal_id);
        }
        if !report.sessions.is_empty() {
            let content = format!(
                "Goal pursuit: {} sessions, {} steps completed, {} goals completed",
                report.sessions.len(),
                report.steps_completed,
                report.goals_completed.len()
            );
            self.record_activity(category::GOAL_PROGRESS, &content);
        }
    }

    fn persist_consolidation(&mut self, report: &ConsolidationReport) {
        for pattern in &report.changed {
            match self.store.upsert_pattern(pattern) {
                Ok(()) => {
                    self.pending_patterns.remove(&pattern.id);
                }
                Err(e) => {
                    self.note_failure("memory pattern", e);
                    self.pending_patterns.insert(pattern.id.clone());
                }
            }
        }
        if !report.pruned.is_empty() {
            for id in &report.pruned {
                self.pending_patterns.remove(id);
            }
            if let Err(e) = self.store.delete_patterns(&report.pruned) {
                self.note_failure("pattern pruning", e);
                self.pending_prunes.extend(report.pruned.iter().cloned());
            }
        }
        if let Some(insight) = &report.insight {
            if let Err(e) = self.store.append_insight(insight) {
                self.note_failure("insight", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidation::{ConsolidatedInsight, MemoryPattern};
    use crate::llm::OfflineGenerator;
    use crate::orchestrator::{GoalStep, PursuitSession};
    use crate::store::SqliteStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn scheduler() -> CognitiveScheduler {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        CognitiveScheduler::new(SchedulerConfig::default(), store, Arc::new(OfflineGenerator))
    }

    #[tokio::test]
    async fn test_start_moves_to_waking() {
        let mut s = scheduler();
        assert_eq!(s.state(), CognitiveState::Initializing);
        s.start().await.unwrap();
        assert_eq!(s.state(), CognitiveState::Waking);

        let report = s.tick().await.unwrap();
        assert_eq!(report.from, CognitiveState::Waking);
        assert_eq!(report.to, CognitiveState::Active);
        assert_eq!(s.stats().thoughts, 1);
    }

    #[tokio::test]
    async fn test_tired_active_goes_to_rest() {
        let mut s = scheduler();
        s.state = CognitiveState::Active;
        s.energy = EnergyState::with_levels(0.25, 0.75);

        assert_eq!(s.tick().await.unwrap().to, CognitiveState::Tiring);
        assert_eq!(s.tick().await.unwrap().to, CognitiveState::Resting);
        // No active processing happened
        assert_eq!(s.energy().energy, 0.25);
    }

    #[tokio::test]
    async fn test_active_tick_consumes_energy() {
        let mut s = scheduler();
        s.state = CognitiveState::Active;

        s.tick().await.unwrap();
        assert!((s.energy().energy - 0.95).abs() < 1e-9);
        assert!((s.energy().curiosity - 0.72).abs() < 1e-9);
        assert_eq!(s.energy().cycles_since_rest, 1);
    }

    #[tokio::test]
    async fn test_resting_restores_then_dreams() {
        let mut s = scheduler();
        s.state = CognitiveState::Resting;
        s.energy = EnergyState::with_levels(0.1, 0.9);
        s.tick = 2;

        // Tick 3 is on the dream cadence
        let report = s.tick().await.unwrap();
        assert_eq!(report.to, CognitiveState::Dreaming);
        assert!((s.energy().energy - 0.25).abs() < 1e-9);

        let report = s.tick().await.unwrap();
        assert_eq!(report.from, CognitiveState::Dreaming);
        assert_eq!(report.to, CognitiveState::Resting);
        assert_eq!(s.energy().cycles_since_rest, 0);
        assert!(s.energy().last_rest.is_some());
        assert_eq!(s.stats().dreams, 1);
    }

    #[tokio::test]
    async fn test_control_commands_apply_at_tick_boundary() {
        let mut s = scheduler();
        s.start().await.unwrap();
        s.tick().await.unwrap();
        assert_eq!(s.state(), CognitiveState::Active);

        let control = s.control();
        assert!(control.force_rest());
        // Still Active until the next tick drains the queue
        assert_eq!(s.state(), CognitiveState::Active);

        let report = s.tick().await.unwrap();
        assert_eq!(report.from, CognitiveState::Tiring);
        assert_eq!(report.to, CognitiveState::Resting);
    }

    #[tokio::test]
    async fn test_force_wake_raises_energy() {
        let mut s = scheduler();
        s.state = CognitiveState::Resting;
        s.energy = EnergyState::with_levels(0.2, 0.5);

        let outcome = s.apply_control(ControlCommand::ForceWake);
        assert!(matches!(outcome, ControlOutcome::Applied { to: CognitiveState::Waking, .. }));
        assert_eq!(s.energy().energy, 0.5);

        let ignored = s.apply_control(ControlCommand::TriggerDream);
        assert!(matches!(ignored, ControlOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_ignores_everything() {
        let mut s = scheduler();
        s.start().await.unwrap();
        s.stop();
        assert_eq!(s.state(), CognitiveState::Shutdown);

        assert!(!s.control().force_wake());
        assert!(s.tick().await.is_none());
        assert!(matches!(
            s.apply_control(ControlCommand::BoostEnergy),
            ControlOutcome::Ignored { .. }
        ));
        assert_eq!(s.state(), CognitiveState::Shutdown);
    }

    #[tokio::test]
    async fn test_dropped_observer_does_not_stall() {
        let mut s = scheduler();
        let rx = s.subscribe();
        drop(rx);
        s.start().await.unwrap();
        for _ in 0..5 {
            assert!(s.tick().await.is_some());
        }
        assert_eq!(s.stats().tick, 5);
    }

    #[tokio::test]
    async fn test_observer_sees_state_changes() {
        let mut s = scheduler();
        let mut rx = s.subscribe();
        s.start().await.unwrap();
        s.tick().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::StateChange);
        assert_eq!(first.payload["to"], "waking");

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        assert!(kinds.contains(&EventKind::Thought));
        assert!(kinds.contains(&EventKind::Metrics));
    }

    #[tokio::test]
    async fn test_goal_pursuit_during_active_tick() {
        let mut s = scheduler();
        s.start().await.unwrap();
        s.add_goal(Goal::new("Understand consolidation", 0.9).with_id("g1"));
        assert_eq!(s.orchestrator().steps_for("g1").len(), 4);

        s.tick().await.unwrap(); // Waking -> Active
        s.tick().await.unwrap(); // Active work

        assert!(s.stats().orchestrator.total_sessions > 0);
        let stored = s.store.load_steps().unwrap();
        assert_eq!(stored.len(), 4);
        assert!(stored.iter().any(|step| step.attempts > 0));
    }

    #[tokio::test]
    async fn test_control_after_stop_never_blocks() {
        let mut s = scheduler();
        s.start().await.unwrap();
        let control = s.control();
        assert!(control.boost_energy());
        s.stop();

        // Well past the queue capacity; every send returns at once
        for _ in 0..s.config.control_capacity + 8 {
            assert!(!control.force_wake());
        }
        assert!(!s.control().trigger_dream());
        assert_eq!(s.state(), CognitiveState::Shutdown);
    }

    #[tokio::test]
    async fn test_control_before_start_is_ignored() {
        let mut s = scheduler();
        assert!(matches!(
            s.apply_control(ControlCommand::BoostEnergy),
            ControlOutcome::Ignored { state: CognitiveState::Initializing, .. }
        ));
        assert_eq!(s.state(), CognitiveState::Initializing);
    }

    /// Store whose writes fail while `broken` is set; goal writes also fail
    /// while `goals_broken` is set
    struct FlakyStore {
        inner: SqliteStore,
        broken: AtomicBool,
        goals_broken: AtomicBool,
    }

    impl FlakyStore {
        fn new(broken: bool) -> Self {
            Self {
                inner: SqliteStore::open_in_memory().unwrap(),
                broken: AtomicBool::new(broken),
                goals_broken: AtomicBool::new(false),
            }
        }

        fn check(&self) -> Result<()> {
            if self.broken.load(Ordering::SeqCst) {
                anyhow::bail!("disk unavailable");
            }
            Ok(())
        }

        fn check_goals(&self) -> Result<()> {
            self.check()?;
            if self.goals_broken.load(Ordering::SeqCst) {
                anyhow::bail!("goals table locked");
            }
            Ok(())
        }
    }

    impl Persistence for FlakyStore {
        fn append_activity(&self, record: &ActivityRecord) -> Result<i64> {
            self.check()?;
            self.inner.append_activity(record)
        }
        fn recent_activities(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
            self.inner.recent_activities(limit)
        }
        fn save_energy(&self, energy: &EnergyState) -> Result<()> {
            self.check()?;
            self.inner.save_energy(energy)
        }
        fn load_latest_energy(&self) -> Result<Option<EnergyState>> {
            self.inner.load_latest_energy()
        }
        fn upsert_goal(&self, goal: &Goal) -> Result<()> {
            self.check_goals()?;
            self.inner.upsert_goal(goal)
        }
        fn load_goals(&self) -> Result<Vec<Goal>> {
            self.inner.load_goals()
        }
        fn upsert_steps(&self, steps: &[GoalStep]) -> Result<()> {
            self.check_goals()?;
            self.inner.upsert_steps(steps)
        }
        fn load_steps(&self) -> Result<Vec<GoalStep>> {
            self.inner.load_steps()
        }
        fn append_session(&self, session: &PursuitSession) -> Result<()> {
            self.check()?;
            self.inner.append_session(session)
        }
        fn upsert_pattern(&self, pattern: &MemoryPattern) -> Result<()> {
            self.check()?;
            self.inner.upsert_pattern(pattern)
        }
        fn delete_patterns(&self, ids: &[String]) -> Result<usize> {
            self.check()?;
            self.inner.delete_patterns(ids)
        }
        fn load_patterns(&self) -> Result<Vec<MemoryPattern>> {
            self.inner.load_patterns()
        }
        fn append_insight(&self, insight: &ConsolidatedInsight) -> Result<()> {
            self.check()?;
            self.inner.append_insight(insight)
        }
        fn recent_insights(&self, limit: usize) -> Result<Vec<ConsolidatedInsight>> {
            self.inner.recent_insights(limit)
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_degrades_then_recovers() {
        let store = Arc::new(FlakyStore::new(true));
        let mut s = CognitiveScheduler::new(SchedulerConfig::default(), store.clone(), Arc::new(OfflineGenerator));
        s.start().await.unwrap();

        // Waking tick writes a thought and fails; the loop keeps going
        assert_eq!(s.tick().await.unwrap().to, CognitiveState::Active);
        assert!(s.stats().degraded);

        store.broken.store(false, Ordering::SeqCst);
        for _ in 0..4 {
            s.tick().await.unwrap();
        }
        // Tick 5 saved a snapshot
        assert!(!s.stats().degraded);
        assert!(store.load_latest_energy().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_goal_written_during_outage_is_saved_later() {
        let store = Arc::new(FlakyStore::new(false));
        let mut s = CognitiveScheduler::new(SchedulerConfig::default(), store.clone(), Arc::new(OfflineGenerator));
        s.start().await.unwrap();

        store.broken.store(true, Ordering::SeqCst);
        s.add_goal(Goal::new("Survive the outage", 0.8).with_id("g1"));
        assert!(s.set_goal_status("g1", GoalStatus::Paused));
        assert!(s.stats().degraded);
        assert_eq!(s.stats().pending_writes, 1);

        store.broken.store(false, Ordering::SeqCst);
        for _ in 0..5 {
            s.tick().await.unwrap();
        }

        let goals = store.load_goals().unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].status, GoalStatus::Paused);
        assert_eq!(store.load_steps().unwrap().len(), 4);
        assert!(!s.stats().degraded);
        assert_eq!(s.stats().pending_writes, 0);
    }

    #[tokio::test]
    async fn test_degraded_holds_while_goal_writes_fail() {
        let store = Arc::new(FlakyStore::new(false));
        let mut s = CognitiveScheduler::new(SchedulerConfig::default(), store.clone(), Arc::new(OfflineGenerator));
        s.start().await.unwrap();

        store.goals_broken.store(true, Ordering::SeqCst);
        s.add_goal(Goal::new("Stubborn goal", 0.8).with_id("g1"));
        s.set_goal_status("g1", GoalStatus::Paused);
        for _ in 0..5 {
            s.tick().await.unwrap();
        }
        // The snapshot landed but the goal did not
        assert!(store.load_latest_energy().unwrap().is_some());
        assert!(store.load_goals().unwrap().is_empty());
        assert!(s.stats().degraded);

        store.goals_broken.store(false, Ordering::SeqCst);
        for _ in 0..5 {
            s.tick().await.unwrap();
        }
        assert_eq!(store.load_goals().unwrap().len(), 1);
        assert!(!s.stats().degraded);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let config = SchedulerConfig {
            tick_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut s = CognitiveScheduler::new(config, store.clone(), Arc::new(OfflineGenerator));
        let (tx, rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });
        s.run(rx).await.unwrap();
        stopper.await.unwrap();

        assert_eq!(s.state(), CognitiveState::Shutdown);
        assert!(s.stats().tick > 0);
        assert!(store.load_latest_energy().unwrap().is_some());
    }
}
