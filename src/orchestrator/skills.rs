//! Skill proficiency capability
//!
//! The orchestrator scores steps by how ready the agent is for the skills
//! they need. Skill tracking is an external concern, so it is reached through
//! [`SkillProficiencyLookup`]. Without a real tracker the [`NoSkillSystem`]
//! stub reports a moderate proficiency for everything.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Proficiency reported by [`NoSkillSystem`]
pub const DEFAULT_PROFICIENCY: f64 = 0.5;

/// Proficiency assumed for skills a tracker does not know
pub const UNKNOWN_SKILL_PROFICIENCY: f64 = 0.3;

/// Read access to skill proficiency, with an optional practice hook
pub trait SkillProficiencyLookup: Send + Sync {
    /// Proficiency in [0, 1], or None if the skill is not tracked
    fn proficiency(&self, skill: &str) -> Option<f64>;

    /// Called once per practised skill after a pursuit session
    fn record_practice(&self, _skill: &str, _amount: f64) {}
}

/// Stub used when no skill tracker is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSkillSystem;

impl SkillProficiencyLookup for NoSkillSystem {
    fn proficiency(&self, _skill: &str) -> Option<f64> {
        Some(DEFAULT_PROFICIENCY)
    }
}

/// A tracked skill
#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    pub name: String,
    pub proficiency: f64,
    pub practice_count: u32,
}

/// In-memory skill tracker
#[derive(Debug, Default)]
pub struct SkillRegistry {
    skills: RwLock<HashMap<String, Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a skill at the given proficiency
    pub fn insert(&self, name: &str, proficiency: f64) {
        self.skills.write().insert(
            name.to_string(),
            Skill {
                name: name.to_string(),
                proficiency: proficiency.clamp(0.0, 1.0),
                practice_count: 0,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<Skill> {
        self.skills.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.skills.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.read().is_empty()
    }
}

impl SkillProficiencyLookup for SkillRegistry {
    fn proficiency(&self, skill: &str) -> Option<f64> {
        self.skills.read().get(skill).map(|s| s.proficiency)
    }

    /// Diminishing returns: the closer to 1.0, the smaller the gain
    fn record_practice(&self, skill: &str, amount: f64) {
        let mut skills = self.skills.write();
        if let Some(s) = skills.get_mut(skill) {
            let improvement = amount.max(0.0) * 0.05 * (1.0 - s.proficiency);
            s.proficiency = (s.proficiency + improvement).min(1.0);
            s.practice_count += 1;
        }
    }
}

/// Mean proficiency across `skills`; a step with no skill requirements is fully ready
pub fn skill_readiness(lookup: &dyn SkillProficiencyLookup, skills: &[String]) -> f64 {
    if skills.is_empty() {
        return 1.0;
    }
    let total: f64 = skills
        .iter()
        .map(|s| lookup.proficiency(s).unwrap_or(UNKNOWN_SKILL_PROFICIENCY))
        .sum();
    total / skills.len() as f64
}
