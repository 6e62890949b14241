//! Energy Model
//!
//! Four bounded scalars that approximate the agent's processing budget:
//! - **energy**: available budget, drained by active work
//! - **fatigue**: accumulated cost, grows faster than energy drains
//! - **coherence** / **curiosity**: carried along and reported to observers
//!
//! The scheduler reads `needs_rest()` / `can_wake()` to decide transitions.
//! Every mutation clamps to `[0.0, 1.0]`; anything outside that range after a
//! mutation is a bug and trips a debug assertion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transition thresholds for the energy model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyThresholds {
    /// Rest when energy drops below this
    pub rest_energy_below: f64,
    /// Rest when fatigue rises above this
    pub rest_fatigue_above: f64,
    /// Rest after this many active cycles regardless of energy
    pub rest_after_cycles: u32,
    /// Wake requires energy above this
    pub wake_energy_above: f64,
    /// Wake requires fatigue below this
    pub wake_fatigue_below: f64,
}

impl Default for EnergyThresholds {
    fn default() -> Self {
        Self {
            rest_energy_below: 0.3,
            rest_fatigue_above: 0.7,
            rest_after_cycles: 20,
            wake_energy_above: 0.6,
            wake_fatigue_below: 0.4,
        }
    }
}

/// Energy and fatigue levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyState {
    pub energy: f64,
    pub fatigue: f64,
    pub coherence: f64,
    pub curiosity: f64,
    pub cycles_since_rest: u32,
    pub last_rest: Option<DateTime<Utc>>,
}

impl Default for EnergyState {
    fn default() -> Self {
        Self {
            energy: 1.0,
            fatigue: 0.0,
            coherence: 1.0,
            curiosity: 0.7,
            cycles_since_rest: 0,
            last_rest: None,
        }
    }
}

impl EnergyState {
    /// Create a state with explicit energy/fatigue (other fields default)
    pub fn with_levels(energy: f64, fatigue: f64) -> Self {
        let state = Self {
            energy: energy.clamp(0.0, 1.0),
            fatigue: fatigue.clamp(0.0, 1.0),
            ..Self::default()
        };
        state.debug_check();
        state
    }

    /// True if energy is low, fatigue is high, or too many cycles passed
    pub fn needs_rest(&self, t: &EnergyThresholds) -> bool {
        self.energy < t.rest_energy_below
            || self.fatigue > t.rest_fatigue_above
            || self.cycles_since_rest > t.rest_after_cycles
    }

    /// True if rested enough to go back to active work
    pub fn can_wake(&self, t: &EnergyThresholds) -> bool {
        self.energy > t.wake_energy_above && self.fatigue < t.wake_fatigue_below
    }

    /// Spend energy on one unit of active processing
    pub fn consume(&mut self, amount: f64) {
        self.energy = (self.energy - amount).clamp(0.0, 1.0);
        self.fatigue = (self.fatigue + amount * 0.8).clamp(0.0, 1.0);
        self.cycles_since_rest = self.cycles_since_rest.saturating_add(1);
        self.debug_check();
    }

    /// Recover energy while resting
    pub fn restore(&mut self, amount: f64) {
        self.energy = (self.energy + amount).clamp(0.0, 1.0);
        self.fatigue = (self.fatigue - amount * 1.2).clamp(0.0, 1.0);
        self.debug_check();
    }

    /// Mark the end of a rest period
    pub fn reset_rest_counter(&mut self, now: DateTime<Utc>) {
        self.last_rest = Some(now);
        self.cycles_since_rest = 0;
    }

    /// Operator-triggered surge: energy up, fatigue down by the same amount
    pub fn boost(&mut self, amount: f64) {
        self.energy = (self.energy + amount).clamp(0.0, 1.0);
        self.fatigue = (self.fatigue - amount).clamp(0.0, 1.0);
        self.debug_check();
    }

    /// Nudge curiosity after an active thought
    pub fn stimulate_curiosity(&mut self, amount: f64) {
        self.curiosity = (self.curiosity + amount).clamp(0.0, 1.0);
        self.debug_check();
    }

    /// Raise energy to at least `floor` (used by force-wake)
    pub fn ensure_energy_at_least(&mut self, floor: f64) {
        self.energy = self.energy.max(floor).clamp(0.0, 1.0);
        self.debug_check();
    }

    /// All four scalars inside [0, 1]
    pub fn is_within_bounds(&self) -> bool {
        [self.energy, self.fatigue, self.coherence, self.curiosity]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }

    fn debug_check(&self) {
        debug_assert!(self.is_within_bounds(), "energy state out of bounds: {:?}", self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state(energy: f64, fatigue: f64, cycles: u32) -> EnergyState {
        EnergyState {
            cycles_since_rest: cycles,
            ..EnergyState::with_levels(energy, fatigue)
        }
    }

    #[test]
    fn test_defaults() {
        let e = EnergyState::default();
        assert_eq!(e.energy, 1.0);
        assert_eq!(e.fatigue, 0.0);
        assert_eq!(e.curiosity, 0.7);
        assert!(e.last_rest.is_none());
    }

    #[test]
    fn test_needs_rest_boundaries() {
        let t = EnergyThresholds::default();

        // Exactly at the thresholds does not trigger rest
        assert!(!state(0.3, 0.7, 20).needs_rest(&t));

        assert!(state(0.299, 0.0, 0).needs_rest(&t));
        assert!(state(1.0, 0.701, 0).needs_rest(&t));
        assert!(state(1.0, 0.0, 21).needs_rest(&t));

        assert!(!state(0.31, 0.69, 19).needs_rest(&t));
    }

    #[test]
    fn test_can_wake_boundaries() {
        let t = EnergyThresholds::default();

        assert!(!state(0.6, 0.0, 0).can_wake(&t));
        assert!(!state(1.0, 0.4, 0).can_wake(&t));
        assert!(state(0.601, 0.399, 0).can_wake(&t));
        assert!(!state(0.9, 0.5, 0).can_wake(&t));
        assert!(!state(0.5, 0.1, 0).can_wake(&t));
    }

    #[test]
    fn test_consume_and_restore() {
        let mut e = EnergyState::default();
        e.consume(0.05);
        assert!((e.energy - 0.95).abs() < 1e-9);
        assert!((e.fatigue - 0.04).abs() < 1e-9);
        assert_eq!(e.cycles_since_rest, 1);

        e.restore(0.15);
        assert_eq!(e.energy, 1.0);
        assert_eq!(e.fatigue, 0.0);
        // Restoring does not touch the cycle counter
        assert_eq!(e.cycles_since_rest, 1);
    }

    #[test]
    fn test_reset_rest_counter() {
        let mut e = state(0.5, 0.5, 12);
        let now = Utc::now();
        e.reset_rest_counter(now);
        assert_eq!(e.cycles_since_rest, 0);
        assert_eq!(e.last_rest, Some(now));
    }

    #[test]
    fn test_boost_clamps() {
        let mut e = state(0.95, 0.1, 0);
        e.boost(0.2);
        assert_eq!(e.energy, 1.0);
        assert_eq!(e.fatigue, 0.0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Consume(f64),
        Restore(f64),
        Boost(f64),
        Curiosity(f64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0.0f64..2.0).prop_map(Op::Consume),
            (0.0f64..2.0).prop_map(Op::Restore),
            (0.0f64..2.0).prop_map(Op::Boost),
            (0.0f64..1.0).prop_map(Op::Curiosity),
        ]
    }

    proptest! {
        #[test]
        fn test_scalars_stay_bounded(
            energy in 0.0f64..=1.0,
            fatigue in 0.0f64..=1.0,
            ops in proptest::collection::vec(op_strategy(), 0..64),
        ) {
            let mut e = EnergyState::with_levels(energy, fatigue);
            for op in ops {
                match op {
                    Op::Consume(a) => e.consume(a),
                    Op::Restore(a) => e.restore(a),
                    Op::Boost(a) => e.boost(a),
                    Op::Curiosity(a) => e.stimulate_curiosity(a),
                }
                prop_assert!(e.is_within_bounds(), "out of bounds: {:?}", e);
            }
        }
    }
}
