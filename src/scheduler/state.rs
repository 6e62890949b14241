//! Cognitive states and the pure transition function

use serde::{Deserialize, Serialize};

/// Scheduler states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveState {
    /// Constructed, not yet started
    Initializing,
    /// Producing the waking thought
    Waking,
    /// Thinking and pursuing goals
    Active,
    /// Winding down before rest
    Tiring,
    /// Recovering energy
    Resting,
    /// Consolidating recent activity
    Dreaming,
    /// Stopped; terminal
    Shutdown,
}

/// Inputs to one transition decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionSignals {
    pub needs_rest: bool,
    pub can_wake: bool,
    /// Resting tick on the dream cadence
    pub dream_due: bool,
}

impl CognitiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CognitiveState::Initializing => "initializing",
            CognitiveState::Waking => "waking",
            CognitiveState::Active => "active",
            CognitiveState::Tiring => "tiring",
            CognitiveState::Resting => "resting",
            CognitiveState::Dreaming => "dreaming",
            CognitiveState::Shutdown => "shutdown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "initializing" => Some(CognitiveState::Initializing),
            "waking" => Some(CognitiveState::Waking),
            "active" => Some(CognitiveState::Active),
            "tiring" => Some(CognitiveState::Tiring),
            "resting" => Some(CognitiveState::Resting),
            "dreaming" => Some(CognitiveState::Dreaming),
            "shutdown" => Some(CognitiveState::Shutdown),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CognitiveState::Shutdown)
    }

    /// Next state given the signals. Same inputs, same output.
    ///
    /// For Dreaming, `can_wake` must be evaluated after the dream's restore.
    pub fn next(self, signals: TransitionSignals) -> CognitiveState {
        match self {
            CognitiveState::Initializing => CognitiveState::Waking,
            CognitiveState::Waking => CognitiveState::Active,
            CognitiveState::Active if signals.needs_rest => CognitiveState::Tiring,
            CognitiveState::Active => CognitiveState::Active,
            CognitiveState::Tiring => CognitiveState::Resting,
            CognitiveState::Resting if signals.can_wake => CognitiveState::Waking,
            CognitiveState::Resting if signals.dream_due => CognitiveState::Dreaming,
            CognitiveState::Resting => CognitiveState::Resting,
            CognitiveState::Dreaming if signals.can_wake => CognitiveState::Waking,
            CognitiveState::Dreaming => CognitiveState::Resting,
            CognitiveState::Shutdown => CognitiveState::Shutdown,
        }
    }
}

impl std::fmt::Display for CognitiveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(needs_rest: bool, can_wake: bool, dream_due: bool) -> TransitionSignals {
        TransitionSignals { needs_rest, can_wake, dream_due }
    }

    #[test]
    fn test_transition_table() {
        let none = TransitionSignals::default();
        assert_eq!(CognitiveState::Initializing.next(none), CognitiveState::Waking);
        assert_eq!(CognitiveState::Waking.next(signals(true, false, false)), CognitiveState::Active);
        assert_eq!(CognitiveState::Active.next(signals(true, false, false)), CognitiveState::Tiring);
        assert_eq!(CognitiveState::Active.next(none), CognitiveState::Active);
        assert_eq!(CognitiveState::Tiring.next(none), CognitiveState::Resting);
        assert_eq!(CognitiveState::Resting.next(signals(false, true, true)), CognitiveState::Waking);
        assert_eq!(CognitiveState::Resting.next(signals(false, false, true)), CognitiveState::Dreaming);
        assert_eq!(CognitiveState::Resting.next(none), CognitiveState::Resting);
        assert_eq!(CognitiveState::Dreaming.next(signals(false, true, false)), CognitiveState::Waking);
        assert_eq!(CognitiveState::Dreaming.next(none), CognitiveState::Resting);
    }

    #[test]
    fn test_shutdown_is_terminal() {
        for s in [signals(true, true, true), TransitionSignals::default()] {
            assert_eq!(CognitiveState::Shutdown.next(s), CognitiveState::Shutdown);
        }
        assert!(CognitiveState::Shutdown.is_terminal());
        assert!(!CognitiveState::Dreaming.is_terminal());
    }

    #[test]
    fn test_fixed_signals_give_same_sequence() {
        let script = [
            signals(false, false, false),
            signals(false, false, false),
            signals(false, false, false),
            signals(true, false, false),
            signals(true, false, false),
            signals(false, false, true),
            signals(false, false, false),
            signals(false, true, false),
        ];
        let run = || {
            let mut state = CognitiveState::Initializing;
            let mut visited = vec![state];
            for s in script {
                state = state.next(s);
                visited.push(state);
            }
            visited
        };

        let first = run();
        assert_eq!(first, run());
        assert_eq!(
            first,
            vec![
                CognitiveState::Initializing,
                CognitiveState::Waking,
                CognitiveState::Active,
                CognitiveState::Active,
                CognitiveState::Tiring,
                CognitiveState::Resting,
                CognitiveState::Dreaming,
                CognitiveState::Resting,
                CognitiveState::Waking,
            ]
        );
    }

    #[test]
    fn test_names_round_trip() {
        assert_eq!(CognitiveState::parse("DREAMING"), Some(CognitiveState::Dreaming));
        assert_eq!(CognitiveState::parse("napping"), None);
        assert_eq!(CognitiveState::Tiring.to_string(), "tiring");
    }
}
