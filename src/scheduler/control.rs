//! Control commands
//!
//! Commands are queued from any task and applied by the scheduler at the
//! start of its next tick, so they never interleave with a tick in flight.
//! Queuing never waits: a full or closed queue drops the command.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use super::CognitiveState;

/// Externally issued override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Active | Waking -> Tiring
    ForceRest,
    /// Resting | Dreaming -> Waking, energy raised to at least 0.5
    ForceWake,
    /// Resting -> Dreaming
    TriggerDream,
    /// Energy up, fatigue down
    BoostEnergy,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::ForceRest => "force_rest",
            ControlCommand::ForceWake => "force_wake",
            ControlCommand::TriggerDream => "trigger_dream",
            ControlCommand::BoostEnergy => "boost_energy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "force_rest" => Some(ControlCommand::ForceRest),
            "force_wake" => Some(ControlCommand::ForceWake),
            "trigger_dream" => Some(ControlCommand::TriggerDream),
            "boost_energy" => Some(ControlCommand::BoostEnergy),
            _ => None,
        }
    }

    /// Target state if the command applies in `current`; `Some(current)` for
    /// commands that only touch energy
    pub fn target(&self, current: CognitiveState) -> Option<CognitiveState> {
        match (self, current) {
            (_, CognitiveState::Initializing | CognitiveState::Shutdown) => None,
            (ControlCommand::ForceRest, CognitiveState::Active | CognitiveState::Waking) => {
                Some(CognitiveState::Tiring)
            }
            (ControlCommand::ForceWake, CognitiveState::Resting | CognitiveState::Dreaming) => {
                Some(CognitiveState::Waking)
            }
            (ControlCommand::TriggerDream, CognitiveState::Resting) => Some(CognitiveState::Dreaming),
            (ControlCommand::BoostEnergy, state) => Some(state),
            _ => None,
        }
    }
}

/// Result of applying a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied {
        command: ControlCommand,
        from: CognitiveState,
        to: CognitiveState,
    },
    Ignored {
        command: ControlCommand,
        state: CognitiveState,
    },
}

/// Cloneable sender side of the control channel
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlCommand>,
}

impl ControlHandle {
    pub(crate) fn new(tx: mpsc::Sender<ControlCommand>) -> Self {
        Self { tx }
    }

    /// Queue a command without waiting. Returns false if the queue is full
    /// or the scheduler has stopped.
    pub fn send(&self, command: ControlCommand) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(command)) => {
                warn!("Control queue full, dropping {}", command.as_str());
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn force_rest(&self) -> bool {
        self.send(ControlCommand::ForceRest)
    }

    pub fn force_wake(&self) -> bool {
        self.send(ControlCommand::ForceWake)
    }

    pub fn trigger_dream(&self) -> bool {
        self.send(ControlCommand::TriggerDream)
    }

    pub fn boost_energy(&self) -> bool {
        self.send(ControlCommand::BoostEnergy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_targets() {
        use CognitiveState::*;

        assert_eq!(ControlCommand::ForceRest.target(Active), Some(Tiring));
        assert_eq!(ControlCommand::ForceRest.target(Waking), Some(Tiring));
        assert_eq!(ControlCommand::ForceRest.target(Resting), None);
        assert_eq!(ControlCommand::ForceWake.target(Dreaming), Some(Waking));
        assert_eq!(ControlCommand::ForceWake.target(Active), None);
        assert_eq!(ControlCommand::TriggerDream.target(Resting), Some(Dreaming));
        assert_eq!(ControlCommand::TriggerDream.target(Tiring), None);
        assert_eq!(ControlCommand::BoostEnergy.target(Tiring), Some(Tiring));
    }

    #[test]
    fn test_nothing_applies_after_shutdown() {
        for command in [
            ControlCommand::ForceRest,
            ControlCommand::ForceWake,
            ControlCommand::TriggerDream,
            ControlCommand::BoostEnergy,
        ] {
            assert_eq!(command.target(CognitiveState::Shutdown), None);
            assert_eq!(command.target(CognitiveState::Initializing), None);
            assert_eq!(ControlCommand::parse(command.as_str()), Some(command));
        }
    }

    #[test]
    fn test_handle_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(4);
        let handle = ControlHandle::new(tx);
        assert!(handle.force_rest());
        drop(rx);
        assert!(!handle.boost_energy());
    }

    #[test]
    fn test_full_queue_drops_instead_of_waiting() {
        let (tx, mut rx) = mpsc::channel(2);
        let handle = ControlHandle::new(tx);
        assert!(handle.force_rest());
        assert!(handle.force_wake());
        assert!(!handle.trigger_dream());

        assert_eq!(rx.try_recv().ok(), Some(ControlCommand::ForceRest));
        assert!(handle.boost_energy());
    }
}
