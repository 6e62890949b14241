//! Observer events
//!
//! Events fan out over a broadcast channel. Delivery is best-effort: a
//! missing or lagging subscriber never holds up a tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::CognitiveState;
use crate::energy::EnergyState;

/// Event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StateChange,
    Metrics,
    Thought,
    Consolidation,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StateChange => "state_change",
            EventKind::Metrics => "metrics",
            EventKind::Thought => "thought",
            EventKind::Consolidation => "consolidation",
        }
    }
}

/// One observer event, serialized as `{type, timestamp, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "data")]
    pub payload: Value,
}

impl SchedulerEvent {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn state_change(from: CognitiveState, to: CognitiveState, tick: u64) -> Self {
        Self::new(
            EventKind::StateChange,
            json!({ "from": from, "to": to, "tick": tick }),
        )
    }

    pub fn metrics(state: CognitiveState, energy: &EnergyState, tick: u64) -> Self {
        Self::new(
            EventKind::Metrics,
            json!({
                "state": state,
                "tick": tick,
                "energy": energy.energy,
                "fatigue": energy.fatigue,
                "coherence": energy.coherence,
                "curiosity": energy.curiosity,
                "cycles_since_rest": energy.cycles_since_rest,
            }),
        )
    }

    pub fn thought(category: &str, content: &str, state: CognitiveState) -> Self {
        Self::new(
            EventKind::Thought,
            json!({ "category": category, "content": content, "state": state }),
        )
    }
}
