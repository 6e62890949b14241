//! Echo Autonomy
//!
//! A self-paced agent loop that wakes, thinks, pursues goals, tires, rests
//! and dreams, keeping its state across restarts.
//!
//! # Features
//!
//! - **Cognitive Scheduler**: wake/active/tiring/rest/dream state machine driven by energy
//! - **Energy Model**: bounded energy, fatigue and curiosity with rest thresholds
//! - **Goal Orchestrator**: dependency-ordered decomposition and budgeted pursuit
//! - **Consolidation**: pattern extraction, merging, pruning and insight synthesis
//! - **Persistence**: SQLite snapshots of energy, goals, patterns and activity
//! - **Text Generation**: Ollama-backed thoughts with timeout and placeholder fallback
//!
//! # Architecture
//!
//! ```text
//! Energy Model ──► Cognitive Scheduler ──┬── Goal Orchestrator
//!                        │                ├── Consolidation Engine
//!                        │                └── Text Generator (Ollama)
//!                        ├── Persistence (SQLite)
//!                        ├── Observers (broadcast events)
//!                        └── Control (mpsc commands)
//! ```

pub mod activity;
pub mod config;
pub mod consolidation;
pub mod energy;
pub mod llm;
pub mod orchestrator;
pub mod scheduler;
pub mod store;

pub use activity::ActivityRecord;
pub use config::Config;
pub use consolidation::{ConsolidatedInsight, ConsolidationEngine, MemoryPattern};
pub use energy::{EnergyState, EnergyThresholds};
pub use llm::{OfflineGenerator, OllamaGenerator, TextGenerator};
pub use orchestrator::{Goal, GoalOrchestrator, GoalStatus, GoalStep, StepStatus};
pub use scheduler::{CognitiveScheduler, CognitiveState, ControlCommand, ControlHandle, SchedulerConfig, SchedulerEvent};
pub use store::{Persistence, SqliteStore};
