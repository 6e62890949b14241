//! State Store Integration Tests
//!
//! Durability of the SQLite store across reopen.

use chrono::Utc;
use echo_autonomy::activity::category;
use echo_autonomy::orchestrator::{OrchestratorConfig, PursuitSession};
use echo_autonomy::{
    ActivityRecord, CognitiveState, EnergyState, Goal, GoalOrchestrator, MemoryPattern,
    Persistence, SqliteStore,
};
use tempfile::TempDir;

fn create_test_store(name: &str) -> (SqliteStore, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join(format!("{}.db", name));
    let store = SqliteStore::open(&db_path).expect("Failed to create store");
    (store, temp_dir)
}

#[test]
fn test_open_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("deeper").join("state.db");
    let _store = SqliteStore::open(&db_path).unwrap();
    assert!(db_path.exists());
}

#[test]
fn test_state_survives_reopen() {
    let (store, temp) = create_test_store("reopen");
    let db_path = temp.path().join("reopen.db");

    let mut energy = EnergyState::with_levels(0.42, 0.33);
    energy.reset_rest_counter(Utc::now());
    store.save_energy(&energy).unwrap();

    store
        .append_activity(&ActivityRecord::new(
            category::WAKING,
            "Light returns slowly",
            0.42,
            CognitiveState::Waking,
        ))
        .unwrap();

    let pattern = MemoryPattern::new("slow waking", 0.5, Utc::now());
    store.upsert_pattern(&pattern).unwrap();
    drop(store);

    let reopened = SqliteStore::open(&db_path).unwrap();
    let restored = reopened.load_latest_energy().unwrap().unwrap();
    assert_eq!(restored.energy, 0.42);
    assert_eq!(restored.fatigue, 0.33);
    assert_eq!(restored.cycles_since_rest, 0);
    assert!(restored.last_rest.is_some());

    let activity = reopened.recent_activities(10).unwrap();
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].state, CognitiveState::Waking);

    let patterns = reopened.load_patterns().unwrap();
    assert_eq!(patterns, vec![pattern]);
}

#[test]
fn test_orchestrator_round_trip_through_store() {
    let (store, _temp) = create_test_store("orchestrator");
    let mut orchestrator = GoalOrchestrator::new(OrchestratorConfig::default());
    let goal = Goal::new("Learn the store", 0.7)
        .with_id("g1")
        .with_knowledge_gaps(&["sqlite"]);
    orchestrator.add_goal(goal.clone());

    let report = orchestrator.pursue(std::time::Duration::from_secs(10));
    assert_eq!(report.sessions.len(), 2);
    for session in &report.sessions {
        store.append_session(session).unwrap();
    }
    store.upsert_goal(orchestrator.goal("g1").unwrap()).unwrap();
    store.upsert_steps(orchestrator.steps_for("g1")).unwrap();

    let mut restored = GoalOrchestrator::new(OrchestratorConfig::default());
    restored.load(store.load_goals().unwrap(), store.load_steps().unwrap());
    assert_eq!(restored.steps_for("g1"), orchestrator.steps_for("g1"));
    assert_eq!(restored.select_next_work(), orchestrator.select_next_work());
    assert_eq!(store.stats().unwrap().sessions, 2);

    // Sessions are append-only; replays are ignored
    let replay: &PursuitSession = &report.sessions[0];
    store.append_session(replay).unwrap();
    assert_eq!(store.stats().unwrap().sessions, 2);
}
