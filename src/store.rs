//! Durable State with SQLite Persistence
//!
//! Everything the scheduler must survive a restart with:
//! - Append-only activity log, read back most-recent-first
//! - Energy snapshots (latest wins)
//! - Goals, their ordered steps and the pursuit-session log
//! - Memory patterns and consolidated insights
//!
//! The scheduler talks to [`Persistence`]; [`SqliteStore`] is the shipped
//! implementation. List-valued columns are stored as JSON text.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::info;

use crate::activity::ActivityRecord;
use crate::consolidation::{ConsolidatedInsight, MemoryPattern};
use crate::energy::EnergyState;
use crate::orchestrator::{Goal, GoalStatus, GoalStep, PursuitSession, StepStatus};
use crate::scheduler::CognitiveState;

/// Read/write contract between the scheduler and its durable state
pub trait Persistence: Send + Sync {
    /// Append an activity record, returning its row id
    fn append_activity(&self, record: &ActivityRecord) -> Result<i64>;

    /// Most recent activity first
    fn recent_activities(&self, limit: usize) -> Result<Vec<ActivityRecord>>;

    fn save_energy(&self, energy: &EnergyState) -> Result<()>;

    /// Latest energy snapshot, if one was ever saved
    fn load_latest_energy(&self) -> Result<Option<EnergyState>>;

    fn upsert_goal(&self, goal: &Goal) -> Result<()>;

    fn load_goals(&self) -> Result<Vec<Goal>>;

    /// Replace-or-insert the steps of one goal, keeping their order
    fn upsert_steps(&self, steps: &[GoalStep]) -> Result<()>;

    /// All steps, grouped by goal in insertion order
    fn load_steps(&self) -> Result<Vec<GoalStep>>;

    fn append_session(&self, session: &PursuitSession) -> Result<()>;

    fn upsert_pattern(&self, pattern: &MemoryPattern) -> Result<()>;

    /// Delete patterns by id, returning how many rows went away
    fn delete_patterns(&self, ids: &[String]) -> Result<usize>;

    fn load_patterns(&self) -> Result<Vec<MemoryPattern>>;

    fn append_insight(&self, insight: &ConsolidatedInsight) -> Result<()>;

    /// Most recent insights first
    fn recent_insights(&self, limit: usize) -> Result<Vec<ConsolidatedInsight>>;
}

/// Row counts per table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub activities: usize,
    pub energy_snapshots: usize,
    pub goals: usize,
    pub steps: usize,
    pub sessions: usize,
    pub patterns: usize,
    pub insights: usize,
}

/// SQLite-backed store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn to_json(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

fn from_json(text: Option<String>) -> Vec<String> {
    text.and_then(|t| serde_json::from_str(&t).ok())
        .unwrap_or_default()
}

impl SqliteStore {
    /// Open (or create) a database file, creating its parent directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        info!("State store opened at {}", path.display());
        Ok(store)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                category TEXT NOT NULL,
                content TEXT NOT NULL,
                energy_level REAL NOT NULL,
                state TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS energy_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at TEXT NOT NULL,
                energy REAL NOT NULL,
                fatigue REAL NOT NULL,
                coherence REAL NOT NULL,
                curiosity REAL NOT NULL,
                cycles_since_rest INTEGER NOT NULL,
                last_rest TEXT
            );

            CREATE TABLE IF NOT EXISTS goals (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                priority REAL NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                progress REAL NOT NULL DEFAULT 0,
                required_skills TEXT,
                knowledge_gaps TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS goal_steps (
                id TEXT PRIMARY KEY,
                goal_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                priority REAL NOT NULL,
                estimated_effort REAL NOT NULL,
                actual_effort REAL NOT NULL DEFAULT 0,
                required_skills TEXT,
                dependencies TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                started_at TEXT,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS pursuit_sessions (
                id TEXT PRIMARY KEY,
                goal_id TEXT NOT NULL,
                step_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL,
                effort_applied REAL NOT NULL,
                progress_delta REAL NOT NULL,
                skills_practiced TEXT,
                success INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS memory_patterns (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                occurrences INTEGER NOT NULL,
                strength REAL NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                related_concepts TEXT
            );

            CREATE TABLE IF NOT EXISTS insights (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                insight TEXT NOT NULL,
                source_excerpts TEXT,
                confidence REAL NOT NULL,
                category TEXT NOT NULL,
                applications TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_steps_goal ON goal_steps(goal_id, position);
            CREATE INDEX IF NOT EXISTS idx_sessions_goal ON pursuit_sessions(goal_id);
            CREATE INDEX IF NOT EXISTS idx_goals_status ON goals(status);
            "#,
        )
        .context("Failed to initialize schema")?;
        Ok(())
    }

    fn load_activity(row: &rusqlite::Row) -> rusqlite::Result<ActivityRecord> {
        let state: String = row.get(5)?;
        Ok(ActivityRecord {
            id: Some(row.get(0)?),
            timestamp: row.get(1)?,
            category: row.get(2)?,
            content: row.get(3)?,
            energy_level: row.get(4)?,
            state: CognitiveState::parse(&state).unwrap_or(CognitiveState::Active),
        })
    }

    fn load_goal(row: &rusqlite::Row) -> rusqlite::Result<Goal> {
        let status: String = row.get(3)?;
        Ok(Goal {
            id: row.get(0)?,
            description: row.get(1)?,
            priority: row.get(2)?,
            status: GoalStatus::parse(&status).unwrap_or(GoalStatus::Active),
            progress: row.get(4)?,
            required_skills: from_json(row.get(5)?),
            knowledge_gaps: from_json(row.get(6)?),
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn load_step(row: &rusqlite::Row) -> rusqlite::Result<GoalStep> {
        let status: String = row.get(3)?;
        Ok(GoalStep {
            id: row.get(0)?,
            goal_id: row.get(1)?,
            description: row.get(2)?,
            status: StepStatus::parse(&status).unwrap_or(StepStatus::Pending),
            priority: row.get(4)?,
            estimated_effort: row.get(5)?,
            actual_effort: row.get(6)?,
            required_skills: from_json(row.get(7)?),
            dependencies: from_json(row.get(8)?),
            attempts: row.get(9)?,
            max_attempts: row.get(10)?,
            started_at: row.get(11)?,
            completed_at: row.get(12)?,
        })
    }

    fn load_pattern(row: &rusqlite::Row) -> rusqlite::Result<MemoryPattern> {
        Ok(MemoryPattern {
            id: row.get(0)?,
            description: row.get(1)?,
            occurrences: row.get(2)?,
            strength: row.get(3)?,
            first_seen: row.get(4)?,
            last_seen: row.get(5)?,
            related_concepts: from_json(row.get(6)?),
        })
    }

    fn load_insight(row: &rusqlite::Row) -> rusqlite::Result<ConsolidatedInsight> {
        Ok(ConsolidatedInsight {
            timestamp: row.get(0)?,
            insight: row.get(1)?,
            source_excerpts: from_json(row.get(2)?),
            confidence: row.get(3)?,
            category: row.get(4)?,
            applications: from_json(row.get(5)?),
        })
    }

    fn count(conn: &Connection, table: &str) -> Result<usize> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();
        Ok(StoreStats {
            activities: Self::count(&conn, "activities")?,
            energy_snapshots: Self::count(&conn, "energy_snapshots")?,
            goals: Self::count(&conn, "goals")?,
            steps: Self::count(&conn, "goal_steps")?,
            sessions: Self::count(&conn, "pursuit_sessions")?,
            patterns: Self::count(&conn, "memory_patterns")?,
            insights: Self::count(&conn, "insights")?,
        })
    }
}

impl Persistence for SqliteStore {
    fn append_activity(&self, record: &ActivityRecord) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO activities (timestamp, category, content, energy_level, state)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.timestamp,
                record.category,
                record.content,
                record.energy_level,
                record.state.as_str(),
            ],
        )
        .context("Failed to append activity")?;
        Ok(conn.last_insert_rowid())
    }

    fn recent_activities(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, category, content, energy_level, state
             FROM activities ORDER BY id DESC LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit as i64], Self::load_activity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn save_energy(&self, energy: &EnergyState) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO energy_snapshots
             (recorded_at, energy, fatigue, coherence, curiosity, cycles_since_rest, last_rest)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Utc::now(),
                energy.energy,
                energy.fatigue,
                energy.coherence,
                energy.curiosity,
                energy.cycles_since_rest,
                energy.last_rest,
            ],
        )
        .context("Failed to save energy snapshot")?;
        Ok(())
    }

    fn load_latest_energy(&self) -> Result<Option<EnergyState>> {
        let conn = self.conn.lock();
        let energy = conn
            .query_row(
                "SELECT energy, fatigue, coherence, curiosity, cycles_since_rest, last_rest
                 FROM energy_snapshots ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    let last_rest: Option<DateTime<Utc>> = row.get(5)?;
                    Ok(EnergyState {
                        energy: row.get(0)?,
                        fatigue: row.get(1)?,
                        coherence: row.get(2)?,
                        curiosity: row.get(3)?,
                        cycles_since_rest: row.get(4)?,
                        last_rest,
                    })
                },
            )
            .optional()?;

        match energy {
            Some(energy) if !energy.is_within_bounds() => Err(anyhow::anyhow!(
                "energy={} fatigue={} coherence={} curiosity={}",
                energy.energy,
                energy.fatigue,
                energy.coherence,
                energy.curiosity
            ))
            .context("Stored energy snapshot is out of range"),
            energy => Ok(energy),
        }
    }

    fn upsert_goal(&self, goal: &Goal) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO goals
            (id, description, priority, status, progress, required_skills, knowledge_gaps, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                goal.id,
                goal.description,
                goal.priority,
                goal.status.as_str(),
                goal.progress,
                to_json(&goal.required_skills),
                to_json(&goal.knowledge_gaps),
                goal.created_at,
                goal.updated_at,
            ],
        )
        .with_context(|| format!("Failed to save goal {}", goal.id))?;
        Ok(())
    }

    fn load_goals(&self) -> Result<Vec<Goal>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, description, priority, status, progress, required_skills, knowledge_gaps,
                    created_at, updated_at
             FROM goals ORDER BY created_at ASC",
        )?;
        let goals = stmt
            .query_map([], Self::load_goal)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(goals)
    }

    fn upsert_steps(&self, steps: &[GoalStep]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO goal_steps
                (id, goal_id, position, description, status, priority, estimated_effort, actual_effort,
                 required_skills, dependencies, attempts, max_attempts, started_at, completed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                "#,
            )?;
            for (position, step) in steps.iter().enumerate() {
                stmt.execute(params![
                    step.id,
                    step.goal_id,
                    position as i64,
                    step.description,
                    step.status.as_str(),
                    step.priority,
                    step.estimated_effort,
                    step.actual_effort,
                    to_json(&step.required_skills),
                    to_json(&step.dependencies),
                    step.attempts,
                    step.max_attempts,
                    step.started_at,
                    step.completed_at,
                ])?;
            }
        }
        tx.commit().context("Failed to save goal steps")?;
        Ok(())
    }

    fn load_steps(&self) -> Result<Vec<GoalStep>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, goal_id, description, status, priority, estimated_effort, actual_effort,
                    required_skills, dependencies, attempts, max_attempts, started_at, completed_at
             FROM goal_steps ORDER BY goal_id, position",
        )?;
        let steps = stmt
            .query_map([], Self::load_step)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(steps)
    }

    fn append_session(&self, session: &PursuitSession) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT OR IGNORE INTO pursuit_sessions
            (id, goal_id, step_id, started_at, ended_at, effort_applied, progress_delta, skills_practiced, success)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                session.id,
                session.goal_id,
                session.step_id,
                session.started_at,
                session.ended_at,
                session.effort_applied,
                session.progress_delta,
                to_json(&session.skills_practiced),
                session.success,
            ],
        )
        .context("Failed to append pursuit session")?;
        Ok(())
    }

    fn upsert_pattern(&self, pattern: &MemoryPattern) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO memory_patterns
            (id, description, occurrences, strength, first_seen, last_seen, related_concepts)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                pattern.id,
                pattern.description,
                pattern.occurrences,
                pattern.strength,
                pattern.first_seen,
                pattern.last_seen,
                to_json(&pattern.related_concepts),
            ],
        )
        .context("Failed to save memory pattern")?;
        Ok(())
    }

    fn delete_patterns(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock();
        let mut deleted = 0;
        for id in ids {
            deleted += conn.execute("DELETE FROM memory_patterns WHERE id = ?1", params![id])?;
        }
        Ok(deleted)
    }

    fn load_patterns(&self) -> Result<Vec<MemoryPattern>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, description, occurrences, strength, first_seen, last_seen, related_concepts
             FROM memory_patterns ORDER BY first_seen ASC",
        )?;
        let patterns = stmt
            .query_map([], Self::load_pattern)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(patterns)
    }

    fn append_insight(&self, insight: &ConsolidatedInsight) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO insights (timestamp, insight, source_excerpts, confidence, category, applications)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                insight.timestamp,
                insight.insight,
                to_json(&insight.source_excerpts),
                insight.confidence,
                insight.category,
                to_json(&insight.applications),
            ],
        )
        .context("Failed to append insight")?;
        Ok(())
    }

    fn recent_insights(&self, limit: usize) -> Result<Vec<ConsolidatedInsight>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp, insight, source_excerpts, confidence, category, applications
             FROM insights ORDER BY id DESC LIMIT ?1",
        )?;
        let insights = stmt
            .query_map(params![limit as i64], Self::load_insight)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(insights)
    }
}
