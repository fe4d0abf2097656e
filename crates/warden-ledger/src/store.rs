use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use warden_core::{ExecutionId, JobId, Result, WardenError};

use crate::execution::{AgentExecution, ExecutionStatus};

/// Result row persisted by a worker after executing a job. `job_id` is
/// nullable because the same table also holds rows for inline work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHistoryRecord {
    pub id: String,
    pub job_id: Option<JobId>,
    pub kind: String,
    pub ok: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable synthesized record of a proposal outcome, written once and
/// retrieved by downstream learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub proposal_id: String,
    pub summary: String,
    pub success: bool,
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// The durable store: execution ledger, job history, episodes.
pub struct LedgerStore {
    db: Arc<Mutex<Connection>>,
}

impl LedgerStore {
    /// Open or create the ledger database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening ledger store");

        let conn = Connection::open(path).map_err(|e| WardenError::Ledger(e.to_string()))?;

        // WAL mode for concurrent readers alongside the writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| WardenError::Ledger(e.to_string()))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                workspace_id TEXT NOT NULL,
                status TEXT NOT NULL,
                input_summary TEXT NOT NULL,
                output_summary TEXT,
                triggered_by TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                duration_ms INTEGER,
                error_message TEXT,
                checksum TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_executions_agent_workspace
                ON executions(agent_id, workspace_id);
            CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status);

            CREATE TABLE IF NOT EXISTS job_history (
                id TEXT PRIMARY KEY,
                job_id TEXT,
                kind TEXT NOT NULL,
                ok INTEGER NOT NULL,
                output TEXT,
                error TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_job_history_job_id ON job_history(job_id);

            CREATE TABLE IF NOT EXISTS episodes (
                id TEXT PRIMARY KEY,
                proposal_id TEXT NOT NULL,
                summary TEXT NOT NULL,
                success INTEGER NOT NULL,
                topics TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_episodes_proposal ON episodes(proposal_id);
            ",
        )
        .map_err(|e| WardenError::Ledger(e.to_string()))?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    // ── Execution ledger ───────────────────────────────────────

    /// Create a `running` row. Must be called before any side-effecting
    /// dispatch starts so a crash mid-dispatch is recoverable.
    pub fn begin_execution(
        &self,
        agent_id: &str,
        workspace_id: &str,
        input_summary: &str,
        triggered_by: &str,
    ) -> Result<ExecutionId> {
        let id = Uuid::new_v4().to_string();
        let started_at = Utc::now().to_rfc3339();
        let checksum = audit_checksum(
            format!("{id}:{agent_id}:{workspace_id}:{input_summary}:{triggered_by}:{started_at}")
                .as_bytes(),
        );

        let db = self.db.lock();
        db.execute(
            "INSERT INTO executions
                (id, agent_id, workspace_id, status, input_summary, triggered_by, started_at, checksum)
             VALUES (?1, ?2, ?3, 'running', ?4, ?5, ?6, ?7)",
            rusqlite::params![id, agent_id, workspace_id, input_summary, triggered_by, started_at, checksum],
        )
        .map_err(|e| WardenError::Ledger(e.to_string()))?;
        Ok(id)
    }

    /// Finalize a row to exactly one terminal status. A second finish on
    /// the same row is a ledger inconsistency, not a silent overwrite.
    pub fn finish_execution(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
        output_summary: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(WardenError::Ledger(format!(
                "finish_execution requires a terminal status, got '{status}'"
            )));
        }

        let db = self.db.lock();
        let started_at: Option<String> = db
            .query_row(
                "SELECT started_at FROM executions WHERE id = ?1",
                rusqlite::params![execution_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(WardenError::Ledger(other.to_string())),
            })?;
        let Some(started_at) = started_at else {
            return Err(WardenError::Ledger(format!(
                "unknown execution: {execution_id}"
            )));
        };

        let completed = Utc::now();
        let duration_ms = DateTime::parse_from_rfc3339(&started_at)
            .map(|s| (completed - s.with_timezone(&Utc)).num_milliseconds())
            .unwrap_or(0);

        let updated = db
            .execute(
                "UPDATE executions
                 SET status = ?2, output_summary = ?3, error_message = ?4,
                     completed_at = ?5, duration_ms = ?6
                 WHERE id = ?1 AND status = 'running'",
                rusqlite::params![
                    execution_id,
                    status.as_str(),
                    output_summary,
                    error_message,
                    completed.to_rfc3339(),
                    duration_ms
                ],
            )
            .map_err(|e| WardenError::Ledger(e.to_string()))?;

        if updated == 0 {
            return Err(WardenError::LedgerInconsistency(format!(
                "execution {execution_id} already has a terminal status"
            )));
        }
        Ok(())
    }

    pub fn get_execution(&self, execution_id: &str) -> Result<Option<AgentExecution>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(&format!("{EXECUTION_SELECT} WHERE id = ?1"))
            .map_err(|e| WardenError::Ledger(e.to_string()))?;
        let mut rows = stmt
            .query_map(rusqlite::params![execution_id], row_to_execution)
            .map_err(|e| WardenError::Ledger(e.to_string()))?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| WardenError::Ledger(e.to_string()))?)),
            None => Ok(None),
        }
    }

    /// Indexed query: all executions for an agent in a workspace, newest first.
    pub fn executions_for(&self, agent_id: &str, workspace_id: &str) -> Result<Vec<AgentExecution>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(&format!(
                "{EXECUTION_SELECT} WHERE agent_id = ?1 AND workspace_id = ?2 ORDER BY started_at DESC"
            ))
            .map_err(|e| WardenError::Ledger(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![agent_id, workspace_id], row_to_execution)
            .map_err(|e| WardenError::Ledger(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Indexed query: all executions with a given status.
    pub fn executions_with_status(&self, status: ExecutionStatus) -> Result<Vec<AgentExecution>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(&format!(
                "{EXECUTION_SELECT} WHERE status = ?1 ORDER BY started_at ASC"
            ))
            .map_err(|e| WardenError::Ledger(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![status.as_str()], row_to_execution)
            .map_err(|e| WardenError::Ledger(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Crash recovery: fail every `running` row older than `timeout` with a
    /// synthetic error. Returns the repaired ids.
    pub fn reconcile_stale(&self, timeout: Duration) -> Result<Vec<ExecutionId>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(timeout)
                .map_err(|e| WardenError::Ledger(e.to_string()))?;

        let stale: Vec<(String, String)> = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare(
                    "SELECT id, started_at FROM executions
                     WHERE status = 'running' AND started_at < ?1",
                )
                .map_err(|e| WardenError::Ledger(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![cutoff.to_rfc3339()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| WardenError::Ledger(e.to_string()))?;
            rows.filter_map(|r| r.ok()).collect()
        };

        let mut repaired = Vec::new();
        for (id, started_at) in stale {
            warn!(
                execution_id = %id,
                %started_at,
                "ledger inconsistency: execution stuck in 'running' past timeout — failing it"
            );
            let synthetic = format!(
                "execution exceeded {}s without finalization; failed by reconciliation",
                timeout.as_secs()
            );
            match self.finish_execution(&id, ExecutionStatus::Failed, None, Some(&synthetic)) {
                Ok(()) => repaired.push(id),
                // Raced with a late finish — the row reached a terminal
                // state on its own, which is the better outcome.
                Err(WardenError::LedgerInconsistency(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(repaired)
    }

    // ── Job history ────────────────────────────────────────────

    /// Persist a worker result. One row per job id; redelivered jobs are
    /// deduped by looking the id up first.
    pub fn record_job_result(
        &self,
        job_id: Option<&str>,
        kind: &str,
        ok: bool,
        output: Option<&str>,
        error: Option<&str>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let db = self.db.lock();
        db.execute(
            "INSERT INTO job_history (id, job_id, kind, ok, output, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                id,
                job_id,
                kind,
                ok as i64,
                output,
                error,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| WardenError::Ledger(e.to_string()))?;
        Ok(id)
    }

    /// Look up the history record for a job id (dedupe check on redelivery).
    pub fn find_job_result(&self, job_id: &str) -> Result<Option<JobHistoryRecord>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, job_id, kind, ok, output, error, created_at
                 FROM job_history WHERE job_id = ?1 LIMIT 1",
            )
            .map_err(|e| WardenError::Ledger(e.to_string()))?;
        let mut rows = stmt
            .query_map(rusqlite::params![job_id], row_to_history)
            .map_err(|e| WardenError::Ledger(e.to_string()))?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| WardenError::Ledger(e.to_string()))?)),
            None => Ok(None),
        }
    }

    // ── Episodes ───────────────────────────────────────────────

    /// Write an episode. Episodes are immutable — there is no update path,
    /// and reusing an id is an error.
    pub fn insert_episode(&self, episode: &Episode) -> Result<()> {
        let topics_json = serde_json::to_string(&episode.topics)?;
        let db = self.db.lock();
        db.execute(
            "INSERT INTO episodes (id, proposal_id, summary, success, topics, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                episode.id,
                episode.proposal_id,
                episode.summary,
                episode.success as i64,
                topics_json,
                episode.created_at.to_rfc3339()
            ],
        )
        .map_err(|e| WardenError::Ledger(e.to_string()))?;
        Ok(())
    }

    pub fn episodes_for_proposal(&self, proposal_id: &str) -> Result<Vec<Episode>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, proposal_id, summary, success, topics, created_at
                 FROM episodes WHERE proposal_id = ?1 ORDER BY created_at ASC",
            )
            .map_err(|e| WardenError::Ledger(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![proposal_id], row_to_episode)
            .map_err(|e| WardenError::Ledger(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

const EXECUTION_SELECT: &str = "SELECT id, agent_id, workspace_id, status, input_summary, \
     output_summary, triggered_by, started_at, completed_at, duration_ms, error_message \
     FROM executions";

fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentExecution> {
    let status_str: String = row.get(3)?;
    let started_str: String = row.get(7)?;
    let completed_str: Option<String> = row.get(8)?;
    Ok(AgentExecution {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        workspace_id: row.get(2)?,
        status: ExecutionStatus::parse(&status_str).unwrap_or(ExecutionStatus::Failed),
        input_summary: row.get(4)?,
        output_summary: row.get(5)?,
        triggered_by: row.get(6)?,
        started_at: parse_timestamp(&started_str),
        completed_at: completed_str.as_deref().map(parse_timestamp),
        duration_ms: row.get(9)?,
        error_message: row.get(10)?,
    })
}

fn row_to_history(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobHistoryRecord> {
    let ok: i64 = row.get(3)?;
    let created_str: String = row.get(6)?;
    Ok(JobHistoryRecord {
        id: row.get(0)?,
        job_id: row.get(1)?,
        kind: row.get(2)?,
        ok: ok != 0,
        output: row.get(4)?,
        error: row.get(5)?,
        created_at: parse_timestamp(&created_str),
    })
}

fn row_to_episode(row: &rusqlite::Row<'_>) -> rusqlite::Result<Episode> {
    let success: i64 = row.get(3)?;
    let topics_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;
    Ok(Episode {
        id: row.get(0)?,
        proposal_id: row.get(1)?,
        summary: row.get(2)?,
        success: success != 0,
        topics: serde_json::from_str(&topics_str).unwrap_or_default(),
        created_at: parse_timestamp(&created_str),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Simple hash for audit checksums (would use an HMAC with a deployment
/// key in production).
fn audit_checksum(data: &[u8]) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
