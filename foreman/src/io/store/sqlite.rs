//! SQLite-backed agent store.
//!
//! WAL journaling lets concurrent readers proceed while a single writer
//! holds the write lock; `busy_timeout` makes competing writers queue
//! instead of erroring. The field-wise upsert is one `INSERT .. ON
//! CONFLICT` statement, so a same-key race cannot produce a lost update.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use crate::core::agent::{AgentRecord, AgentStatus, AgentUpdate, RunRecord};
use crate::core::branching::BranchingStrategy;
use crate::io::memory::now_timestamp;
use crate::io::store::AgentStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agents (
    task_id            TEXT PRIMARY KEY,
    status             TEXT NOT NULL,
    spawned_at         TEXT NOT NULL,
    ended_at           TEXT,
    pid                INTEGER,
    exit_code          INTEGER,
    signal             TEXT,
    worktree_path      TEXT,
    branch             TEXT,
    base_branch        TEXT,
    branching_strategy TEXT,
    mission_file       TEXT,
    log_file           TEXT,
    timeout_secs       INTEGER,
    dirty_files        INTEGER,
    uncommitted_files  INTEGER,
    recovered_at       TEXT,
    killed_at          TEXT,
    orphaned_at        TEXT
);
CREATE TABLE IF NOT EXISTS runs (
    id         TEXT PRIMARY KEY,
    task_id    TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at   TEXT,
    exit_code  INTEGER,
    log_file   TEXT
);
CREATE INDEX IF NOT EXISTS runs_task_id ON runs(task_id);
";

const UPSERT: &str = "
INSERT INTO agents (
    task_id, status, spawned_at, ended_at, pid, exit_code, signal,
    worktree_path, branch, base_branch, branching_strategy, mission_file,
    log_file, timeout_secs, dirty_files, uncommitted_files, recovered_at,
    killed_at, orphaned_at
) VALUES (
    ?1, COALESCE(?2, 'spawned'), COALESCE(?3, ?20), ?4, ?5, ?6, ?7,
    ?8, ?9, ?10, ?11, ?12,
    ?13, ?14, ?15, ?16, ?17,
    ?18, ?19
)
ON CONFLICT(task_id) DO UPDATE SET
    status             = COALESCE(?2, status),
    spawned_at         = COALESCE(?3, spawned_at),
    ended_at           = COALESCE(?4, ended_at),
    pid                = COALESCE(?5, pid),
    exit_code          = COALESCE(?6, exit_code),
    signal             = COALESCE(?7, signal),
    worktree_path      = COALESCE(?8, worktree_path),
    branch             = COALESCE(?9, branch),
    base_branch        = COALESCE(?10, base_branch),
    branching_strategy = COALESCE(?11, branching_strategy),
    mission_file       = COALESCE(?12, mission_file),
    log_file           = COALESCE(?13, log_file),
    timeout_secs       = COALESCE(?14, timeout_secs),
    dirty_files        = COALESCE(?15, dirty_files),
    uncommitted_files  = COALESCE(?16, uncommitted_files),
    recovered_at       = COALESCE(?17, recovered_at),
    killed_at          = COALESCE(?18, killed_at),
    orphaned_at        = COALESCE(?19, orphaned_at)
";

const AGENT_COLUMNS: &str = "
    task_id, status, spawned_at, ended_at, pid, exit_code, signal,
    worktree_path, branch, base_branch, branching_strategy, mission_file,
    log_file, timeout_secs, dirty_files, uncommitted_files, recovered_at,
    killed_at, orphaned_at
";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create state directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open agent store {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("enable WAL journaling")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("set busy timeout")?;
        conn.execute_batch(SCHEMA).context("apply store schema")?;
        debug!(path = %path.display(), "opened sqlite agent store");
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory store")?;
        conn.execute_batch(SCHEMA).context("apply store schema")?;
        Ok(Self { conn })
    }
}

impl AgentStore for SqliteStore {
    fn upsert(&mut self, task_id: &str, update: &AgentUpdate) -> Result<AgentRecord> {
        self.conn
            .execute(
                UPSERT,
                params![
                    task_id,
                    update.status.map(|s| s.to_string()),
                    update.spawned_at,
                    update.ended_at,
                    update.pid,
                    update.exit_code,
                    update.signal,
                    update.worktree_path.as_ref().map(path_text),
                    update.branch,
                    update.base_branch,
                    update.branching_strategy.map(|s| s.to_string()),
                    update.mission_file.as_ref().map(path_text),
                    update.log_file.as_ref().map(path_text),
                    update.timeout_secs,
                    update.dirty_files,
                    update.uncommitted_files,
                    update.recovered_at,
                    update.killed_at,
                    update.orphaned_at,
                    now_timestamp(),
                ],
            )
            .with_context(|| format!("upsert agent {task_id}"))?;
        self.get(task_id)?
            .ok_or_else(|| anyhow!("agent {task_id} missing after upsert"))
    }

    fn get(&self, task_id: &str) -> Result<Option<AgentRecord>> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE task_id = ?1");
        self.conn
            .query_row(&sql, params![task_id], row_to_record)
            .optional()
            .with_context(|| format!("get agent {task_id}"))
    }

    fn list(&self, status: Option<AgentStatus>) -> Result<Vec<AgentRecord>> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY spawned_at DESC, task_id");
        let mut stmt = self.conn.prepare(&sql).context("prepare agent list")?;
        let rows = stmt
            .query_map([], row_to_record)
            .context("query agent list")?;
        let mut records = Vec::new();
        for row in rows {
            let record = row.context("read agent row")?;
            if status.is_none_or(|s| record.status == s) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn delete(&mut self, task_id: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM agents WHERE task_id = ?1", params![task_id])
            .with_context(|| format!("delete agent {task_id}"))?;
        Ok(changed > 0)
    }

    fn clear(&mut self) -> Result<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM agents", [])
            .context("clear agents")?;
        Ok(changed)
    }

    fn create_run(&mut self, task_id: &str, log_file: Option<&Path>) -> Result<RunRecord> {
        let run = RunRecord {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            started_at: now_timestamp(),
            ended_at: None,
            exit_code: None,
            log_file: log_file.map(Path::to_path_buf),
        };
        self.conn
            .execute(
                "INSERT INTO runs (id, task_id, started_at, log_file) VALUES (?1, ?2, ?3, ?4)",
                params![
                    run.id,
                    run.task_id,
                    run.started_at,
                    run.log_file.as_ref().map(path_text)
                ],
            )
            .with_context(|| format!("create run for {task_id}"))?;
        Ok(run)
    }

    fn complete_run(&mut self, run_id: &str, exit_code: Option<i32>) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE runs SET ended_at = ?2, exit_code = ?3
                 WHERE id = ?1 AND ended_at IS NULL",
                params![run_id, now_timestamp(), exit_code],
            )
            .with_context(|| format!("complete run {run_id}"))?;
        if changed == 0 {
            bail!("run {run_id} not found or already completed");
        }
        Ok(())
    }

    fn runs_for(&self, task_id: &str) -> Result<Vec<RunRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, task_id, started_at, ended_at, exit_code, log_file
                 FROM runs WHERE task_id = ?1 ORDER BY started_at DESC, id",
            )
            .context("prepare run list")?;
        let rows = stmt
            .query_map(params![task_id], row_to_run)
            .context("query run list")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("read runs for {task_id}"))
    }
}

fn path_text(path: &PathBuf) -> String {
    path.display().to_string()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AgentRecord> {
    let status: String = row.get(1)?;
    let status: AgentStatus = status.parse().map_err(|e: String| text_error(1, e))?;
    let strategy: Option<String> = row.get(10)?;
    let branching_strategy = strategy
        .map(|s| s.parse::<BranchingStrategy>().map_err(|e| text_error(10, e)))
        .transpose()?;

    Ok(AgentRecord {
        task_id: row.get(0)?,
        status,
        spawned_at: row.get(2)?,
        ended_at: row.get(3)?,
        pid: row.get(4)?,
        exit_code: row.get(5)?,
        signal: row.get(6)?,
        worktree_path: row.get::<_, Option<String>>(7)?.map(PathBuf::from),
        branch: row.get(8)?,
        base_branch: row.get(9)?,
        branching_strategy,
        mission_file: row.get::<_, Option<String>>(11)?.map(PathBuf::from),
        log_file: row.get::<_, Option<String>>(12)?.map(PathBuf::from),
        timeout_secs: row.get(13)?,
        dirty_files: row.get(14)?,
        uncommitted_files: row.get(15)?,
        recovered_at: row.get(16)?,
        killed_at: row.get(17)?,
        orphaned_at: row.get(18)?,
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        exit_code: row.get(4)?,
        log_file: row.get::<_, Option<String>>(5)?.map(PathBuf::from),
    })
}

fn text_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_upsert_defaults_to_spawned() {
        let mut store = SqliteStore::in_memory().expect("open");
        let record = store
            .upsert("T001", &AgentUpdate::default())
            .expect("upsert");
        assert_eq!(record.status, AgentStatus::Spawned);
        assert!(!record.spawned_at.is_empty());
    }

    #[test]
    fn upsert_is_an_update_not_a_duplicate_insert() {
        let mut store = SqliteStore::in_memory().expect("open");
        store.upsert("T001", &AgentUpdate::default()).expect("first");
        store
            .upsert("T001", &AgentUpdate::status(AgentStatus::Running))
            .expect("second");

        assert_eq!(store.list(None).expect("list").len(), 1);
    }

    #[test]
    fn complete_run_is_write_once() {
        let mut store = SqliteStore::in_memory().expect("open");
        let run = store.create_run("T001", None).expect("create");

        store.complete_run(&run.id, Some(0)).expect("complete");
        let err = store.complete_run(&run.id, Some(1)).unwrap_err();
        assert!(err.to_string().contains("already completed"));

        let runs = store.runs_for("T001").expect("runs");
        assert_eq!(runs[0].exit_code, Some(0));
    }
}
