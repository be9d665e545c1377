//! Agent state store: one record per task, append-only run history.
//!
//! Two interchangeable backends implement the same [`AgentStore`] trait:
//! an embedded SQLite database (WAL journaling, concurrent readers) and a
//! JSON document collection guarded by a file lock. Both guarantee atomic
//! same-key upserts and a unique key per task id. Store errors propagate:
//! silently losing agent state is worse than failing the operation.

mod docs;
mod sqlite;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::agent::{AgentRecord, AgentStatus, AgentUpdate, RunRecord};
use crate::io::init::ForemanPaths;

pub use docs::DocStore;
pub use sqlite::SqliteStore;

/// Which store implementation backs `.foreman/state/`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Docs,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Sqlite => f.write_str("sqlite"),
            StoreBackend::Docs => f.write_str("docs"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "docs" => Ok(StoreBackend::Docs),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Concurrency-safe persistent store of agent and run records.
///
/// `upsert` merges field-wise: unset patch fields leave an existing record
/// untouched, and a first write creates a fresh record with defaults. The
/// store accepts any status write; the lifecycle machine is upheld by the
/// orchestration callers.
pub trait AgentStore {
    /// Merge a patch into the record for `task_id`, creating it if needed.
    fn upsert(&mut self, task_id: &str, update: &AgentUpdate) -> Result<AgentRecord>;

    fn get(&self, task_id: &str) -> Result<Option<AgentRecord>>;

    /// All records, newest spawn first, optionally filtered by status.
    fn list(&self, status: Option<AgentStatus>) -> Result<Vec<AgentRecord>>;

    /// Remove one record. Returns whether it existed.
    fn delete(&mut self, task_id: &str) -> Result<bool>;

    /// Remove all agent records. Returns how many were removed.
    fn clear(&mut self) -> Result<usize>;

    /// Transition a record's status, merging any extra fields in the same
    /// atomic write.
    fn set_status(
        &mut self,
        task_id: &str,
        status: AgentStatus,
        extra: &AgentUpdate,
    ) -> Result<AgentRecord> {
        let mut update = extra.clone();
        update.status = Some(status);
        self.upsert(task_id, &update)
    }

    /// Record the start of an execution attempt.
    fn create_run(&mut self, task_id: &str, log_file: Option<&Path>) -> Result<RunRecord>;

    /// Set a run's end time and exit code, once.
    fn complete_run(&mut self, run_id: &str, exit_code: Option<i32>) -> Result<()>;

    /// Execution attempts for a task, newest start first.
    fn runs_for(&self, task_id: &str) -> Result<Vec<RunRecord>>;
}

/// Open the configured store backend under the state directory.
pub fn open_store(paths: &ForemanPaths, backend: StoreBackend) -> Result<Box<dyn AgentStore>> {
    match backend {
        StoreBackend::Sqlite => Ok(Box::new(SqliteStore::open(&paths.agents_db_path)?)),
        StoreBackend::Docs => Ok(Box::new(DocStore::open(
            &paths.agents_doc_path,
            &paths.runs_doc_path,
            &paths.store_lock_path,
        ))),
    }
}
