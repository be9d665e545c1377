//! Agent and run records tracked by the state store.
//!
//! One `AgentRecord` exists per task (primary key = canonical task id);
//! `RunRecord`s are the append-only history of execution attempts. Updates
//! flow through [`AgentUpdate`] patches with field-wise merge semantics so
//! concurrent writers touching disjoint fields never clobber each other.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::branching::BranchingStrategy;

/// Lifecycle status of an agent.
///
/// `spawned → running → [completed|failed|blocked]`; `spawned|running →
/// [killed]` on external termination; `running → [orphaned]` when the
/// process is found dead without a recorded terminal status. A recovered
/// orphan re-enters `spawned`. The store accepts any status write; this
/// machine is a caller invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Spawned,
    Running,
    Completed,
    Failed,
    Blocked,
    Killed,
    Orphaned,
}

impl AgentStatus {
    /// True for statuses that end an attempt.
    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }

    /// True while the agent may still be doing work.
    pub fn is_live(self) -> bool {
        matches!(self, AgentStatus::Spawned | AgentStatus::Running)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AgentStatus::Spawned => "spawned",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
            AgentStatus::Blocked => "blocked",
            AgentStatus::Killed => "killed",
            AgentStatus::Orphaned => "orphaned",
        };
        f.write_str(label)
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spawned" => Ok(AgentStatus::Spawned),
            "running" => Ok(AgentStatus::Running),
            "completed" => Ok(AgentStatus::Completed),
            "failed" => Ok(AgentStatus::Failed),
            "blocked" => Ok(AgentStatus::Blocked),
            "killed" => Ok(AgentStatus::Killed),
            "orphaned" => Ok(AgentStatus::Orphaned),
            other => Err(format!("unknown agent status '{other}'")),
        }
    }
}

/// Persisted lifecycle state of one task's execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Canonical task id (`T007`).
    pub task_id: String,
    pub status: AgentStatus,
    /// ISO-8601 timestamp of the first spawn.
    pub spawned_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Signal name if the process was terminated by one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branching_strategy: Option<BranchingStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Modified tracked files in the worktree at completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirty_files: Option<u32>,
    /// All pending entries (tracked + untracked) at completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncommitted_files: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovered_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub killed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orphaned_at: Option<String>,
}

impl AgentRecord {
    /// Fresh record with defaults for a first write.
    pub fn fresh(task_id: &str, spawned_at: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: AgentStatus::Spawned,
            spawned_at: spawned_at.to_string(),
            ended_at: None,
            pid: None,
            exit_code: None,
            signal: None,
            worktree_path: None,
            branch: None,
            base_branch: None,
            branching_strategy: None,
            mission_file: None,
            log_file: None,
            timeout_secs: None,
            dirty_files: None,
            uncommitted_files: None,
            recovered_at: None,
            killed_at: None,
            orphaned_at: None,
        }
    }

    /// Merge a patch into this record. Unset patch fields leave the record
    /// untouched.
    pub fn apply(&mut self, update: &AgentUpdate) {
        macro_rules! merge {
            ($field:ident) => {
                if let Some(value) = &update.$field {
                    self.$field = Some(value.clone());
                }
            };
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(spawned_at) = &update.spawned_at {
            self.spawned_at = spawned_at.clone();
        }
        merge!(ended_at);
        merge!(pid);
        merge!(exit_code);
        merge!(signal);
        merge!(worktree_path);
        merge!(branch);
        merge!(base_branch);
        merge!(branching_strategy);
        merge!(mission_file);
        merge!(log_file);
        merge!(timeout_secs);
        merge!(dirty_files);
        merge!(uncommitted_files);
        merge!(recovered_at);
        merge!(killed_at);
        merge!(orphaned_at);
    }
}

/// Field-wise patch applied by `AgentStore::upsert`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub status: Option<AgentStatus>,
    pub spawned_at: Option<String>,
    pub ended_at: Option<String>,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
    pub worktree_path: Option<PathBuf>,
    pub branch: Option<String>,
    pub base_branch: Option<String>,
    pub branching_strategy: Option<BranchingStrategy>,
    pub mission_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub dirty_files: Option<u32>,
    pub uncommitted_files: Option<u32>,
    pub recovered_at: Option<String>,
    pub killed_at: Option<String>,
    pub orphaned_at: Option<String>,
}

impl AgentUpdate {
    pub fn status(status: AgentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// One execution attempt for a task. Append-only; only `ended_at` and
/// `exit_code` are ever set after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub task_id: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}
