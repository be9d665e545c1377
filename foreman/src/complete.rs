//! Orchestration for ending an agent's attempt.
//!
//! Completion records the terminal status and workspace drift counters,
//! closes the latest open run, and folds the task's log upward into its
//! epic. Killing escalates SIGTERM → SIGKILL and records which signal
//! landed.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument};

use crate::core::agent::{AgentRecord, AgentStatus, AgentUpdate};
use crate::core::ident::{ArtefactId, ArtefactKind};
use crate::io::git::Git;
use crate::io::init::ForemanPaths;
use crate::io::memory::now_timestamp;
use crate::io::process::terminate;
use crate::io::resolver::Resolver;
use crate::io::store::AgentStore;
use crate::io::workspace::workspace_path;
use crate::merge::{MergeOutcome, merge_task_log};

const KILL_GRACE: Duration = Duration::from_secs(5);

/// Options for `complete_task`.
#[derive(Debug, Clone, Default)]
pub struct CompleteOptions {
    pub exit_code: Option<i32>,
    /// Explicit log path for the upward merge.
    pub log_file: Option<PathBuf>,
}

/// Result of completing a task.
#[derive(Debug)]
pub struct CompleteOutcome {
    pub record: AgentRecord,
    pub merge: MergeOutcome,
}

/// Record a terminal status for a task and fold its log upward.
///
/// Only `completed`, `failed`, and `blocked` are valid here; external
/// termination goes through [`kill_task`] and dead-process discovery
/// through `scan`.
#[instrument(skip_all, fields(task = raw_task, status = %status))]
pub fn complete_task(
    paths: &ForemanPaths,
    resolver: &mut Resolver,
    store: &mut dyn AgentStore,
    raw_task: &str,
    status: AgentStatus,
    options: &CompleteOptions,
) -> Result<CompleteOutcome> {
    if !matches!(
        status,
        AgentStatus::Completed | AgentStatus::Failed | AgentStatus::Blocked
    ) {
        bail!("'{status}' is not a completion status (use kill/scan for external termination)");
    }

    let task = parse_task(raw_task)?;
    let task_id = task.canonical();

    let (dirty_files, uncommitted_files) = workspace_counters(paths, &task)?;

    let record = store.set_status(
        &task_id,
        status,
        &AgentUpdate {
            ended_at: Some(now_timestamp()),
            exit_code: options.exit_code,
            dirty_files,
            uncommitted_files,
            ..AgentUpdate::default()
        },
    )?;

    if let Some(open_run) = store
        .runs_for(&task_id)?
        .into_iter()
        .find(|run| run.ended_at.is_none())
    {
        store
            .complete_run(&open_run.id, options.exit_code)
            .with_context(|| format!("close run {}", open_run.id))?;
    }

    let merge = merge_task_log(
        resolver,
        &paths.memory_root,
        raw_task,
        options.log_file.as_deref(),
    )?;

    info!(task = %task_id, merged = merge.merged, "task completed");
    Ok(CompleteOutcome { record, merge })
}

/// Terminate a task's agent process and mark the record killed.
#[instrument(skip_all, fields(task = raw_task))]
pub fn kill_task(store: &mut dyn AgentStore, raw_task: &str) -> Result<AgentRecord> {
    let task = parse_task(raw_task)?;
    let task_id = task.canonical();
    let record = store
        .get(&task_id)?
        .ok_or_else(|| anyhow!("no agent record for {task_id}"))?;
    if record.status.is_terminal() {
        bail!("agent for {task_id} already ended ({})", record.status);
    }

    let signal = match record.pid {
        Some(pid) => terminate(pid, KILL_GRACE),
        None => None,
    };
    debug!(task = %task_id, pid = ?record.pid, signal = ?signal, "killed agent");

    let now = now_timestamp();
    store.set_status(
        &task_id,
        AgentStatus::Killed,
        &AgentUpdate {
            killed_at: Some(now.clone()),
            ended_at: Some(now),
            signal: signal.map(str::to_string),
            ..AgentUpdate::default()
        },
    )
}

fn parse_task(raw: &str) -> Result<ArtefactId> {
    ArtefactId::parse(ArtefactKind::Task, raw)
        .ok_or_else(|| anyhow!("invalid task id '{raw}'"))
}

/// Count pending changes in the task's worktree: (modified tracked files,
/// all pending entries). `(None, None)` when the workspace is gone.
fn workspace_counters(
    paths: &ForemanPaths,
    task: &ArtefactId,
) -> Result<(Option<u32>, Option<u32>)> {
    let path = workspace_path(&paths.worktrees_root, task);
    if !path.exists() {
        return Ok((None, None));
    }
    let entries = Git::new(&path).status_porcelain()?;
    let total = entries.len() as u32;
    let dirty = entries.iter().filter(|e| !e.is_untracked()).count() as u32;
    Ok((Some(dirty), Some(total)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::ForemanConfig;
    use crate::io::store::SqliteStore;
    use crate::spawn::{SpawnOptions, spawn_agent};
    use crate::test_support::{ArtefactTree, artefact, init_git_repo};

    fn spawn_t7() -> (ArtefactTree, ForemanPaths, SqliteStore, Resolver) {
        let tree = ArtefactTree::new();
        tree.prd(1)
            .task(&artefact("T007", "Open").parent("PRD-001 / E003"));
        tree.prd(1).epic(&artefact("E003", "Open").title("Parser"));
        init_git_repo(tree.root());

        let cfg = ForemanConfig::default();
        let paths = ForemanPaths::resolved(tree.root(), &cfg);
        let mut resolver = Resolver::new(tree.prds_dir());
        let mut store = SqliteStore::in_memory().expect("store");
        spawn_agent(
            &paths,
            &cfg,
            &mut resolver,
            &mut store,
            "T007",
            &SpawnOptions::default(),
        )
        .expect("spawn");
        (tree, paths, store, resolver)
    }

    /// Verifies the spawn → complete lifecycle end-to-end: terminal status,
    /// preserved spawn fields, closed run, merged log.
    #[test]
    fn complete_closes_run_and_merges_log() {
        let (tree, paths, mut store, mut resolver) = spawn_t7();
        std::fs::write(
            paths.memory_root.join("T007.log"),
            "2024-01-01T00:00:00.000Z [INFO] done\n",
        )
        .expect("write log");

        let outcome = complete_task(
            &paths,
            &mut resolver,
            &mut store,
            "T007",
            AgentStatus::Completed,
            &CompleteOptions {
                exit_code: Some(0),
                log_file: None,
            },
        )
        .expect("complete");

        assert_eq!(outcome.record.status, AgentStatus::Completed);
        assert_eq!(outcome.record.exit_code, Some(0));
        // Fields written at spawn time survive the transition.
        assert_eq!(outcome.record.branch.as_deref(), Some("task/T007"));
        assert!(outcome.record.ended_at.is_some());

        let runs = store.runs_for("T007").expect("runs");
        assert!(runs[0].ended_at.is_some());
        assert_eq!(runs[0].exit_code, Some(0));

        assert!(outcome.merge.merged);
        assert!(
            std::fs::read_to_string(tree.memory_root().join("E003.log"))
                .expect("epic log")
                .contains("[T007] [INFO] done")
        );
    }

    #[test]
    fn complete_captures_workspace_counters() {
        let (_tree, paths, mut store, mut resolver) = spawn_t7();
        let worktree = workspace_path(&paths.worktrees_root, &parse_task("T007").expect("id"));
        std::fs::write(worktree.join("scratch.txt"), "wip\n").expect("write");

        let outcome = complete_task(
            &paths,
            &mut resolver,
            &mut store,
            "T007",
            AgentStatus::Failed,
            &CompleteOptions::default(),
        )
        .expect("complete");

        assert_eq!(outcome.record.dirty_files, Some(0));
        assert_eq!(outcome.record.uncommitted_files, Some(1));
    }

    #[test]
    fn rejects_non_completion_statuses() {
        let (_tree, paths, mut store, mut resolver) = spawn_t7();

        let err = complete_task(
            &paths,
            &mut resolver,
            &mut store,
            "T007",
            AgentStatus::Killed,
            &CompleteOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a completion status"));
    }

    #[test]
    fn kill_without_pid_still_marks_killed() {
        let (_tree, _paths, mut store, _resolver) = spawn_t7();

        let record = kill_task(&mut store, "T007").expect("kill");
        assert_eq!(record.status, AgentStatus::Killed);
        assert!(record.killed_at.is_some());
        assert_eq!(record.signal, None);

        let err = kill_task(&mut store, "T007").unwrap_err();
        assert!(err.to_string().contains("already ended"));
    }
}
