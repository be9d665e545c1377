//! Per-task workspace (git worktree + branch) management.
//!
//! Each task owns a distinct worktree directory and a `task/<TaskID>`
//! branch, so workspaces for different tasks never share mutable state.
//! Removal detaches the worktree first; branch deletion is best-effort and
//! recorded in the outcome's attempt list rather than failing the removal.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::branching::task_branch;
use crate::core::ident::{ArtefactId, ArtefactKind};
use crate::io::git::Git;

/// Input for `create_workspace`.
#[derive(Debug, Clone)]
pub struct CreateRequest<'a> {
    pub repo_root: &'a Path,
    pub worktrees_root: &'a Path,
    pub task: &'a ArtefactId,
    /// Branch the task branch forks from. Defaults to the current branch of
    /// the main working tree, captured at call time.
    pub base_branch: Option<String>,
}

/// A created workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    pub path: PathBuf,
    pub branch: String,
    /// The base actually used, so the caller can persist it.
    pub base_branch: String,
}

/// Options for `remove_workspace`.
#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    /// Discard local modifications in the worktree.
    pub force: bool,
    /// Leave the task branch in place.
    pub keep_branch: bool,
}

/// One best-effort step that failed during removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    pub operation: String,
    pub error: String,
}

/// Result of a workspace removal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub removed: bool,
    pub branch_deleted: bool,
    pub attempts: Vec<AttemptError>,
}

/// One registered worktree, with the owning task when recognizable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceEntry {
    pub path: PathBuf,
    pub branch: Option<String>,
    /// Present only for branches matching `task/<TaskID>`.
    pub task: Option<ArtefactId>,
}

/// Git state of one task's workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceState {
    pub exists: bool,
    /// `None` when the workspace does not exist.
    pub clean: Option<bool>,
    pub ahead: u32,
    pub behind: u32,
}

/// Directory a task's worktree is materialized in.
pub fn workspace_path(worktrees_root: &Path, task: &ArtefactId) -> PathBuf {
    worktrees_root.join(task.canonical())
}

/// Create an isolated worktree + branch for a task.
///
/// Fails fast (no destructive action) if the target path already exists.
#[instrument(skip_all, fields(task = %request.task))]
pub fn create_workspace(request: &CreateRequest<'_>) -> Result<CreateOutcome> {
    let path = workspace_path(request.worktrees_root, request.task);
    if path.exists() {
        return Err(anyhow!(
            "workspace already exists at {} (remove it first)",
            path.display()
        ));
    }

    let git = Git::new(request.repo_root);
    let base_branch = match &request.base_branch {
        Some(base) => base.clone(),
        None => git.current_branch()?,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow!("create worktrees root {}: {e}", parent.display()))?;
    }

    let branch = task_branch(request.task);
    debug!(path = %path.display(), branch = %branch, base = %base_branch, "creating workspace");
    git.worktree_add(&path, &branch, &base_branch)?;

    Ok(CreateOutcome {
        path,
        branch,
        base_branch,
    })
}

/// Remove a task's worktree and (best-effort) its branch.
///
/// The worktree and the branch may diverge transiently here; by return they
/// converge: the worktree is gone, the branch is gone unless deletion failed
/// or `keep_branch` was set. Branch-deletion failures land in `attempts` and
/// do not fail the removal.
#[instrument(skip_all, fields(task = %task))]
pub fn remove_workspace(
    repo_root: &Path,
    worktrees_root: &Path,
    task: &ArtefactId,
    options: &RemoveOptions,
) -> Result<RemoveOutcome> {
    let git = Git::new(repo_root);
    let path = workspace_path(worktrees_root, task);
    let branch = task_branch(task);
    let mut outcome = RemoveOutcome::default();

    if path.exists() {
        git.worktree_remove(&path, options.force)?;
        outcome.removed = true;
    } else {
        debug!(path = %path.display(), "worktree directory missing");
        outcome.attempts.push(AttemptError {
            operation: "worktree remove".to_string(),
            error: format!("no worktree at {}", path.display()),
        });
        // Drop any stale registration left behind.
        if let Err(e) = git.worktree_prune() {
            outcome.attempts.push(AttemptError {
                operation: "worktree prune".to_string(),
                error: e.to_string(),
            });
        }
    }

    if !options.keep_branch {
        match git.delete_branch(&branch, options.force) {
            Ok(()) => outcome.branch_deleted = true,
            Err(e) => {
                warn!(branch = %branch, error = %e, "branch deletion failed (best-effort)");
                outcome.attempts.push(AttemptError {
                    operation: "branch delete".to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(outcome)
}

/// List registered worktrees, tagging those owned by tasks.
pub fn list_workspaces(repo_root: &Path) -> Result<Vec<WorkspaceEntry>> {
    let git = Git::new(repo_root);
    let entries = git.worktree_list()?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let task = entry
                .branch
                .as_deref()
                .and_then(|branch| branch.strip_prefix("task/"))
                .and_then(|id| ArtefactId::parse(ArtefactKind::Task, id));
            WorkspaceEntry {
                path: entry.path,
                branch: entry.branch,
                task,
            }
        })
        .collect())
}

/// Report whether a task's workspace exists, is clean, and how far it has
/// drifted from its upstream (0/0 when no upstream is configured).
pub fn workspace_status(
    worktrees_root: &Path,
    task: &ArtefactId,
) -> Result<WorkspaceState> {
    let path = workspace_path(worktrees_root, task);
    if !path.exists() {
        return Ok(WorkspaceState {
            exists: false,
            clean: None,
            ahead: 0,
            behind: 0,
        });
    }

    let git = Git::new(&path);
    let clean = git.is_clean()?;
    let (ahead, behind) = git.ahead_behind()?;
    Ok(WorkspaceState {
        exists: true,
        clean: Some(clean),
        ahead,
        behind,
    })
}

/// Drop stale worktree registrations whose directories are gone.
pub fn prune_workspaces(repo_root: &Path) -> Result<()> {
    Git::new(repo_root).worktree_prune()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::init_git_repo;

    fn task(number: u32) -> ArtefactId {
        ArtefactId::new(ArtefactKind::Task, number, None)
    }

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = temp.path().join("repo");
        std::fs::create_dir_all(&repo).expect("mkdir");
        init_git_repo(&repo);
        let worktrees = temp.path().join("worktrees");
        (temp, repo, worktrees)
    }

    #[test]
    fn create_captures_current_branch_as_base() {
        let (_temp, repo, worktrees) = setup();

        let outcome = create_workspace(&CreateRequest {
            repo_root: &repo,
            worktrees_root: &worktrees,
            task: &task(7),
            base_branch: None,
        })
        .expect("create");

        assert_eq!(outcome.branch, "task/T007");
        assert_eq!(outcome.base_branch, "main");
        assert!(outcome.path.join(".git").exists());
    }

    /// Verifies creation is rejected, not silently overwritten, when a
    /// workspace already exists at the target path.
    #[test]
    fn create_rejects_existing_path() {
        let (_temp, repo, worktrees) = setup();
        let request = CreateRequest {
            repo_root: &repo,
            worktrees_root: &worktrees,
            task: &task(7),
            base_branch: None,
        };

        create_workspace(&request).expect("first create");
        let err = create_workspace(&request).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn remove_deletes_worktree_and_branch() {
        let (_temp, repo, worktrees) = setup();
        let outcome = create_workspace(&CreateRequest {
            repo_root: &repo,
            worktrees_root: &worktrees,
            task: &task(7),
            base_branch: None,
        })
        .expect("create");

        let removed = remove_workspace(&repo, &worktrees, &task(7), &RemoveOptions::default())
            .expect("remove");

        assert!(removed.removed);
        assert!(removed.branch_deleted);
        assert!(!outcome.path.exists());
        assert!(!Git::new(&repo).branch_exists("task/T007").expect("exists"));
    }

    #[test]
    fn remove_missing_worktree_still_reports_attempts() {
        let (_temp, repo, worktrees) = setup();

        let outcome = remove_workspace(&repo, &worktrees, &task(9), &RemoveOptions::default())
            .expect("remove");

        assert!(!outcome.removed);
        assert!(
            outcome
                .attempts
                .iter()
                .any(|a| a.operation == "worktree remove")
        );
    }

    #[test]
    fn keep_branch_leaves_branch_behind() {
        let (_temp, repo, worktrees) = setup();
        create_workspace(&CreateRequest {
            repo_root: &repo,
            worktrees_root: &worktrees,
            task: &task(7),
            base_branch: None,
        })
        .expect("create");

        let outcome = remove_workspace(
            &repo,
            &worktrees,
            &task(7),
            &RemoveOptions {
                force: false,
                keep_branch: true,
            },
        )
        .expect("remove");

        assert!(outcome.removed);
        assert!(!outcome.branch_deleted);
        assert!(Git::new(&repo).branch_exists("task/T007").expect("exists"));
    }

    #[test]
    fn list_tags_task_worktrees_only() {
        let (_temp, repo, worktrees) = setup();
        create_workspace(&CreateRequest {
            repo_root: &repo,
            worktrees_root: &worktrees,
            task: &task(39),
            base_branch: None,
        })
        .expect("create");

        let entries = list_workspaces(&repo).expect("list");
        // Main working tree plus the task worktree.
        assert_eq!(entries.len(), 2);
        let tasks: Vec<_> = entries.iter().filter_map(|e| e.task).collect();
        assert_eq!(tasks, vec![task(39)]);
    }

    #[test]
    fn status_reports_missing_and_clean_workspaces() {
        let (_temp, repo, worktrees) = setup();

        let missing = workspace_status(&worktrees, &task(7)).expect("status");
        assert!(!missing.exists);
        assert_eq!(missing.clean, None);

        create_workspace(&CreateRequest {
            repo_root: &repo,
            worktrees_root: &worktrees,
            task: &task(7),
            base_branch: None,
        })
        .expect("create");

        let state = workspace_status(&worktrees, &task(7)).expect("status");
        assert!(state.exists);
        assert_eq!(state.clean, Some(true));
        // No upstream configured: drift reports zero, not an error.
        assert_eq!((state.ahead, state.behind), (0, 0));

        std::fs::write(
            workspace_path(&worktrees, &task(7)).join("scratch.txt"),
            "wip\n",
        )
        .expect("write");
        let dirty = workspace_status(&worktrees, &task(7)).expect("status");
        assert_eq!(dirty.clean, Some(false));
    }
}
