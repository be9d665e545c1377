//! Git adapter for foreman commands.
//!
//! Foreman materializes branch hierarchies and per-task worktrees, so we
//! keep a small, explicit wrapper around `git` subprocess calls. Local
//! operations run unbounded (they are expected to be fast); remote
//! operations (`fetch`) go through the bounded-timeout process helper and
//! report a structured outcome instead of failing the caller.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::process::run_with_timeout;

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

impl StatusEntry {
    /// True for untracked entries.
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }
}

/// One entry from `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    /// Checked-out branch, `None` for a detached worktree.
    pub branch: Option<String>,
}

/// Outcome of a bounded remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub success: bool,
    pub error: Option<String>,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (no current branch)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// True when the working tree has no pending changes.
    pub fn is_clean(&self) -> Result<bool> {
        Ok(self.status_porcelain()?.is_empty())
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Create a branch at `start_point` without checking it out.
    #[instrument(skip_all, fields(branch, start_point))]
    pub fn create_branch(&self, branch: &str, start_point: &str) -> Result<()> {
        debug!(branch, start_point, "creating branch");
        self.run_checked(&["branch", branch, start_point])?;
        Ok(())
    }

    /// Delete a local branch. `force` uses `-D` (unmerged branches).
    pub fn delete_branch(&self, branch: &str, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run_checked(&["branch", flag, branch])?;
        Ok(())
    }

    /// Create a worktree at `path` on a new branch forked from `start_point`.
    ///
    /// If the branch already exists (left over from an earlier attempt whose
    /// branch deletion was skipped), fall back to checking it out into the
    /// new worktree instead of failing.
    #[instrument(skip_all, fields(branch))]
    pub fn worktree_add(&self, path: &Path, branch: &str, start_point: &str) -> Result<()> {
        let path_str = path.display().to_string();
        let output = self.run(&["worktree", "add", "-b", branch, &path_str, start_point])?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if self.branch_exists(branch)? {
            warn!(branch, "branch already exists, attaching worktree to it");
            self.run_checked(&["worktree", "add", &path_str, branch])?;
            return Ok(());
        }
        Err(anyhow!("git worktree add failed: {}", stderr.trim()))
    }

    /// Remove a registered worktree. `force` discards local modifications.
    pub fn worktree_remove(&self, path: &Path, force: bool) -> Result<()> {
        let path_str = path.display().to_string();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_str);
        self.run_checked(&args)?;
        Ok(())
    }

    /// List registered worktrees (porcelain format).
    pub fn worktree_list(&self) -> Result<Vec<WorktreeEntry>> {
        let out = self.run_capture(&["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&out))
    }

    /// Drop stale worktree registrations whose directories are gone.
    pub fn worktree_prune(&self) -> Result<()> {
        self.run_checked(&["worktree", "prune"])?;
        Ok(())
    }

    /// Commits ahead of / behind the configured upstream.
    ///
    /// A branch without an upstream reports `(0, 0)`; that is not an error.
    pub fn ahead_behind(&self) -> Result<(u32, u32)> {
        let upstream = self.run(&[
            "rev-parse",
            "--abbrev-ref",
            "--symbolic-full-name",
            "@{upstream}",
        ])?;
        if !upstream.status.success() {
            return Ok((0, 0));
        }

        let out = self.run_capture(&["rev-list", "--left-right", "--count", "@{upstream}...HEAD"])?;
        let mut parts = out.split_whitespace();
        let behind: u32 = parts
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| anyhow!("unexpected rev-list output: '{}'", out.trim()))?;
        let ahead: u32 = parts
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| anyhow!("unexpected rev-list output: '{}'", out.trim()))?;
        Ok((ahead, behind))
    }

    /// Fetch from a remote with a bounded timeout.
    ///
    /// Remote operations can hang on network trouble, so failures (including
    /// timeout) are reported as a structured outcome rather than an error.
    #[instrument(skip_all, fields(remote))]
    pub fn fetch(&self, remote: &str, timeout: Duration) -> FetchOutcome {
        let mut cmd = Command::new("git");
        cmd.args(["fetch", remote]).current_dir(&self.workdir);

        match run_with_timeout(cmd, timeout) {
            Ok(output) if output.timed_out => FetchOutcome {
                success: false,
                error: Some(format!("git fetch timed out after {}s", timeout.as_secs())),
            },
            Ok(output) if !output.status.success() => FetchOutcome {
                success: false,
                error: Some(
                    String::from_utf8_lossy(&output.stderr).trim().to_string(),
                ),
            },
            Ok(_) => FetchOutcome {
                success: true,
                error: None,
            },
            Err(e) => FetchOutcome {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

fn parse_worktree_list(raw: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;

    let mut flush = |path: &mut Option<PathBuf>, branch: &mut Option<String>| {
        if let Some(p) = path.take() {
            entries.push(WorktreeEntry {
                path: p,
                branch: branch.take(),
            });
        }
        *branch = None;
    };

    for line in raw.lines() {
        if let Some(p) = line.strip_prefix("worktree ") {
            flush(&mut path, &mut branch);
            path = Some(PathBuf::from(p));
        } else if let Some(b) = line.strip_prefix("branch refs/heads/") {
            branch = Some(b.to_string());
        }
    }
    flush(&mut path, &mut branch);
    entries
}
