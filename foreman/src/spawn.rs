//! Orchestration for spawning an agent onto a task.
//!
//! Spawning ties the subsystems together: resolve the task and its
//! hierarchy, ensure the shared branches exist, materialize an isolated
//! worktree, record the attempt in the state store, and (when configured)
//! launch the agent process into the workspace.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::agent::{AgentStatus, AgentUpdate, RunRecord};
use crate::core::ident::{ArtefactId, ArtefactKind};
use crate::io::branches::{HierarchyOutcome, HierarchyRequest, ensure_hierarchy};
use crate::io::config::ForemanConfig;
use crate::io::git::Git;
use crate::io::init::ForemanPaths;
use crate::io::memory::{ensure_epic_memory, ensure_prd_memory, now_timestamp, raw_log_path};
use crate::io::resolver::Resolver;
use crate::io::store::AgentStore;
use crate::io::workspace::{CreateOutcome, CreateRequest, create_workspace};

/// Options for `spawn_agent`.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    /// Explicit base branch for the task worktree. Defaults to the deepest
    /// hierarchy branch, falling back to the current branch.
    pub base_branch: Option<String>,
    /// Mission payload file recorded on the agent record.
    pub mission_file: Option<PathBuf>,
    /// Launch the configured agent command after recording the spawn.
    pub launch: bool,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            base_branch: None,
            mission_file: None,
            launch: true,
        }
    }
}

/// Everything a spawn produced.
#[derive(Debug)]
pub struct SpawnOutcome {
    pub task: ArtefactId,
    pub workspace: CreateOutcome,
    pub hierarchy: HierarchyOutcome,
    pub run: RunRecord,
    /// Pid of the launched agent process, when one was started.
    pub pid: Option<u32>,
}

/// Spawn an agent onto a task.
#[instrument(skip_all, fields(task = raw_task))]
pub fn spawn_agent(
    paths: &ForemanPaths,
    cfg: &ForemanConfig,
    resolver: &mut Resolver,
    store: &mut dyn AgentStore,
    raw_task: &str,
    options: &SpawnOptions,
) -> Result<SpawnOutcome> {
    let task = resolver
        .resolve(ArtefactKind::Task, raw_task)
        .map(|record| record.id)
        .ok_or_else(|| anyhow!("unknown task '{raw_task}'"))?;
    let task_id = task.canonical();

    if let Some(existing) = store.get(&task_id)?
        && existing.status.is_live()
    {
        // Double-spawn: the upsert below overwrites rather than duplicates.
        warn!(task = %task_id, status = %existing.status, "live agent record exists, overwriting");
    }

    let epic = resolver.parent_epic_of(raw_task);
    let prd = epic
        .as_ref()
        .and_then(|epic| resolver.parent_prd_of(&epic.id.canonical()));

    let git = Git::new(&paths.root);
    let hierarchy = ensure_hierarchy(
        &git,
        &HierarchyRequest {
            prd,
            epic: epic.as_ref().map(|e| e.id),
            strategy: cfg.branching_strategy,
            main_branch: cfg.main_branch.clone(),
        },
    );
    for error in &hierarchy.errors {
        warn!(branch = %error.branch, error = %error.error, "hierarchy branch not ensured");
    }

    let base_branch = options
        .base_branch
        .clone()
        .or_else(|| hierarchy.leaf().map(str::to_string));
    let workspace = create_workspace(&CreateRequest {
        repo_root: &paths.root,
        worktrees_root: &paths.worktrees_root,
        task: &task,
        base_branch,
    })?;

    // Memory documents for the surrounding scopes exist from first spawn on.
    if let Some(epic) = &epic {
        ensure_epic_memory(&paths.memory_root, &epic.id, epic.title.as_deref())?;
        if let Some(prd) = &prd {
            ensure_prd_memory(&paths.memory_root, prd)?;
        }
    }

    let log_file = raw_log_path(&paths.memory_root, &task_id);
    store.upsert(
        &task_id,
        &AgentUpdate {
            status: Some(AgentStatus::Spawned),
            spawned_at: Some(now_timestamp()),
            worktree_path: Some(workspace.path.clone()),
            branch: Some(workspace.branch.clone()),
            base_branch: Some(workspace.base_branch.clone()),
            branching_strategy: Some(cfg.branching_strategy),
            mission_file: options.mission_file.clone(),
            log_file: Some(log_file.clone()),
            timeout_secs: Some(cfg.agent.timeout_secs),
            ..AgentUpdate::default()
        },
    )?;
    let run = store.create_run(&task_id, Some(&log_file))?;

    let mut pid = None;
    if options.launch && !cfg.agent.command.is_empty() {
        let child_pid = launch_agent(cfg, &task_id, &workspace, &log_file, options)?;
        store.set_status(
            &task_id,
            AgentStatus::Running,
            &AgentUpdate {
                pid: Some(child_pid),
                ..AgentUpdate::default()
            },
        )?;
        pid = Some(child_pid);
    }

    info!(task = %task_id, branch = %workspace.branch, pid = ?pid, "agent spawned");
    Ok(SpawnOutcome {
        task,
        workspace,
        hierarchy,
        run,
        pid,
    })
}

/// Launch the configured agent command detached into the workspace.
///
/// The agent runs as an independent process; foreman only records its pid.
/// Stdout and stderr stream into the task's log file.
fn launch_agent(
    cfg: &ForemanConfig,
    task_id: &str,
    workspace: &CreateOutcome,
    log_file: &std::path::Path,
    options: &SpawnOptions,
) -> Result<u32> {
    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let stdout = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("open agent log {}", log_file.display()))?;
    let stderr = stdout
        .try_clone()
        .with_context(|| format!("clone agent log handle {}", log_file.display()))?;

    let mut command = Command::new(&cfg.agent.command[0]);
    command
        .args(&cfg.agent.command[1..])
        .current_dir(&workspace.path)
        .env("FOREMAN_TASK", task_id)
        .env("FOREMAN_BRANCH", &workspace.branch)
        .env("FOREMAN_LOG", log_file)
        .stdin(std::process::Stdio::null())
        .stdout(stdout)
        .stderr(stderr);
    if let Some(mission) = &options.mission_file {
        command.env("FOREMAN_MISSION", mission);
    }

    debug!(command = ?cfg.agent.command, workdir = %workspace.path.display(), "launching agent");
    let child = command.spawn().context("spawn agent command")?;
    Ok(child.id())
}
