//! Agent workspace orchestrator CLI.
//!
//! Coordinates autonomous agent processes working tasks against a shared
//! repository: isolated worktrees per task, a persistent lifecycle store,
//! and logs folded upward into the epic/PRD/project memory hierarchy.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use foreman::complete::{CompleteOptions, complete_task, kill_task};
use foreman::core::agent::AgentStatus;
use foreman::core::ident::{ArtefactId, ArtefactKind};
use foreman::exit_codes;
use foreman::io::config::{ForemanConfig, load_config};
use foreman::io::git::Git;
use foreman::io::init::{ForemanPaths, InitOptions, init_state};
use foreman::io::resolver::Resolver;
use foreman::io::store::{AgentStore, open_store};
use foreman::io::workspace::{
    RemoveOptions, list_workspaces, prune_workspaces, remove_workspace, workspace_status,
};
use foreman::merge::merge_task_log;
use foreman::scan::{recover_task, scan_agents};
use foreman::spawn::{SpawnOptions, spawn_agent};
use foreman::{logging, merge};

#[derive(Parser)]
#[command(
    name = "foreman",
    version,
    about = "Agent workspace orchestration and lifecycle tracking"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.foreman/` state scaffolding in the current directory.
    Init {
        /// Overwrite existing foreman-owned files.
        #[arg(short, long)]
        force: bool,
    },
    /// Spawn an agent onto a task: branches, worktree, record, process.
    Spawn {
        task: String,
        /// Base branch for the task worktree (defaults to the hierarchy
        /// leaf, then the current branch).
        #[arg(long)]
        base: Option<String>,
        /// Mission payload file recorded on the agent record.
        #[arg(long)]
        mission: Option<PathBuf>,
        /// Record the spawn without launching the agent command.
        #[arg(long)]
        no_launch: bool,
    },
    /// List agent records, newest spawn first.
    List {
        /// Filter by status (spawned, running, completed, ...).
        #[arg(long)]
        status: Option<AgentStatus>,
    },
    /// Show one task's agent record and workspace state.
    Status { task: String },
    /// Record a terminal status and fold the task log upward.
    Complete {
        task: String,
        #[arg(long)]
        status: AgentStatus,
        #[arg(long)]
        exit_code: Option<i32>,
        /// Explicit log path for the upward merge.
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Terminate a task's agent process (SIGTERM, then SIGKILL).
    Kill { task: String },
    /// Probe live agents and mark dead processes orphaned.
    Scan,
    /// Re-enter `spawned` for an orphaned task.
    Recover { task: String },
    /// Merge a task's log into its parent epic's log.
    Merge {
        task: String,
        /// Explicit log path (overrides the derived one).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Remove a task's worktree and (best-effort) its branch.
    Remove {
        task: String,
        /// Discard local modifications in the worktree.
        #[arg(short, long)]
        force: bool,
        /// Leave the task branch in place.
        #[arg(long)]
        keep_branch: bool,
    },
    /// List registered worktrees.
    Workspaces,
    /// Drop stale worktree registrations.
    Prune,
    /// Show a task's run history, newest first.
    Runs { task: String },
    /// Delete all agent records.
    Clear,
    /// Fetch a remote with the configured timeout.
    Fetch {
        #[arg(default_value = "origin")]
        remote: String,
    },
}

fn main() -> ExitCode {
    logging::init();
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::INVALID as u8)
        }
    }
}

struct Ctx {
    paths: ForemanPaths,
    cfg: ForemanConfig,
    resolver: Resolver,
    store: Box<dyn AgentStore>,
}

fn load_ctx() -> Result<Ctx> {
    let root = std::env::current_dir().context("determine current directory")?;
    let cfg = load_config(&ForemanPaths::new(&root).config_path)?;
    let paths = ForemanPaths::resolved(&root, &cfg);
    let resolver = Resolver::new(&paths.prds_dir);
    let store = open_store(&paths, cfg.store_backend)?;
    Ok(Ctx {
        paths,
        cfg,
        resolver,
        store,
    })
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => {
            let root = std::env::current_dir().context("determine current directory")?;
            let paths = init_state(&root, &InitOptions { force })?;
            println!("initialized {}", paths.foreman_dir.display());
            Ok(exit_codes::OK)
        }
        Command::Spawn {
            task,
            base,
            mission,
            no_launch,
        } => cmd_spawn(&task, base, mission, no_launch),
        Command::List { status } => cmd_list(status),
        Command::Status { task } => cmd_status(&task),
        Command::Complete {
            task,
            status,
            exit_code,
            log,
        } => cmd_complete(&task, status, exit_code, log),
        Command::Kill { task } => {
            let mut ctx = load_ctx()?;
            let record = kill_task(ctx.store.as_mut(), &task)?;
            println!("{} killed ({})", record.task_id, record.signal.as_deref().unwrap_or("no process"));
            Ok(exit_codes::OK)
        }
        Command::Scan => {
            let mut ctx = load_ctx()?;
            let outcome = scan_agents(ctx.store.as_mut())?;
            println!("checked {} live agents", outcome.checked);
            for task_id in &outcome.orphaned {
                println!("orphaned {task_id}");
            }
            if outcome.orphaned.is_empty() {
                Ok(exit_codes::OK)
            } else {
                Ok(exit_codes::ORPHANED)
            }
        }
        Command::Recover { task } => {
            let mut ctx = load_ctx()?;
            let record = recover_task(ctx.store.as_mut(), &task)?;
            println!("{} recovered (status {})", record.task_id, record.status);
            Ok(exit_codes::OK)
        }
        Command::Merge { task, log } => {
            let mut ctx = load_ctx()?;
            let outcome =
                merge_task_log(&mut ctx.resolver, &ctx.paths.memory_root, &task, log.as_deref())?;
            print_merge(&task, &outcome);
            Ok(exit_codes::OK)
        }
        Command::Remove {
            task,
            force,
            keep_branch,
        } => cmd_remove(&task, force, keep_branch),
        Command::Workspaces => {
            let ctx = load_ctx()?;
            for entry in list_workspaces(&ctx.paths.root)? {
                let task = entry
                    .task
                    .map(|id| id.canonical())
                    .unwrap_or_else(|| "-".to_string());
                let branch = entry.branch.as_deref().unwrap_or("(detached)");
                println!("{task}\t{branch}\t{}", entry.path.display());
            }
            Ok(exit_codes::OK)
        }
        Command::Prune => {
            let ctx = load_ctx()?;
            prune_workspaces(&ctx.paths.root)?;
            Ok(exit_codes::OK)
        }
        Command::Runs { task } => cmd_runs(&task),
        Command::Clear => {
            let mut ctx = load_ctx()?;
            let count = ctx.store.clear()?;
            println!("removed {count} agent records");
            Ok(exit_codes::OK)
        }
        Command::Fetch { remote } => {
            let ctx = load_ctx()?;
            let git = Git::new(&ctx.paths.root);
            let outcome = git.fetch(&remote, Duration::from_secs(ctx.cfg.fetch_timeout_secs));
            if outcome.success {
                println!("fetched {remote}");
                Ok(exit_codes::OK)
            } else {
                eprintln!(
                    "fetch {remote} failed: {}",
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
                Ok(exit_codes::INVALID)
            }
        }
    }
}

fn cmd_spawn(
    task: &str,
    base: Option<String>,
    mission: Option<PathBuf>,
    no_launch: bool,
) -> Result<i32> {
    let mut ctx = load_ctx()?;
    let options = SpawnOptions {
        base_branch: base,
        mission_file: mission,
        launch: !no_launch,
    };
    match spawn_agent(
        &ctx.paths,
        &ctx.cfg,
        &mut ctx.resolver,
        ctx.store.as_mut(),
        task,
        &options,
    ) {
        Ok(outcome) => {
            println!(
                "spawned {} on {} (base {})",
                outcome.task,
                outcome.workspace.branch,
                outcome.workspace.base_branch
            );
            for created in &outcome.hierarchy.created {
                println!("created branch {created}");
            }
            if let Some(pid) = outcome.pid {
                println!("agent pid {pid}");
            }
            Ok(exit_codes::OK)
        }
        Err(err) if err.to_string().contains("unknown task") => {
            eprintln!("{err:#}");
            Ok(exit_codes::NOT_FOUND)
        }
        Err(err) => Err(err),
    }
}

fn cmd_list(status: Option<AgentStatus>) -> Result<i32> {
    let ctx = load_ctx()?;
    for record in ctx.store.list(status)? {
        println!(
            "{}\t{}\t{}\t{}",
            record.task_id,
            record.status,
            record.spawned_at,
            record.branch.as_deref().unwrap_or("-")
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_status(task: &str) -> Result<i32> {
    let ctx = load_ctx()?;
    let id = parse_task(task)?;
    let Some(record) = ctx.store.get(&id.canonical())? else {
        eprintln!("no agent record for {id}");
        return Ok(exit_codes::NOT_FOUND);
    };

    println!("task:     {}", record.task_id);
    println!("status:   {}", record.status);
    println!("spawned:  {}", record.spawned_at);
    if let Some(ended) = &record.ended_at {
        println!("ended:    {ended}");
    }
    if let Some(pid) = record.pid {
        println!("pid:      {pid}");
    }
    if let Some(branch) = &record.branch {
        println!("branch:   {branch}");
    }

    let state = workspace_status(&ctx.paths.worktrees_root, &id)?;
    if state.exists {
        println!(
            "worktree: {} ({}, ahead {}, behind {})",
            record
                .worktree_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            if state.clean == Some(true) { "clean" } else { "dirty" },
            state.ahead,
            state.behind
        );
    } else {
        println!("worktree: (none)");
    }
    Ok(exit_codes::OK)
}

fn cmd_complete(
    task: &str,
    status: AgentStatus,
    exit_code: Option<i32>,
    log: Option<PathBuf>,
) -> Result<i32> {
    let mut ctx = load_ctx()?;
    let outcome = complete_task(
        &ctx.paths,
        &mut ctx.resolver,
        ctx.store.as_mut(),
        task,
        status,
        &CompleteOptions {
            exit_code,
            log_file: log,
        },
    )?;
    println!("{} {}", outcome.record.task_id, outcome.record.status);
    print_merge(task, &outcome.merge);
    Ok(exit_codes::OK)
}

fn cmd_remove(task: &str, force: bool, keep_branch: bool) -> Result<i32> {
    let ctx = load_ctx()?;
    let id = parse_task(task)?;
    let outcome = remove_workspace(
        &ctx.paths.root,
        &ctx.paths.worktrees_root,
        &id,
        &RemoveOptions { force, keep_branch },
    )?;
    if outcome.removed {
        println!("removed worktree for {id}");
    }
    for attempt in &outcome.attempts {
        eprintln!("{}: {}", attempt.operation, attempt.error);
    }
    Ok(exit_codes::OK)
}

fn cmd_runs(task: &str) -> Result<i32> {
    let ctx = load_ctx()?;
    let id = parse_task(task)?;
    for run in ctx.store.runs_for(&id.canonical())? {
        println!(
            "{}\t{}\t{}\t{}",
            run.id,
            run.started_at,
            run.ended_at.as_deref().unwrap_or("-"),
            run.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
        );
    }
    Ok(exit_codes::OK)
}

fn print_merge(task: &str, outcome: &merge::MergeOutcome) {
    match (&outcome.epic, outcome.merged, outcome.deleted) {
        (Some(epic), true, _) => println!("merged {task} log into {epic}"),
        (None, false, true) => println!("deleted empty {task} log"),
        _ => println!("{task} log not merged"),
    }
}

fn parse_task(raw: &str) -> Result<ArtefactId> {
    ArtefactId::parse(ArtefactKind::Task, raw).ok_or_else(|| anyhow!("invalid task id '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_spawn() {
        let cli = Cli::parse_from(["foreman", "spawn", "T7"]);
        assert!(matches!(cli.command, Command::Spawn { no_launch: false, .. }));
    }

    #[test]
    fn parse_complete_with_status() {
        let cli = Cli::parse_from([
            "foreman", "complete", "T7", "--status", "completed", "--exit-code", "0",
        ]);
        match cli.command {
            Command::Complete { status, exit_code, .. } => {
                assert_eq!(status, AgentStatus::Completed);
                assert_eq!(exit_code, Some(0));
            }
            _ => panic!("expected complete command"),
        }
    }

    #[test]
    fn parse_remove_flags() {
        let cli = Cli::parse_from(["foreman", "remove", "T7", "--force", "--keep-branch"]);
        assert!(matches!(
            cli.command,
            Command::Remove {
                force: true,
                keep_branch: true,
                ..
            }
        ));
    }
}
