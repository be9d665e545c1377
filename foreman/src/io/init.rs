//! Initialization helpers for `.foreman/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::io::config::{ForemanConfig, write_config};
use crate::io::memory::ensure_project_memory;

/// All canonical paths within `.foreman/` for a project root.
///
/// The worktree, memory, and PRD roots are configurable; `resolved` applies
/// the config on top of the fixed internal layout.
#[derive(Debug, Clone)]
pub struct ForemanPaths {
    pub root: PathBuf,
    pub foreman_dir: PathBuf,
    pub state_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub config_path: PathBuf,
    pub agents_db_path: PathBuf,
    pub agents_doc_path: PathBuf,
    pub runs_doc_path: PathBuf,
    pub store_lock_path: PathBuf,
    pub worktrees_root: PathBuf,
    pub memory_root: PathBuf,
    pub prds_dir: PathBuf,
}

impl ForemanPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let foreman_dir = root.join(".foreman");
        let state_dir = foreman_dir.join("state");
        Self {
            gitignore_path: foreman_dir.join(".gitignore"),
            config_path: state_dir.join("config.toml"),
            agents_db_path: state_dir.join("agents.db"),
            agents_doc_path: state_dir.join("agents.json"),
            runs_doc_path: state_dir.join("runs.json"),
            store_lock_path: state_dir.join("store.lock"),
            worktrees_root: foreman_dir.join("worktrees"),
            memory_root: foreman_dir.join("memory"),
            prds_dir: root.join("prds"),
            root,
            foreman_dir,
            state_dir,
        }
    }

    /// Paths with the configurable roots overridden from config.
    pub fn resolved(root: impl Into<PathBuf>, cfg: &ForemanConfig) -> Self {
        let mut paths = Self::new(root);
        paths.worktrees_root = paths.root.join(&cfg.worktrees_root);
        paths.memory_root = paths.root.join(&cfg.memory_root);
        paths.prds_dir = paths.root.join(&cfg.prds_dir);
        paths
    }
}

/// Options for `init_state`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing foreman-owned files.
    pub force: bool,
}

/// Create `.foreman/` scaffolding in `root`.
///
/// Fails if `.foreman/` already exists unless `options.force` is set.
pub fn init_state(root: &Path, options: &InitOptions) -> Result<ForemanPaths> {
    let paths = ForemanPaths::new(root);
    if paths.foreman_dir.exists() && !options.force {
        return Err(anyhow!(
            "foreman init: .foreman already exists (use --force to overwrite)"
        ));
    }
    if paths.foreman_dir.exists() && !paths.foreman_dir.is_dir() {
        return Err(anyhow!(
            "foreman init: .foreman exists but is not a directory"
        ));
    }

    create_dir(&paths.foreman_dir)?;
    create_dir(&paths.state_dir)?;
    create_dir(&paths.memory_root)?;
    create_dir(&paths.worktrees_root)?;

    fs::write(&paths.gitignore_path, FOREMAN_GITIGNORE)
        .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &ForemanConfig::default())?;
    ensure_project_memory(&paths.memory_root)?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

const FOREMAN_GITIGNORE: &str = "state/\nworktrees/\n";

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies init_state creates the complete directory structure and files.
    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();

        let paths = init_state(root, &InitOptions { force: false }).expect("init");

        assert!(paths.foreman_dir.is_dir());
        assert!(paths.state_dir.is_dir());
        assert!(paths.memory_root.is_dir());
        assert!(paths.worktrees_root.is_dir());
        assert!(paths.gitignore_path.is_file());
        assert!(paths.config_path.is_file());
        assert!(paths.memory_root.join("MEMORY.md").is_file());

        let gitignore = fs::read_to_string(&paths.gitignore_path).expect("read gitignore");
        assert_eq!(gitignore, FOREMAN_GITIGNORE);
    }

    /// Verifies init_state refuses to overwrite without --force.
    #[test]
    fn init_without_force_refuses_existing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();

        init_state(root, &InitOptions { force: false }).expect("init");
        let err = init_state(root, &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    /// Verifies resolved paths follow config overrides.
    #[test]
    fn resolved_paths_follow_config() {
        let mut cfg = ForemanConfig::default();
        cfg.worktrees_root = PathBuf::from("sandboxes");
        cfg.prds_dir = PathBuf::from("docs/prds");

        let paths = ForemanPaths::resolved("/repo", &cfg);
        assert_eq!(paths.worktrees_root, PathBuf::from("/repo/sandboxes"));
        assert_eq!(paths.prds_dir, PathBuf::from("/repo/docs/prds"));
        assert_eq!(paths.state_dir, PathBuf::from("/repo/.foreman/state"));
    }
}
