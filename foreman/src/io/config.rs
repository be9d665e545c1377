//! Foreman configuration stored under `.foreman/state/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::branching::BranchingStrategy;
use crate::io::store::StoreBackend;

/// Foreman configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForemanConfig {
    /// Name of the integration branch shared branches fork from.
    pub main_branch: String,

    /// How many levels of shared branch to create above task branches.
    pub branching_strategy: BranchingStrategy,

    /// Which agent state store implementation backs `.foreman/state/`.
    pub store_backend: StoreBackend,

    /// Directory scanned for `PRD-*` artefact trees, relative to the root.
    pub prds_dir: PathBuf,

    /// Where per-task worktrees are materialized, relative to the root.
    pub worktrees_root: PathBuf,

    /// Where task/epic logs and memory documents live, relative to the root.
    pub memory_root: PathBuf,

    /// Wall-clock bound for remote git operations (fetch).
    pub fetch_timeout_secs: u64,

    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Command to launch an agent process (e.g. `["claude", "-p"]`).
    /// Empty means foreman only records the spawn; the caller launches.
    pub command: Vec<String>,

    /// Default per-agent timeout recorded on spawn.
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 60 * 60,
        }
    }
}

impl Default for ForemanConfig {
    fn default() -> Self {
        Self {
            main_branch: "main".to_string(),
            branching_strategy: BranchingStrategy::Flat,
            store_backend: StoreBackend::Sqlite,
            prds_dir: PathBuf::from("prds"),
            worktrees_root: PathBuf::from(".foreman/worktrees"),
            memory_root: PathBuf::from(".foreman/memory"),
            fetch_timeout_secs: 120,
            agent: AgentConfig::default(),
        }
    }
}

impl ForemanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.main_branch.trim().is_empty() {
            return Err(anyhow!("main_branch must not be empty"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(anyhow!("fetch_timeout_secs must be > 0"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if let Some(first) = self.agent.command.first()
            && first.trim().is_empty()
        {
            return Err(anyhow!("agent.command must not start with an empty string"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForemanConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForemanConfig> {
    if !path.exists() {
        let cfg = ForemanConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForemanConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ForemanConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
