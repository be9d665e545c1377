//! Mission and result payloads exchanged with agent processes.
//!
//! These are boundary contracts: a mission tells an agent what to do, a
//! result reports what happened. Both are validated against embedded JSON
//! Schemas before deserialization; unsupported `version` values are
//! rejected up front so schema errors never mask a version mismatch.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MISSION_SCHEMA: &str = include_str!("../../schemas/mission.v1.schema.json");
const RESULT_SCHEMA: &str = include_str!("../../schemas/result.v1.schema.json");

/// The only payload version this build understands.
pub const SUPPORTED_VERSION: u64 = 1;

/// Work order handed to an agent process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub version: u64,
    pub task_id: String,
    pub epic_id: String,
    pub prd_id: String,
    pub instruction: String,
    pub context: MissionContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<MissionConstraints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionContext {
    pub epic_file: PathBuf,
    pub task_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_md: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolset: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_git_commit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_new_deps: Option<bool>,
}

/// Outcome reported by an agent process when it finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub version: u64,
    pub task_id: String,
    pub status: ResultStatus,
    pub files_modified: Vec<FileModification>,
    /// At least two entries: the agent must log start and end.
    pub log: Vec<ResultLogEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
    pub completed_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Completed,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileModification {
    pub path: PathBuf,
    pub action: FileAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultLogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Tip,
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Blocker,
    Question,
    Concern,
}

/// Parse and validate a mission payload.
pub fn parse_mission(raw: &str) -> Result<Mission> {
    let value: Value = serde_json::from_str(raw).context("parse mission json")?;
    check_version(&value, "mission")?;
    validate_schema(&value, MISSION_SCHEMA).context("mission payload")?;
    serde_json::from_value(value).context("deserialize mission")
}

/// Parse and validate a result payload.
pub fn parse_result(raw: &str) -> Result<TaskResult> {
    let value: Value = serde_json::from_str(raw).context("parse result json")?;
    check_version(&value, "result")?;
    validate_schema(&value, RESULT_SCHEMA).context("result payload")?;
    serde_json::from_value(value).context("deserialize result")
}

fn check_version(value: &Value, label: &str) -> Result<()> {
    let version = value
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("{label} payload missing numeric 'version'"))?;
    if version != SUPPORTED_VERSION {
        bail!("unsupported {label} version {version} (supported: {SUPPORTED_VERSION})");
    }
    Ok(())
}

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value, schema_raw: &str) -> Result<()> {
    let schema: Value = serde_json::from_str(schema_raw).context("parse schema json")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile json schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}
