//! Orchestration for folding a task's log into its parent epic's log.
//!
//! The durability contract: the epic-log append must succeed before the
//! task log is deleted. A crash between append and delete re-merges on the
//! next attempt (at-least-once); a log whose parent epic cannot be resolved
//! is never deleted.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::core::ident::{ArtefactId, ArtefactKind};
use crate::core::logline::{is_blank, tag_lines};
use crate::io::memory::{append_block, log_path, raw_log_path};
use crate::io::resolver::{EpicParent, Resolver};

/// Result of a merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Whether the log was appended to the epic's log.
    pub merged: bool,
    /// The epic the log was merged into, when one was resolved.
    pub epic: Option<ArtefactId>,
    /// Whether the source log was deleted.
    pub deleted: bool,
}

impl MergeOutcome {
    fn untouched() -> Self {
        Self {
            merged: false,
            epic: None,
            deleted: false,
        }
    }
}

/// Merge a task's log upward into its parent epic's log.
///
/// An explicit log path takes precedence over the path derived from the
/// normalized id, tolerating id-format drift between when the log was
/// written and when it is merged. An empty log is deleted without merging.
pub fn merge_task_log(
    resolver: &mut Resolver,
    memory_root: &Path,
    raw_task_id: &str,
    explicit_log: Option<&Path>,
) -> Result<MergeOutcome> {
    let Some(source) = locate_log(memory_root, raw_task_id, explicit_log) else {
        debug!(task = raw_task_id, "no log to merge");
        return Ok(MergeOutcome::untouched());
    };

    let contents =
        fs::read_to_string(&source).with_context(|| format!("read log {}", source.display()))?;
    if is_blank(&contents) {
        fs::remove_file(&source)
            .with_context(|| format!("delete empty log {}", source.display()))?;
        debug!(log = %source.display(), "deleted empty log");
        return Ok(MergeOutcome {
            merged: false,
            epic: None,
            deleted: true,
        });
    }

    let Some(epic) = resolve_epic(resolver, raw_task_id) else {
        // Without a merge target the source must stay on disk for a retry.
        warn!(task = raw_task_id, "parent epic not resolvable, leaving log in place");
        return Ok(MergeOutcome::untouched());
    };

    let original_id = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(raw_task_id)
        .to_string();
    let tagged = tag_lines(&original_id, &contents);

    let target = log_path(memory_root, &epic.id);
    // Append must land before the source goes away; a crash in between
    // double-merges rather than losing lines.
    append_block(&target, &tagged)?;
    fs::remove_file(&source)
        .with_context(|| format!("delete merged log {}", source.display()))?;

    info!(task = %original_id, epic = %epic.id, "merged task log");
    Ok(MergeOutcome {
        merged: true,
        epic: Some(epic.id),
        deleted: true,
    })
}

fn locate_log(memory_root: &Path, raw_task_id: &str, explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    if let Some(id) = ArtefactId::parse(ArtefactKind::Task, raw_task_id) {
        let canonical = raw_log_path(memory_root, &id.canonical());
        if canonical.exists() {
            return Some(canonical);
        }
    }
    let verbatim = raw_log_path(memory_root, raw_task_id.trim());
    verbatim.exists().then_some(verbatim)
}

fn resolve_epic(resolver: &mut Resolver, raw_task_id: &str) -> Option<EpicParent> {
    if let Some(parent) = resolver.parent_epic_of(raw_task_id) {
        return Some(parent);
    }
    // Zero-padding drift: retry with the bare numeric form.
    let digits: String = raw_task_id.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    resolver.parent_epic_of(&digits)
}
