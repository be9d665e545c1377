//! Memory hierarchy files: raw logs and curated memory documents.
//!
//! Raw logs (`<ID>.log`) accumulate timestamped lines and are folded upward
//! by `merge`. Memory documents (`<EpicID>.md`, `PRD-<n>.md`, `MEMORY.md`)
//! are created once from templates with a frontmatter header and curated by
//! humans afterwards, so creation never overwrites an existing document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::ident::ArtefactId;

const EPIC_MEMORY_TEMPLATE: &str = "\
---
epic: {{ id }}
created: {{ created }}
updated: {{ created }}
---

# {{ id }}{% if title %}: {{ title }}{% endif %}

## Decisions

## Gotchas
";

const PRD_MEMORY_TEMPLATE: &str = "\
---
prd: {{ id }}
created: {{ created }}
updated: {{ created }}
---

# {{ id }}

## Scope notes

## Cross-epic learnings
";

const PROJECT_MEMORY_TEMPLATE: &str = "\
---
scope: project
created: {{ created }}
updated: {{ created }}
---

# Project memory

Long-lived facts that outlast individual PRDs.
";

/// ISO-8601 timestamp used across records and memory headers.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Raw log path for an id string as originally written (`T00007.log`).
pub fn raw_log_path(memory_root: &Path, id_str: &str) -> PathBuf {
    memory_root.join(format!("{id_str}.log"))
}

/// Raw log path for a normalized artefact id (`E003.log`).
pub fn log_path(memory_root: &Path, id: &ArtefactId) -> PathBuf {
    raw_log_path(memory_root, &id.canonical())
}

/// Append a block to a log file, creating it (and parents) if needed.
pub fn append_block(path: &Path, block: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log {}", path.display()))?;
    file.write_all(block.as_bytes())
        .with_context(|| format!("append to log {}", path.display()))?;
    Ok(())
}

/// Create the epic memory document if missing; returns its path.
pub fn ensure_epic_memory(
    memory_root: &Path,
    epic: &ArtefactId,
    title: Option<&str>,
) -> Result<PathBuf> {
    let path = memory_root.join(format!("{}.md", epic.canonical()));
    render_if_missing(
        &path,
        EPIC_MEMORY_TEMPLATE,
        context! { id => epic.canonical(), title => title, created => now_timestamp() },
    )?;
    Ok(path)
}

/// Create the PRD memory document if missing; returns its path.
pub fn ensure_prd_memory(memory_root: &Path, prd: &ArtefactId) -> Result<PathBuf> {
    let path = memory_root.join(format!("{}.md", prd.canonical()));
    render_if_missing(
        &path,
        PRD_MEMORY_TEMPLATE,
        context! { id => prd.canonical(), created => now_timestamp() },
    )?;
    Ok(path)
}

/// Create the project-level `MEMORY.md` if missing; returns its path.
pub fn ensure_project_memory(memory_root: &Path) -> Result<PathBuf> {
    let path = memory_root.join("MEMORY.md");
    render_if_missing(
        &path,
        PROJECT_MEMORY_TEMPLATE,
        context! { created => now_timestamp() },
    )?;
    Ok(path)
}

fn render_if_missing(path: &Path, template: &str, ctx: minijinja::Value) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create memory directory {}", parent.display()))?;
    }
    let env = Environment::new();
    let rendered = env
        .render_str(template, ctx)
        .context("render memory template")?;
    debug!(path = %path.display(), "creating memory document");
    fs::write(path, rendered).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ident::ArtefactKind;

    #[test]
    fn epic_memory_renders_frontmatter_and_title() {
        let temp = tempfile::tempdir().expect("tempdir");
        let epic = ArtefactId::new(ArtefactKind::Epic, 3, None);

        let path = ensure_epic_memory(temp.path(), &epic, Some("Parser rework")).expect("ensure");
        let contents = fs::read_to_string(&path).expect("read");

        assert!(contents.starts_with("---\nepic: E003\n"));
        assert!(contents.contains("# E003: Parser rework"));
    }

    #[test]
    fn ensure_does_not_overwrite_curated_documents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let epic = ArtefactId::new(ArtefactKind::Epic, 3, None);

        let path = ensure_epic_memory(temp.path(), &epic, None).expect("ensure");
        fs::write(&path, "curated by a human\n").expect("write");
        ensure_epic_memory(temp.path(), &epic, None).expect("re-ensure");

        let contents = fs::read_to_string(&path).expect("read");
        assert_eq!(contents, "curated by a human\n");
    }

    #[test]
    fn append_block_creates_and_appends() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("E003.log");

        append_block(&path, "first\n").expect("append");
        append_block(&path, "second\n").expect("append");

        let contents = fs::read_to_string(&path).expect("read");
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn raw_log_path_uses_id_verbatim() {
        let path = raw_log_path(Path::new("/mem"), "T00007");
        assert_eq!(path, PathBuf::from("/mem/T00007.log"));
    }
}
