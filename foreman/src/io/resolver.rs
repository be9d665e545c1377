//! Artefact identifier resolution over the `prds/` directory tree.
//!
//! The resolver scans `<prds_dir>/PRD-*/{epics,tasks}/` once, indexes every
//! artefact by its padding-insensitive lookup key, and answers flexible-ID
//! queries from the cache. Indices never auto-invalidate: callers that add,
//! rename, or remove artefacts must call [`Resolver::invalidate`] themselves.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::ident::{ArtefactId, ArtefactKind, parse_epic_parent, parse_prd_dir_name};
use crate::io::frontmatter;

/// Frontmatter fields the resolver interprets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtefactFront {
    pub status: Option<String>,
    pub parent: Option<String>,
    pub title: Option<String>,
}

impl ArtefactFront {
    fn is_done(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("done"))
    }
}

/// One indexed task/epic/PRD artefact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtefactRecord {
    pub id: ArtefactId,
    pub file_path: PathBuf,
    pub parent_dir: PathBuf,
    pub front: ArtefactFront,
}

/// Two artefacts collided on the same lookup key.
///
/// Suppressed only when both records are `Done`; the most recently scanned
/// record wins in the index either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateWarning {
    pub kind: ArtefactKind,
    pub key: String,
    pub kept: PathBuf,
    pub shadowed: PathBuf,
}

/// The resolved parent epic of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpicParent {
    pub id: ArtefactId,
    pub title: Option<String>,
}

#[derive(Debug, Default)]
struct Index {
    tasks: HashMap<String, ArtefactRecord>,
    epics: HashMap<String, ArtefactRecord>,
    prds: HashMap<String, ArtefactRecord>,
    duplicates: Vec<DuplicateWarning>,
}

/// Context object owning the artefact lookup caches.
///
/// Constructed once per controller run and passed to every call that needs
/// identifier resolution.
#[derive(Debug)]
pub struct Resolver {
    prds_dir: PathBuf,
    index: Option<Index>,
}

impl Resolver {
    pub fn new(prds_dir: impl Into<PathBuf>) -> Self {
        Self {
            prds_dir: prds_dir.into(),
            index: None,
        }
    }

    /// Resolve a raw identifier in any padding/suffix/case form.
    pub fn resolve(&mut self, kind: ArtefactKind, raw: &str) -> Option<&ArtefactRecord> {
        let id = ArtefactId::parse(kind, raw)?;
        let key = id.lookup_key();
        let index = self.index();
        match kind {
            ArtefactKind::Task => index.tasks.get(&key),
            ArtefactKind::Epic => index.epics.get(&key),
            ArtefactKind::Prd => index.prds.get(&key),
        }
    }

    /// The parent epic of a task, from the task's `parent` frontmatter.
    pub fn parent_epic_of(&mut self, raw_task: &str) -> Option<EpicParent> {
        let parent_value = self
            .resolve(ArtefactKind::Task, raw_task)?
            .front
            .parent
            .clone()?;
        let epic_ref = parse_epic_parent(&parent_value)?;
        let epic = self.index().epics.get(&epic_ref.lookup_key())?;
        Some(EpicParent {
            id: epic.id,
            title: epic.front.title.clone(),
        })
    }

    /// The parent PRD of an epic, derived from its containing directory name.
    pub fn parent_prd_of(&mut self, raw_epic: &str) -> Option<ArtefactId> {
        let epic = self.resolve(ArtefactKind::Epic, raw_epic)?;
        // epics live in <prd-dir>/epics/, so the PRD name is one level up.
        let prd_dir = epic.parent_dir.parent()?;
        let name = prd_dir.file_name()?.to_str()?;
        parse_prd_dir_name(name)
    }

    /// Duplicate-key warnings collected during the scan.
    pub fn duplicates(&mut self) -> &[DuplicateWarning] {
        &self.index().duplicates
    }

    /// Drop the cached indices. The next query rescans the directory tree.
    pub fn invalidate(&mut self) {
        debug!("invalidating artefact indices");
        self.index = None;
    }

    fn index(&mut self) -> &Index {
        self.index
            .get_or_insert_with(|| build_index(&self.prds_dir))
    }
}

fn build_index(prds_dir: &Path) -> Index {
    let mut index = Index::default();
    debug!(prds_dir = %prds_dir.display(), "building artefact index");

    let entries = match fs::read_dir(prds_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(prds_dir = %prds_dir.display(), error = %e, "prds directory not readable");
            return index;
        }
    };

    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(prd_id) = parse_prd_dir_name(name) else {
            continue;
        };

        let prd_file = dir.join("prd.md");
        let front = if prd_file.is_file() {
            read_front(&prd_file)
        } else {
            ArtefactFront::default()
        };
        insert(
            &mut index.prds,
            &mut index.duplicates,
            ArtefactRecord {
                id: prd_id,
                file_path: prd_file,
                parent_dir: prds_dir.to_path_buf(),
                front,
            },
        );

        scan_kind(&dir.join("epics"), ArtefactKind::Epic, &mut index);
        scan_kind(&dir.join("tasks"), ArtefactKind::Task, &mut index);
    }

    index
}

fn scan_kind(dir: &Path, kind: ArtefactKind, index: &mut Index) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(id) = ArtefactId::parse_filename(kind, name) else {
            continue;
        };
        let record = ArtefactRecord {
            id,
            front: read_front(&path),
            parent_dir: dir.to_path_buf(),
            file_path: path,
        };
        let map = match kind {
            ArtefactKind::Task => &mut index.tasks,
            ArtefactKind::Epic => &mut index.epics,
            ArtefactKind::Prd => &mut index.prds,
        };
        insert(map, &mut index.duplicates, record);
    }
}

fn insert(
    map: &mut HashMap<String, ArtefactRecord>,
    duplicates: &mut Vec<DuplicateWarning>,
    record: ArtefactRecord,
) {
    let key = record.id.lookup_key();
    if let Some(existing) = map.get(&key) {
        // Two files for the same key is only benign when both are finished.
        if !(existing.front.is_done() && record.front.is_done()) {
            warn!(
                kind = %record.id.kind,
                key = %key,
                kept = %record.file_path.display(),
                shadowed = %existing.file_path.display(),
                "duplicate artefact id"
            );
            duplicates.push(DuplicateWarning {
                kind: record.id.kind,
                key: key.clone(),
                kept: record.file_path.clone(),
                shadowed: existing.file_path.clone(),
            });
        }
    }
    map.insert(key, record);
}

fn read_front(path: &Path) -> ArtefactFront {
    match read_front_inner(path) {
        Ok(front) => front,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable artefact frontmatter");
            ArtefactFront::default()
        }
    }
}

fn read_front_inner(path: &Path) -> Result<ArtefactFront> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let doc = frontmatter::parse(&contents)?;
    Ok(ArtefactFront {
        status: frontmatter::get_str(&doc.data, "status").map(str::to_string),
        parent: frontmatter::get_str(&doc.data, "parent").map(str::to_string),
        title: frontmatter::get_str(&doc.data, "title").map(str::to_string),
    })
}
