//! Artefact identifiers for tasks, epics, and PRDs.
//!
//! Identifiers arrive in drifting formats (`T1`, `T001`, `T00039b`,
//! `prd-3`). Internally everything is normalized to a numeric key plus an
//! optional lowercase letter suffix, so lookups are insensitive to
//! zero-padding. The canonical string form re-pads to a stable width.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which artefact namespace an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtefactKind {
    Task,
    Epic,
    Prd,
}

impl ArtefactKind {
    /// Canonical id prefix for this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            ArtefactKind::Task => "T",
            ArtefactKind::Epic => "E",
            ArtefactKind::Prd => "PRD-",
        }
    }

    /// Lowercase label for diagnostics.
    pub fn label(self) -> &'static str {
        match self {
            ArtefactKind::Task => "task",
            ArtefactKind::Epic => "epic",
            ArtefactKind::Prd => "prd",
        }
    }
}

impl fmt::Display for ArtefactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A normalized task/epic/PRD identifier.
///
/// Equality covers kind, number, and suffix. The zero-padding of the source
/// string is deliberately not part of the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtefactId {
    pub kind: ArtefactKind,
    pub number: u32,
    /// Optional lowercase letter suffix (`T039b` → `b`).
    pub suffix: Option<char>,
}

static DIGITS_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0*([0-9]+)([A-Za-z])?$").expect("digits pattern"));

/// Permissive `parent:` frontmatter reference to an epic: `PRD-003 / E005`,
/// `E5`, `prd-3/e05a`, ...
static PARENT_EPIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:PRD-?0*[0-9]+\s*/\s*)?E0*([0-9]+)([a-z])?").expect("parent pattern")
});

/// PRD directory names: `PRD-003`, `PRD-0042b`, `prd-7`.
static PRD_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^PRD-?0*([0-9]+)([a-z])?$").expect("prd dir pattern"));

impl ArtefactId {
    pub fn new(kind: ArtefactKind, number: u32, suffix: Option<char>) -> Self {
        Self {
            kind,
            number,
            suffix: suffix.map(|c| c.to_ascii_lowercase()),
        }
    }

    /// Parse a raw identifier in any zero-padding/suffix/case form.
    ///
    /// Accepts an optional kind prefix, optional leading zeros, and an
    /// optional trailing letter. A string without digits does not resolve.
    pub fn parse(kind: ArtefactKind, raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let rest = strip_prefix_ci(trimmed, kind);
        let caps = DIGITS_SUFFIX_RE.captures(rest)?;
        let number: u32 = caps.get(1)?.as_str().parse().ok()?;
        let suffix = caps
            .get(2)
            .and_then(|m| m.as_str().chars().next())
            .map(|c| c.to_ascii_lowercase());
        Some(Self {
            kind,
            number,
            suffix,
        })
    }

    /// Parse an artefact filename (`T00039b.md`) into an identifier.
    pub fn parse_filename(kind: ArtefactKind, name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".md")?;
        Self::parse(kind, stem)
    }

    /// Canonical zero-padded string form (`T007`, `E003`, `PRD-042`).
    pub fn canonical(&self) -> String {
        let suffix = self.suffix.map(String::from).unwrap_or_default();
        format!("{}{:03}{}", self.kind.prefix(), self.number, suffix)
    }

    /// Padding-insensitive index key (`"39"`, `"5a"`).
    pub fn lookup_key(&self) -> String {
        let suffix = self.suffix.map(String::from).unwrap_or_default();
        format!("{}{}", self.number, suffix)
    }
}

impl fmt::Display for ArtefactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn strip_prefix_ci(raw: &str, kind: ArtefactKind) -> &str {
    if let Some(rest) = strip_ci(raw, kind.prefix()) {
        return rest;
    }
    // PRDs also appear without the dash (`PRD3`).
    if kind == ArtefactKind::Prd
        && let Some(rest) = strip_ci(raw, "PRD")
    {
        return rest;
    }
    raw
}

fn strip_ci<'a>(raw: &'a str, prefix: &str) -> Option<&'a str> {
    let bytes = raw.as_bytes();
    (bytes.len() >= prefix.len() && bytes[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes()))
        .then(|| &raw[prefix.len()..])
}

/// Extract the epic reference from a task's `parent` frontmatter value.
///
/// Accepts `PRD-003 / E005`, bare `E5`, and padding/case variants.
pub fn parse_epic_parent(value: &str) -> Option<ArtefactId> {
    let caps = PARENT_EPIC_RE.captures(value)?;
    let number: u32 = caps.get(1)?.as_str().parse().ok()?;
    let suffix = caps
        .get(2)
        .and_then(|m| m.as_str().chars().next())
        .map(|c| c.to_ascii_lowercase());
    Some(ArtefactId::new(ArtefactKind::Epic, number, suffix))
}

/// Parse a PRD directory name (`PRD-003`) into an identifier.
pub fn parse_prd_dir_name(name: &str) -> Option<ArtefactId> {
    let caps = PRD_DIR_RE.captures(name)?;
    let number: u32 = caps.get(1)?.as_str().parse().ok()?;
    let suffix = caps
        .get(2)
        .and_then(|m| m.as_str().chars().next())
        .map(|c| c.to_ascii_lowercase());
    Some(ArtefactId::new(ArtefactKind::Prd, number, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_padding_variants_to_same_id() {
        let forms = ["T1", "T001", "t0001", "1", "0001"];
        let ids: Vec<ArtefactId> = forms
            .iter()
            .map(|raw| ArtefactId::parse(ArtefactKind::Task, raw).expect("parse"))
            .collect();
        for id in &ids {
            assert_eq!(*id, ids[0]);
        }
        assert_eq!(ids[0].canonical(), "T001");
        assert_eq!(ids[0].lookup_key(), "1");
    }

    #[test]
    fn parses_letter_suffix_case_insensitively() {
        let a = ArtefactId::parse(ArtefactKind::Task, "T00039b").expect("parse");
        let b = ArtefactId::parse(ArtefactKind::Task, "t39B").expect("parse");
        assert_eq!(a, b);
        assert_eq!(a.canonical(), "T039b");
        assert_eq!(a.lookup_key(), "39b");
    }

    #[test]
    fn rejects_missing_digits() {
        assert_eq!(ArtefactId::parse(ArtefactKind::Task, "T"), None);
        assert_eq!(ArtefactId::parse(ArtefactKind::Task, ""), None);
        assert_eq!(ArtefactId::parse(ArtefactKind::Task, "abc"), None);
    }

    #[test]
    fn rejects_wrong_kind_prefix() {
        assert_eq!(ArtefactId::parse(ArtefactKind::Task, "E5"), None);
        assert_eq!(ArtefactId::parse(ArtefactKind::Epic, "T5"), None);
    }

    #[test]
    fn prd_parses_with_and_without_dash() {
        let dashed = ArtefactId::parse(ArtefactKind::Prd, "PRD-003").expect("parse");
        let bare = ArtefactId::parse(ArtefactKind::Prd, "prd3").expect("parse");
        assert_eq!(dashed, bare);
        assert_eq!(dashed.canonical(), "PRD-003");
    }

    #[test]
    fn parses_filenames() {
        let id = ArtefactId::parse_filename(ArtefactKind::Task, "T00039b.md").expect("parse");
        assert_eq!(id.lookup_key(), "39b");
        assert_eq!(ArtefactId::parse_filename(ArtefactKind::Task, "notes.txt"), None);
    }

    #[test]
    fn epic_parent_accepts_combined_and_bare_forms() {
        let combined = parse_epic_parent("PRD-003 / E005").expect("parse");
        assert_eq!(combined.canonical(), "E005");

        let bare = parse_epic_parent("e5").expect("parse");
        assert_eq!(bare, combined);

        assert_eq!(parse_epic_parent("no epic here"), None);
    }

    #[test]
    fn prd_dir_name_strips_padding() {
        let id = parse_prd_dir_name("PRD-0042").expect("parse");
        assert_eq!(id.number, 42);
        assert_eq!(id.canonical(), "PRD-042");
        assert_eq!(parse_prd_dir_name("epics"), None);
    }
}
