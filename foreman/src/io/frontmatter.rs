//! YAML frontmatter parse/stringify utility.
//!
//! Artefact and memory documents carry a `---`-delimited YAML header above
//! a free-form markdown body. This module is a pure text transformation;
//! interpretation of the fields belongs to the callers.

use anyhow::{Context, Result};
use serde_yaml::Mapping;

/// A document split into frontmatter data and markdown body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub data: Mapping,
    pub body: String,
}

/// Parse a document into frontmatter data and body.
///
/// A document without a frontmatter block yields an empty mapping and the
/// full text as body. Malformed YAML inside the block is an error.
pub fn parse(text: &str) -> Result<Document> {
    let Some((header, body)) = split_frontmatter(text) else {
        return Ok(Document {
            data: Mapping::new(),
            body: text.to_string(),
        });
    };
    let data: Mapping = serde_yaml::from_str(header).context("parse frontmatter yaml")?;
    Ok(Document {
        data,
        body: body.to_string(),
    })
}

/// Render frontmatter data and body back into a document.
pub fn stringify(data: &Mapping, body: &str) -> Result<String> {
    let mut buf = String::new();
    if !data.is_empty() {
        let yaml = serde_yaml::to_string(data).context("serialize frontmatter yaml")?;
        buf.push_str("---\n");
        buf.push_str(yaml.trim_end());
        buf.push_str("\n---\n\n");
    }
    buf.push_str(body.trim_start_matches('\n'));
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    Ok(buf)
}

/// Fetch a string-valued frontmatter field.
pub fn get_str<'a>(data: &'a Mapping, key: &str) -> Option<&'a str> {
    data.get(key).and_then(|v| v.as_str())
}

/// Split a document into (frontmatter, rest). Returns None if it doesn't look like frontmatter.
fn split_frontmatter(contents: &str) -> Option<(&str, &str)> {
    if !contents.starts_with("---\n") {
        return None;
    }
    let after = &contents[4..];
    let end = after.find("\n---\n")?;
    Some((&after[..end], &after[end + 5..]))
}
