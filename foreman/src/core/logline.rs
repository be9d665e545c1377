//! Log-line tagging for upward merges.
//!
//! Task logs are sequences of timestamped, level-tagged lines. When a task
//! log is folded into its epic's log, every timestamped line gains the
//! originating task id immediately after the timestamp, so interleaved
//! entries from many tasks stay attributable.

use std::sync::LazyLock;

use regex::Regex;

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?)(\s*)(.*)$")
        .expect("timestamp pattern")
});

/// Tag every ISO-8601-timestamped line with `[<task_id>]` after the
/// timestamp. Lines without a leading timestamp pass through unchanged.
///
/// `"2024-01-01T00:00:00.000Z [INFO] hi"` tagged with `T00007` becomes
/// `"2024-01-01T00:00:00.000Z [T00007] [INFO] hi"`.
pub fn tag_lines(task_id: &str, text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for line in text.lines() {
        match TIMESTAMP_RE.captures(line) {
            Some(caps) => {
                out.push_str(&caps[1]);
                out.push_str(" [");
                out.push_str(task_id);
                out.push_str("] ");
                out.push_str(&caps[3]);
            }
            None => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

/// True when the log body carries no content worth merging.
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
