//! Stable exit codes for foreman CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config/arguments or other errors.
pub const INVALID: i32 = 1;
/// The given task/epic/PRD identifier did not resolve to an artefact.
pub const NOT_FOUND: i32 = 2;
/// `foreman scan` found agents whose process died without a terminal status.
pub const ORPHANED: i32 = 3;
