//! Agent workspace orchestration and lifecycle tracking.
//!
//! This crate coordinates autonomous worker ("agent") processes that each
//! perform one task against a shared git repository. Every agent gets an
//! isolated worktree + branch sandbox, its lifecycle is persisted in a
//! concurrency-safe store, and its log output is folded upward into the
//! task → epic → PRD → project memory hierarchy. The architecture enforces
//! a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (identifier parsing, branch
//!   planning, record merge semantics, log tagging). No I/O, fully testable
//!   in isolation.
//! - **[`io`]**: Side-effecting operations (git subprocesses, filesystem
//!   layout, configuration, the agent state store). Isolated to enable
//!   fakes in tests.
//!
//! Orchestration modules ([`spawn`], [`complete`], [`merge`], [`scan`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod complete;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod merge;
pub mod scan;
pub mod spawn;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
