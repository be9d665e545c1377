//! Branch hierarchy materialization.
//!
//! Takes the pure plan from `core::branching` and ensures each branch
//! exists, creating missing ones from the correct parent. Creation is
//! idempotent and failures are collected per branch so siblings still get
//! created; two tasks racing to create the same shared branch both observe
//! it as existing.

use tracing::{debug, instrument, warn};

use crate::core::branching::{BranchingStrategy, branch_plan};
use crate::core::ident::ArtefactId;
use crate::io::git::Git;

/// Input for `ensure_hierarchy`.
#[derive(Debug, Clone)]
pub struct HierarchyRequest {
    pub prd: Option<ArtefactId>,
    pub epic: Option<ArtefactId>,
    pub strategy: BranchingStrategy,
    pub main_branch: String,
}

/// One branch that could not be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchError {
    pub branch: String,
    pub error: String,
}

/// Partial result of a hierarchy ensure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyOutcome {
    /// Every branch of the hierarchy that exists after the call, in
    /// parent-first order.
    pub branches: Vec<String>,
    /// The subset of `branches` created by this call.
    pub created: Vec<String>,
    pub errors: Vec<BranchError>,
}

impl HierarchyOutcome {
    /// The deepest existing branch, used as the base for task worktrees.
    pub fn leaf(&self) -> Option<&str> {
        self.branches.last().map(String::as_str)
    }
}

/// Ensure every shared branch the strategy requires exists.
///
/// Per-branch failures are recorded in the outcome instead of raised, so
/// the caller always receives the full picture.
#[instrument(skip_all, fields(strategy = %request.strategy))]
pub fn ensure_hierarchy(git: &Git, request: &HierarchyRequest) -> HierarchyOutcome {
    let plan = branch_plan(
        request.strategy,
        request.prd.as_ref(),
        request.epic.as_ref(),
        &request.main_branch,
    );

    let mut outcome = HierarchyOutcome::default();
    for spec in plan {
        match git.branch_exists(&spec.name) {
            Ok(true) => {
                debug!(branch = %spec.name, "branch already exists");
                outcome.branches.push(spec.name);
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                outcome.errors.push(BranchError {
                    branch: spec.name,
                    error: e.to_string(),
                });
                continue;
            }
        }

        match git.create_branch(&spec.name, &spec.parent) {
            Ok(()) => {
                debug!(branch = %spec.name, parent = %spec.parent, "created branch");
                outcome.created.push(spec.name.clone());
                outcome.branches.push(spec.name);
            }
            Err(e) => {
                // A concurrent spawn may have won the creation race.
                if git.branch_exists(&spec.name).unwrap_or(false) {
                    debug!(branch = %spec.name, "lost creation race, branch exists");
                    outcome.branches.push(spec.name);
                } else {
                    warn!(branch = %spec.name, error = %e, "branch creation failed");
                    outcome.errors.push(BranchError {
                        branch: spec.name,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ident::ArtefactKind;
    use crate::test_support::init_git_repo;

    fn request(strategy: BranchingStrategy) -> HierarchyRequest {
        HierarchyRequest {
            prd: Some(ArtefactId::new(ArtefactKind::Prd, 1, None)),
            epic: Some(ArtefactId::new(ArtefactKind::Epic, 3, None)),
            strategy,
            main_branch: "main".to_string(),
        }
    }

    #[test]
    fn flat_strategy_creates_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let git = Git::new(temp.path());

        let outcome = ensure_hierarchy(&git, &request(BranchingStrategy::Flat));
        assert!(outcome.branches.is_empty());
        assert!(outcome.created.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn epic_strategy_creates_prd_and_epic_branches() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let git = Git::new(temp.path());

        let outcome = ensure_hierarchy(&git, &request(BranchingStrategy::Epic));
        assert_eq!(outcome.branches, vec!["prd/PRD-001", "epic/E003"]);
        assert_eq!(outcome.created, outcome.branches);
        assert!(outcome.errors.is_empty());
        assert!(git.branch_exists("epic/E003").expect("exists"));
        assert_eq!(outcome.leaf(), Some("epic/E003"));
    }

    /// Verifies ensure_hierarchy is idempotent: the second call reports every
    /// branch as existing and creates nothing.
    #[test]
    fn second_call_creates_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let git = Git::new(temp.path());
        let req = request(BranchingStrategy::Epic);

        let first = ensure_hierarchy(&git, &req);
        assert_eq!(first.created.len(), 2);

        let second = ensure_hierarchy(&git, &req);
        assert_eq!(second.branches, first.branches);
        assert!(second.created.is_empty());
        assert!(second.errors.is_empty());
    }

    #[test]
    fn missing_parent_is_collected_not_raised() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_git_repo(temp.path());
        let git = Git::new(temp.path());

        let req = HierarchyRequest {
            main_branch: "no-such-branch".to_string(),
            ..request(BranchingStrategy::Prd)
        };
        let outcome = ensure_hierarchy(&git, &req);
        assert!(outcome.branches.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].branch, "prd/PRD-001");
    }
}
