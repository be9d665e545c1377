//! Branch hierarchy planning for the configured branching strategy.
//!
//! Planning is pure: given a strategy and the task's PRD/epic context it
//! returns the ordered chain of shared branches that must exist, each with
//! the branch it is parented on. Materializing the plan lives in
//! `io::branches`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::ident::ArtefactId;

/// How many levels of shared branch are created above a task's own branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchingStrategy {
    /// No shared branches; task branches hang off the main branch.
    #[default]
    Flat,
    /// One shared branch per PRD, parented on main.
    Prd,
    /// A PRD branch plus one branch per epic, parented on the PRD branch.
    Epic,
}

impl fmt::Display for BranchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchingStrategy::Flat => f.write_str("flat"),
            BranchingStrategy::Prd => f.write_str("prd"),
            BranchingStrategy::Epic => f.write_str("epic"),
        }
    }
}

impl FromStr for BranchingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(BranchingStrategy::Flat),
            "prd" => Ok(BranchingStrategy::Prd),
            "epic" => Ok(BranchingStrategy::Epic),
            other => Err(format!("unknown branching strategy '{other}'")),
        }
    }
}

/// One branch the hierarchy requires, with the branch it forks from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSpec {
    pub name: String,
    pub parent: String,
}

/// Branch name for a PRD-level shared branch (`prd/PRD-003`).
pub fn prd_branch(prd: &ArtefactId) -> String {
    format!("prd/{}", prd.canonical())
}

/// Branch name for an epic-level shared branch (`epic/E003`).
pub fn epic_branch(epic: &ArtefactId) -> String {
    format!("epic/{}", epic.canonical())
}

/// Branch name for a task's own branch (`task/T007`).
pub fn task_branch(task: &ArtefactId) -> String {
    format!("task/{}", task.canonical())
}

/// Compute the ordered chain of shared branches the strategy requires.
///
/// The chain is parent-first so callers can create branches in order. A
/// missing PRD/epic id simply shortens the chain; `flat` always yields an
/// empty plan.
pub fn branch_plan(
    strategy: BranchingStrategy,
    prd: Option<&ArtefactId>,
    epic: Option<&ArtefactId>,
    main_branch: &str,
) -> Vec<BranchSpec> {
    match strategy {
        BranchingStrategy::Flat => Vec::new(),
        BranchingStrategy::Prd => prd
            .map(|prd| {
                vec![BranchSpec {
                    name: prd_branch(prd),
                    parent: main_branch.to_string(),
                }]
            })
            .unwrap_or_default(),
        BranchingStrategy::Epic => {
            let mut plan = Vec::new();
            let mut epic_parent = main_branch.to_string();
            if let Some(prd) = prd {
                let name = prd_branch(prd);
                epic_parent = name.clone();
                plan.push(BranchSpec {
                    name,
                    parent: main_branch.to_string(),
                });
            }
            if let Some(epic) = epic {
                plan.push(BranchSpec {
                    name: epic_branch(epic),
                    parent: epic_parent,
                });
            }
            plan
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ident::ArtefactKind;

    fn prd() -> ArtefactId {
        ArtefactId::new(ArtefactKind::Prd, 3, None)
    }

    fn epic() -> ArtefactId {
        ArtefactId::new(ArtefactKind::Epic, 5, None)
    }

    #[test]
    fn flat_plans_nothing() {
        let plan = branch_plan(BranchingStrategy::Flat, Some(&prd()), Some(&epic()), "main");
        assert!(plan.is_empty());
    }

    #[test]
    fn prd_strategy_plans_one_branch_off_main() {
        let plan = branch_plan(BranchingStrategy::Prd, Some(&prd()), Some(&epic()), "main");
        assert_eq!(
            plan,
            vec![BranchSpec {
                name: "prd/PRD-003".to_string(),
                parent: "main".to_string(),
            }]
        );
    }

    #[test]
    fn epic_strategy_chains_epic_onto_prd_branch() {
        let plan = branch_plan(BranchingStrategy::Epic, Some(&prd()), Some(&epic()), "main");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].name, "prd/PRD-003");
        assert_eq!(plan[0].parent, "main");
        assert_eq!(plan[1].name, "epic/E005");
        assert_eq!(plan[1].parent, "prd/PRD-003");
    }

    #[test]
    fn epic_strategy_without_prd_parents_epic_on_main() {
        let plan = branch_plan(BranchingStrategy::Epic, None, Some(&epic()), "trunk");
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].name, "epic/E005");
        assert_eq!(plan[0].parent, "trunk");
    }

    #[test]
    fn task_branch_uses_canonical_id() {
        let task = ArtefactId::new(ArtefactKind::Task, 7, None);
        assert_eq!(task_branch(&task), "task/T007");
    }
}
