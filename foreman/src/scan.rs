//! Orphan discovery and recovery.
//!
//! An agent whose process died without writing a terminal status leaves a
//! live record behind. Scanning probes every live record's pid and marks
//! dead ones `orphaned`; recovery re-enters `spawned` so a fresh spawn can
//! take over the task.

use anyhow::{Result, anyhow, bail};
use tracing::{info, instrument, warn};

use crate::core::agent::{AgentRecord, AgentStatus, AgentUpdate};
use crate::core::ident::{ArtefactId, ArtefactKind};
use crate::io::memory::now_timestamp;
use crate::io::process::process_alive;
use crate::io::store::AgentStore;

/// Result of an orphan scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Live records whose pid was probed.
    pub checked: usize,
    /// Task ids newly marked orphaned.
    pub orphaned: Vec<String>,
}

/// Probe every live agent's process and mark dead ones orphaned.
#[instrument(skip_all)]
pub fn scan_agents(store: &mut dyn AgentStore) -> Result<ScanOutcome> {
    let mut outcome = ScanOutcome::default();

    for record in store.list(None)? {
        if !record.status.is_live() {
            continue;
        }
        let Some(pid) = record.pid else {
            // Recorded but never launched; nothing to probe.
            continue;
        };
        outcome.checked += 1;
        if process_alive(pid) {
            continue;
        }

        warn!(task = %record.task_id, pid, "agent process is gone, marking orphaned");
        let now = now_timestamp();
        store.set_status(
            &record.task_id,
            AgentStatus::Orphaned,
            &AgentUpdate {
                orphaned_at: Some(now.clone()),
                ended_at: Some(now),
                ..AgentUpdate::default()
            },
        )?;
        outcome.orphaned.push(record.task_id);
    }

    info!(checked = outcome.checked, orphaned = outcome.orphaned.len(), "scan finished");
    Ok(outcome)
}

/// Re-enter `spawned` for an orphaned task so it can be spawned again.
pub fn recover_task(store: &mut dyn AgentStore, raw_task: &str) -> Result<AgentRecord> {
    let task = ArtefactId::parse(ArtefactKind::Task, raw_task)
        .ok_or_else(|| anyhow!("invalid task id '{raw_task}'"))?;
    let task_id = task.canonical();

    let record = store
        .get(&task_id)?
        .ok_or_else(|| anyhow!("no agent record for {task_id}"))?;
    if record.status != AgentStatus::Orphaned {
        bail!("agent for {task_id} is {} (only orphaned agents recover)", record.status);
    }

    store.set_status(
        &task_id,
        AgentStatus::Spawned,
        &AgentUpdate {
            recovered_at: Some(now_timestamp()),
            ..AgentUpdate::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::SqliteStore;

    fn running(store: &mut SqliteStore, task_id: &str, pid: u32) {
        store
            .set_status(
                task_id,
                AgentStatus::Running,
                &AgentUpdate {
                    pid: Some(pid),
                    ..AgentUpdate::default()
                },
            )
            .expect("seed record");
    }

    /// Verifies the running → orphaned → recovered → spawned path.
    #[test]
    fn dead_process_is_orphaned_then_recoverable() {
        let mut store = SqliteStore::in_memory().expect("store");
        // Spawn a child and let it exit so the pid is dead but was real.
        let mut child = std::process::Command::new("true").spawn().expect("spawn");
        child.wait().expect("wait");
        running(&mut store, "T001", child.id());

        let outcome = scan_agents(&mut store).expect("scan");
        assert_eq!(outcome.checked, 1);
        assert_eq!(outcome.orphaned, vec!["T001".to_string()]);

        let record = store.get("T001").expect("get").expect("record");
        assert_eq!(record.status, AgentStatus::Orphaned);
        assert!(record.orphaned_at.is_some());

        let recovered = recover_task(&mut store, "T1").expect("recover");
        assert_eq!(recovered.status, AgentStatus::Spawned);
        assert!(recovered.recovered_at.is_some());
        // The original spawn time is part of history and survives recovery.
        assert_eq!(recovered.spawned_at, record.spawned_at);
    }

    #[test]
    fn live_process_is_left_alone() {
        let mut store = SqliteStore::in_memory().expect("store");
        running(&mut store, "T002", std::process::id());

        let outcome = scan_agents(&mut store).expect("scan");
        assert_eq!(outcome.checked, 1);
        assert!(outcome.orphaned.is_empty());

        let record = store.get("T002").expect("get").expect("record");
        assert_eq!(record.status, AgentStatus::Running);
    }

    #[test]
    fn terminal_records_are_not_probed() {
        let mut store = SqliteStore::in_memory().expect("store");
        store
            .set_status("T003", AgentStatus::Completed, &AgentUpdate::default())
            .expect("seed");

        let outcome = scan_agents(&mut store).expect("scan");
        assert_eq!(outcome.checked, 0);
    }

    #[test]
    fn recover_rejects_non_orphaned_records() {
        let mut store = SqliteStore::in_memory().expect("store");
        running(&mut store, "T004", std::process::id());

        let err = recover_task(&mut store, "T004").unwrap_err();
        assert!(err.to_string().contains("only orphaned agents recover"));
    }
}
