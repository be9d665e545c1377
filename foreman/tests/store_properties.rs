//! Property suite for the agent state store, run against both backends.
//!
//! The sqlite and document backends are interchangeable; every property
//! here must hold for each of them through the same `AgentStore` trait.

use std::path::Path;

use foreman::core::agent::{AgentStatus, AgentUpdate};
use foreman::io::store::{AgentStore, DocStore, SqliteStore};

fn each_backend(test: impl Fn(&mut dyn AgentStore)) {
    let temp = tempfile::tempdir().expect("tempdir");

    let mut sqlite = SqliteStore::open(&temp.path().join("agents.db")).expect("open sqlite");
    test(&mut sqlite);

    let state = temp.path().join("docs");
    let mut docs = DocStore::open(
        &state.join("agents.json"),
        &state.join("runs.json"),
        &state.join("store.lock"),
    );
    test(&mut docs);
}

/// Upserting `{status: running}` then `{pid: 123}` yields a record with
/// both fields set, not an overwrite of one by the other.
#[test]
fn upsert_is_commutative_across_disjoint_fields() {
    each_backend(|store| {
        store
            .upsert("T001", &AgentUpdate::status(AgentStatus::Running))
            .expect("first upsert");
        let record = store
            .upsert(
                "T001",
                &AgentUpdate {
                    pid: Some(123),
                    ..AgentUpdate::default()
                },
            )
            .expect("second upsert");

        assert_eq!(record.status, AgentStatus::Running);
        assert_eq!(record.pid, Some(123));
    });
}

/// `set_status` transitions exactly the status and leaves previously-set
/// fields unchanged.
#[test]
fn set_status_preserves_existing_fields() {
    each_backend(|store| {
        let before = store
            .upsert(
                "T002",
                &AgentUpdate {
                    status: Some(AgentStatus::Running),
                    branch: Some("task/T002".to_string()),
                    ..AgentUpdate::default()
                },
            )
            .expect("seed");

        store
            .set_status("T002", AgentStatus::Completed, &AgentUpdate::default())
            .expect("set status");

        let record = store.get("T002").expect("get").expect("record");
        assert_eq!(record.status, AgentStatus::Completed);
        assert_eq!(record.spawned_at, before.spawned_at);
        assert_eq!(record.branch.as_deref(), Some("task/T002"));
    });
}

/// A second spawn for the same task updates the existing record; the task
/// id stays unique in the store.
#[test]
fn task_id_is_a_unique_key() {
    each_backend(|store| {
        store.upsert("T003", &AgentUpdate::default()).expect("first");
        store
            .upsert("T003", &AgentUpdate::status(AgentStatus::Running))
            .expect("second");

        let records = store.list(None).expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AgentStatus::Running);
    });
}

#[test]
fn list_sorts_newest_spawn_first_and_filters_by_status() {
    each_backend(|store| {
        store
            .upsert(
                "T010",
                &AgentUpdate {
                    spawned_at: Some("2024-01-01T00:00:00.000Z".to_string()),
                    status: Some(AgentStatus::Completed),
                    ..AgentUpdate::default()
                },
            )
            .expect("older");
        store
            .upsert(
                "T011",
                &AgentUpdate {
                    spawned_at: Some("2024-02-01T00:00:00.000Z".to_string()),
                    status: Some(AgentStatus::Running),
                    ..AgentUpdate::default()
                },
            )
            .expect("newer");

        let all = store.list(None).expect("list");
        let ids: Vec<&str> = all.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["T011", "T010"]);

        let running = store.list(Some(AgentStatus::Running)).expect("filtered");
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].task_id, "T011");
    });
}

#[test]
fn delete_and_clear_report_what_they_removed() {
    each_backend(|store| {
        store.upsert("T020", &AgentUpdate::default()).expect("seed");
        store.upsert("T021", &AgentUpdate::default()).expect("seed");

        assert!(store.delete("T020").expect("delete"));
        assert!(!store.delete("T020").expect("re-delete"));

        assert_eq!(store.clear().expect("clear"), 1);
        assert!(store.list(None).expect("list").is_empty());
    });
}

#[test]
fn runs_are_append_only_history_newest_first() {
    each_backend(|store| {
        let first = store
            .create_run("T030", Some(Path::new("/logs/T030.log")))
            .expect("first run");
        store.complete_run(&first.id, Some(1)).expect("complete");
        // Millisecond timestamps order the attempts; keep them distinct.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = store.create_run("T030", None).expect("second run");

        let runs = store.runs_for("T030").expect("runs");
        assert_eq!(runs.len(), 2);
        // Newest start first; the completed attempt keeps its exit code.
        assert_eq!(runs[0].id, second.id);
        assert!(runs[0].ended_at.is_none());
        assert_eq!(runs[1].exit_code, Some(1));
        assert!(runs[1].ended_at.is_some());

        assert!(store.runs_for("T999").expect("other runs").is_empty());
    });
}

/// The lifecycle state machine holds end-to-end through the store:
/// spawned → running → completed, with each write preserving history.
#[test]
fn lifecycle_transitions_accumulate_history() {
    each_backend(|store| {
        let spawned = store
            .upsert("T040", &AgentUpdate::default())
            .expect("spawn");
        assert_eq!(spawned.status, AgentStatus::Spawned);

        store
            .set_status(
                "T040",
                AgentStatus::Running,
                &AgentUpdate {
                    pid: Some(4242),
                    ..AgentUpdate::default()
                },
            )
            .expect("running");

        let done = store
            .set_status(
                "T040",
                AgentStatus::Completed,
                &AgentUpdate {
                    ended_at: Some("2024-03-01T00:00:00.000Z".to_string()),
                    exit_code: Some(0),
                    ..AgentUpdate::default()
                },
            )
            .expect("completed");

        assert_eq!(done.status, AgentStatus::Completed);
        assert_eq!(done.pid, Some(4242));
        assert_eq!(done.exit_code, Some(0));
        assert_eq!(done.spawned_at, spawned.spawned_at);
    });
}
