//! JSON-document agent store.
//!
//! Records live in `agents.json` / `runs.json`. Every operation takes a
//! file lock on a sidecar lock file around its read-modify-write, and all
//! writes go through temp-file + rename, so concurrent processes see either
//! the old or the new document, never a torn one.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use fs2::FileExt;
use tracing::debug;

use crate::core::agent::{AgentRecord, AgentStatus, AgentUpdate, RunRecord};
use crate::io::memory::now_timestamp;
use crate::io::store::AgentStore;

pub struct DocStore {
    agents_path: PathBuf,
    runs_path: PathBuf,
    lock_path: PathBuf,
}

type AgentMap = BTreeMap<String, AgentRecord>;

impl DocStore {
    pub fn open(agents_path: &Path, runs_path: &Path, lock_path: &Path) -> Self {
        Self {
            agents_path: agents_path.to_path_buf(),
            runs_path: runs_path.to_path_buf(),
            lock_path: lock_path.to_path_buf(),
        }
    }

    fn locked<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create state directory {}", parent.display()))?;
        }
        let lock = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .with_context(|| format!("open lock file {}", self.lock_path.display()))?;
        FileExt::lock_exclusive(&lock)
            .with_context(|| format!("lock {}", self.lock_path.display()))?;
        let result = f();
        let _ = FileExt::unlock(&lock);
        result
    }

    fn load_agents(&self) -> Result<AgentMap> {
        load_json(&self.agents_path)
    }

    fn load_runs(&self) -> Result<Vec<RunRecord>> {
        load_json(&self.runs_path)
    }
}

impl AgentStore for DocStore {
    fn upsert(&mut self, task_id: &str, update: &AgentUpdate) -> Result<AgentRecord> {
        self.locked(|| {
            let mut agents = load_json::<AgentMap>(&self.agents_path)?;
            let record = agents.entry(task_id.to_string()).or_insert_with(|| {
                let spawned_at = update
                    .spawned_at
                    .clone()
                    .unwrap_or_else(now_timestamp);
                AgentRecord::fresh(task_id, &spawned_at)
            });
            record.apply(update);
            let record = record.clone();
            write_json(&self.agents_path, &agents)?;
            debug!(task_id, status = %record.status, "upserted agent record");
            Ok(record)
        })
    }

    fn get(&self, task_id: &str) -> Result<Option<AgentRecord>> {
        self.locked(|| Ok(self.load_agents()?.get(task_id).cloned()))
    }

    fn list(&self, status: Option<AgentStatus>) -> Result<Vec<AgentRecord>> {
        self.locked(|| {
            let mut records: Vec<AgentRecord> = self
                .load_agents()?
                .into_values()
                .filter(|r| status.is_none_or(|s| r.status == s))
                .collect();
            records.sort_by(|a, b| {
                b.spawned_at
                    .cmp(&a.spawned_at)
                    .then_with(|| a.task_id.cmp(&b.task_id))
            });
            Ok(records)
        })
    }

    fn delete(&mut self, task_id: &str) -> Result<bool> {
        self.locked(|| {
            let mut agents = load_json::<AgentMap>(&self.agents_path)?;
            let existed = agents.remove(task_id).is_some();
            if existed {
                write_json(&self.agents_path, &agents)?;
            }
            Ok(existed)
        })
    }

    fn clear(&mut self) -> Result<usize> {
        self.locked(|| {
            let agents = load_json::<AgentMap>(&self.agents_path)?;
            let count = agents.len();
            write_json(&self.agents_path, &AgentMap::new())?;
            Ok(count)
        })
    }

    fn create_run(&mut self, task_id: &str, log_file: Option<&Path>) -> Result<RunRecord> {
        self.locked(|| {
            let mut runs = self.load_runs()?;
            let run = RunRecord {
                id: uuid::Uuid::new_v4().to_string(),
                task_id: task_id.to_string(),
                started_at: now_timestamp(),
                ended_at: None,
                exit_code: None,
                log_file: log_file.map(Path::to_path_buf),
            };
            runs.push(run.clone());
            write_json(&self.runs_path, &runs)?;
            Ok(run)
        })
    }

    fn complete_run(&mut self, run_id: &str, exit_code: Option<i32>) -> Result<()> {
        self.locked(|| {
            let mut runs = self.load_runs()?;
            let Some(run) = runs.iter_mut().find(|r| r.id == run_id) else {
                bail!("run {run_id} not found");
            };
            if run.ended_at.is_some() {
                bail!("run {run_id} not found or already completed");
            }
            run.ended_at = Some(now_timestamp());
            run.exit_code = exit_code;
            write_json(&self.runs_path, &runs)?;
            Ok(())
        })
    }

    fn runs_for(&self, task_id: &str) -> Result<Vec<RunRecord>> {
        self.locked(|| {
            let mut runs: Vec<RunRecord> = self
                .load_runs()?
                .into_iter()
                .filter(|r| r.task_id == task_id)
                .collect();
            runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
            Ok(runs)
        })
    }
}

fn load_json<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Atomically write a document (temp file + rename).
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("store path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = serde_json::to_string_pretty(value).context("serialize store document")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp document {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(temp: &tempfile::TempDir) -> DocStore {
        let state = temp.path().join("state");
        DocStore::open(
            &state.join("agents.json"),
            &state.join("runs.json"),
            &state.join("store.lock"),
        )
    }

    #[test]
    fn upsert_creates_document_on_first_write() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut store = open_store(&temp);

        let record = store
            .upsert("T001", &AgentUpdate::status(AgentStatus::Running))
            .expect("upsert");
        assert_eq!(record.status, AgentStatus::Running);
        assert!(temp.path().join("state/agents.json").is_file());
    }

    #[test]
    fn documents_survive_reopen() {
        let temp = tempfile::tempdir().expect("tempdir");
        {
            let mut store = open_store(&temp);
            store.upsert("T001", &AgentUpdate::default()).expect("upsert");
        }

        let store = open_store(&temp);
        let record = store.get("T001").expect("get").expect("record");
        assert_eq!(record.status, AgentStatus::Spawned);
    }

    #[test]
    fn complete_run_is_write_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut store = open_store(&temp);
        let run = store.create_run("T001", None).expect("create");

        store.complete_run(&run.id, Some(2)).expect("complete");
        assert!(store.complete_run(&run.id, Some(0)).is_err());

        let runs = store.runs_for("T001").expect("runs");
        assert_eq!(runs[0].exit_code, Some(2));
    }
}
