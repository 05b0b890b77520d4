//! C1 — State Store: a persistent `task_id -> relative_path -> FileState` map.
//!
//! Whole-file JSON persistence guarded by a single mutex, write-temp-then-
//! rename on save (the same durability pattern the teacher uses for its own
//! safe file overwrites in `write_operations/helpers.rs::safe_overwrite_file`,
//! here applied to the store's own backing file rather than a mirrored file).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::id::TaskId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileState {
    pub hash: String,
    pub mtime: u64,
    pub size: u64,
    pub last_sync_time: u64,
}

type TaskMap = HashMap<String, FileState>;

/// Process-wide, shared by every task (each task owns its own sub-map, keyed
/// by `task_id`, per the ownership model in §3).
pub struct StateStore {
    path: PathBuf,
    inner: Mutex<HashMap<String, TaskMap>>,
}

impl StateStore {
    /// Construct an empty, unpersisted store bound to `path`. Call [`Self::load`]
    /// to populate it from disk.
    pub fn new(path: PathBuf) -> Self {
        Self { path, inner: Mutex::new(HashMap::new()) }
    }

    /// Load the whole-file JSON document. A missing or corrupt file yields an
    /// empty map with a logged warning, per §4.1's failure semantics — this
    /// is never a hard error because losing the drift cache only costs one
    /// extra full-tree hash pass, not correctness.
    pub fn load(&self) {
        let data = match fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(target: "replicator::state_store", "no existing state file at {}", self.path.display());
                return;
            }
            Err(e) => {
                log::warn!(target: "replicator::state_store", "failed to read state file {}: {e}", self.path.display());
                return;
            }
        };
        match serde_json::from_str::<HashMap<String, TaskMap>>(&data) {
            Ok(map) => {
                *self.inner.lock().unwrap() = map;
            }
            Err(e) => {
                log::warn!(target: "replicator::state_store", "failed to parse state file {}: {e}", self.path.display());
            }
        }
    }

    /// Persist the whole map. Failures are logged; the in-memory map is
    /// untouched and the caller is expected to retry at the next checkpoint
    /// (§4.1, §5).
    pub fn save(&self) {
        let snapshot = self.inner.lock().unwrap().clone();
        if let Err(e) = self.save_inner(&snapshot) {
            log::warn!(target: "replicator::state_store", "failed to save state file {}: {e}", self.path.display());
        }
    }

    fn save_inner(&self, snapshot: &HashMap<String, TaskMap>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn get(&self, task_id: &TaskId, rel: &str) -> Option<FileState> {
        self.inner.lock().unwrap().get(task_id.as_str()).and_then(|m| m.get(rel)).cloned()
    }

    pub fn update(&self, task_id: &TaskId, rel: &str, state: FileState) {
        self.inner
            .lock()
            .unwrap()
            .entry(task_id.as_str().to_string())
            .or_default()
            .insert(rel.to_string(), state);
    }

    pub fn remove(&self, task_id: &TaskId, rel: &str) {
        if let Some(map) = self.inner.lock().unwrap().get_mut(task_id.as_str()) {
            map.remove(rel);
        }
    }

    /// Clears a task's sub-map and immediately persists (per §4.1, `clear_task`
    /// implies `save()`).
    pub fn clear_task(&self, task_id: &TaskId) {
        self.inner.lock().unwrap().remove(task_id.as_str());
        self.save();
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let task_id = TaskId::from("task-1");

        let store = StateStore::new(path.clone());
        store.load();
        store.update(
            &task_id,
            "a/b.txt",
            FileState { hash: "abc".into(), mtime: 10, size: 5, last_sync_time: 20 },
        );
        store.save();

        let reloaded = StateStore::new(path);
        reloaded.load();
        let state = reloaded.get(&task_id, "a/b.txt").unwrap();
        assert_eq!(state.hash, "abc");
        assert_eq!(state.size, 5);
    }

    #[test]
    fn missing_file_yields_empty_map() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("missing.json"));
        store.load();
        assert!(store.get(&TaskId::from("x"), "y").is_none());
    }

    #[test]
    fn clear_task_removes_only_that_task() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let t1 = TaskId::from("t1");
        let t2 = TaskId::from("t2");
        store.update(&t1, "a", FileState { hash: "h".into(), mtime: 0, size: 0, last_sync_time: 0 });
        store.update(&t2, "a", FileState { hash: "h".into(), mtime: 0, size: 0, last_sync_time: 0 });
        store.clear_task(&t1);
        assert!(store.get(&t1, "a").is_none());
        assert!(store.get(&t2, "a").is_some());
    }
}
