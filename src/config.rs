//! Task-definition persistence (§6, §4.11): a JSON document
//! `{ "tasks": [ <Task> ... ] }` under a configurable storage root.
//!
//! Grounded on the teacher's `settings.rs::load_settings`, which resolves
//! `app.path().app_data_dir()` and reads a JSON file there with a
//! defaults-on-failure fallback; `StorageRoot` generalizes that directory
//! resolution (via the `dirs` crate instead of a Tauri `AppHandle`) and adds
//! the write-temp-then-rename save path the teacher recommends for its own
//! `write_operations/helpers.rs::safe_overwrite_file`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::task::Task;

/// Resolves the configurable storage root to the two JSON documents the
/// core persists: the task list and the state store.
#[derive(Debug, Clone)]
pub struct StorageRoot {
    root: PathBuf,
}

impl StorageRoot {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The platform config directory joined with `replicator`, the same
    /// resolution strategy the teacher uses for `app_data_dir()`.
    pub fn default_platform() -> Self {
        let root = dirs::config_dir().unwrap_or_else(std::env::temp_dir).join("replicator");
        Self { root }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.root.join("tasks.json")
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TasksDocument {
    #[serde(default)]
    tasks: Vec<Task>,
}

/// Loads the task list. A missing file yields an empty list (first run);
/// unknown fields on individual tasks are ignored by `serde`'s default
/// behavior, matching §6.
pub fn load_tasks(path: &PathBuf) -> Result<Vec<Task>> {
    let data = match fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::Io { path: Some(path.clone()), source: e }),
    };
    let doc: TasksDocument = serde_json::from_str(&data).map_err(|e| Error::Json { path: Some(path.clone()), source: e })?;
    Ok(doc.tasks)
}

/// Persists the task list with write-temp-then-rename, so a crash mid-save
/// cannot corrupt `tasks.json`.
pub fn save_tasks(path: &PathBuf, tasks: &[Task]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::Io { path: Some(parent.to_path_buf()), source: e })?;
    }
    let doc = TasksDocument { tasks: tasks.to_vec() };
    let json = serde_json::to_string_pretty(&doc).map_err(|e| Error::Json { path: Some(path.clone()), source: e })?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json).map_err(|e| Error::Io { path: Some(tmp_path.clone()), source: e })?;
    fs::rename(&tmp_path, path).map_err(|e| Error::Io { path: Some(path.clone()), source: e })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::SyncMode;
    use tempfile::tempdir;

    #[test]
    fn missing_tasks_file_yields_empty_list() {
        let dir = tempdir().unwrap();
        let tasks = load_tasks(&dir.path().join("tasks.json")).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn round_trips_task_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let task = Task::new("t", PathBuf::from("/s"), vec![PathBuf::from("/t")], SyncMode::OneWay);
        save_tasks(&path, &[task.clone()]).unwrap();

        let reloaded = load_tasks(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].id, task.id);
    }

    #[test]
    fn unknown_fields_are_ignored_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        fs::write(
            &path,
            r#"{"tasks":[{"id":"t1","name":"n","source":"/s","targets":["/t"],"mode":"one_way","conflict_strategy":"skip","made_up_field":42}]}"#,
        )
        .unwrap();
        let tasks = load_tasks(&path).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "n");
    }
}
