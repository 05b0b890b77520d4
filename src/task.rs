//! Task definition — the user-facing configuration unit (§3).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::id::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    OneWay,
    TwoWay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    NewestWins,
    SourceWins,
    TargetWins,
    KeepBoth,
    AskUser,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorMode {
    Realtime,
    Polling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMethod {
    Mtime,
    Hash,
}

fn default_true() -> bool {
    true
}

fn default_safety_threshold() -> u32 {
    100
}

fn default_batch_delay() -> u64 {
    2
}

fn default_poll_interval() -> u64 {
    30
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// A replication task: one source, one or more targets, a policy.
///
/// Immutable by convention once handed to a [`crate::runner::TaskRunner`] —
/// mutating fields while a runner owns the task requires going through
/// [`crate::manager::TaskManager::update_task`], which stops, rebuilds, and
/// restarts the runner (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub source: PathBuf,
    pub targets: Vec<PathBuf>,
    pub mode: SyncMode,
    pub conflict_strategy: ConflictStrategy,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub delete_orphans: bool,
    #[serde(default)]
    pub initial_sync_delete: bool,
    #[serde(default)]
    pub disable_delete: bool,
    #[serde(default)]
    pub reverse_delete: bool,

    #[serde(default = "default_safety_threshold")]
    pub safety_threshold: u32,
    #[serde(default = "default_batch_delay")]
    pub batch_delay: u64,
    #[serde(default = "default_monitor_mode")]
    pub monitor_mode: MonitorMode,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_compare_method")]
    pub compare_method: CompareMethod,

    #[serde(default = "unix_now")]
    pub created_at: u64,
    #[serde(default = "unix_now")]
    pub updated_at: u64,
    #[serde(default)]
    pub last_run_time: Option<u64>,
}

fn default_monitor_mode() -> MonitorMode {
    MonitorMode::Realtime
}

fn default_compare_method() -> CompareMethod {
    CompareMethod::Mtime
}

impl Task {
    pub fn new(name: impl Into<String>, source: PathBuf, targets: Vec<PathBuf>, mode: SyncMode) -> Self {
        let now = unix_now();
        Self {
            id: TaskId::new(),
            name: name.into(),
            source,
            targets,
            mode,
            conflict_strategy: ConflictStrategy::NewestWins,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            enabled: true,
            auto_start: false,
            delete_orphans: false,
            initial_sync_delete: false,
            disable_delete: false,
            reverse_delete: false,
            safety_threshold: default_safety_threshold(),
            batch_delay: default_batch_delay(),
            monitor_mode: MonitorMode::Realtime,
            poll_interval: default_poll_interval(),
            compare_method: CompareMethod::Mtime,
            created_at: now,
            updated_at: now,
            last_run_time: None,
        }
    }

    /// The task's `exclude_patterns` union with any target paths nested under
    /// the source (as absolute paths and as basenames) — "effective excludes"
    /// in the glossary. Also validates that no target equals the source.
    pub fn effective_excludes(&self) -> Vec<String> {
        let mut excludes = self.exclude_patterns.clone();
        for target in &self.targets {
            if let Ok(rel) = target.strip_prefix(&self.source) {
                let rel_str = rel.to_string_lossy().to_string();
                if !rel_str.is_empty() {
                    excludes.push(rel_str);
                }
                if let Some(name) = target.file_name() {
                    excludes.push(name.to_string_lossy().to_string());
                }
            }
        }
        excludes
    }

    /// True if `target` is not equal to the source. Descendants of the
    /// source are allowed (and excluded from replication via
    /// `effective_excludes`), not rejected here.
    pub fn validate_target(source: &Path, target: &Path) -> bool {
        if source == target {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_excludes_includes_nested_target() {
        let task = Task::new(
            "t",
            PathBuf::from("/src"),
            vec![PathBuf::from("/src/.mirror"), PathBuf::from("/other/target")],
            SyncMode::OneWay,
        );
        let excludes = task.effective_excludes();
        assert!(excludes.contains(&".mirror".to_string()));
        // A non-nested target's basename must not leak into the exclude set
        // (it would otherwise prune an unrelated "target" directory under source).
        assert!(!excludes.contains(&"target".to_string()));
    }

    #[test]
    fn validate_target_rejects_source_equal_to_target() {
        let p = PathBuf::from("/a");
        assert!(!Task::validate_target(&p, &p));
        assert!(Task::validate_target(&p, &PathBuf::from("/b")));
    }
}
