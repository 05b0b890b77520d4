//! C3 — Sync Processor: per-file decide-and-execute, full-tree scan+plan,
//! forward and reverse variants (§4.3).
//!
//! `execute_op` is the sole primitive that touches the filesystem
//! destructively (§9 "ownership of destructive I/O"); the OperationQueue
//! worker thread is its only legitimate caller in the live pipeline.
//! `process_event`/`process_reverse_event` are a decide-then-execute
//! convenience built from the same internal planning step
//! (`plan_operations_for_event`) that the Task Runner's batch flush also
//! uses to build the `Operation`s it hands to the queue — so the live path
//! enqueues pre-planned, fully-resolved `Operation`s (queue worker calls
//! only `execute_op`), while `process_event` remains useful standalone for
//! tests and one-off synchronous callers.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use walkdir::WalkDir;

use crate::conflict::{self, AskUserCallback, FileMeta, Verdict};
use crate::events::FileEvent;
use crate::filter::Filter;
use crate::id::TaskId;
use crate::operation::{OpType, Operation};
use crate::result::SyncResult;
use crate::state::{FileState, StateStore};
use crate::task::{CompareMethod, ConflictStrategy, SyncMode, Task};

pub struct Processor {
    task: Task,
    filter: Filter,
    state: Arc<StateStore>,
    ask_user: Option<Arc<dyn AskUserCallback>>,
}

impl Processor {
    pub fn new(task: Task, state: Arc<StateStore>, ask_user: Option<Arc<dyn AskUserCallback>>) -> Self {
        let excludes = task.effective_excludes();
        let filter = Filter::new(&task.include_patterns, &excludes);
        Self { task, filter, state, ask_user }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    // ---------------------------------------------------------------
    // Forward path
    // ---------------------------------------------------------------

    /// Decide-and-execute for one event against every configured target.
    pub fn process_event(&self, event: &FileEvent) -> Vec<SyncResult> {
        let mut results = Vec::new();
        for target_root in self.task.targets.clone() {
            for op in self.plan_operations_for_event(event, &target_root, false) {
                results.push(self.execute_operation(&op));
            }
        }
        results
    }

    /// Two-way only: roles swap, `target_base` plays the "source" role.
    pub fn process_reverse_event(&self, event: &FileEvent, target_base: &Path) -> Vec<SyncResult> {
        self.plan_operations_for_event(event, target_base, true)
            .into_iter()
            .map(|op| self.execute_operation(&op))
            .collect()
    }

    /// Pure decision step: given one event and a target root, the
    /// `Operation`s needed (never touches the filesystem). `is_reverse`
    /// swaps the source/target roles per §4.3's reverse variant.
    pub fn plan_operations_for_event(&self, event: &FileEvent, target_root: &Path, is_reverse: bool) -> Vec<Operation> {
        let (from_root, to_root) = if is_reverse { (target_root, &self.task.source) } else { (&self.task.source, target_root) };

        match event {
            FileEvent::Created { path, is_directory: true, .. } | FileEvent::Modified { path, is_directory: true, .. } => {
                let rel = match self.rel_of(from_root, path) {
                    Some(r) => r,
                    None => return Vec::new(),
                };
                if !self.filter.is_included(&rel, true) {
                    return Vec::new();
                }
                // Directory creation is handled immediately (mkdir is not
                // destructive), not queued as an Operation.
                let target_dir = to_root.join(&rel);
                if let Err(e) = fs::create_dir_all(&target_dir) {
                    log::warn!(target: "replicator::processor", "failed to create mirror dir {}: {e}", target_dir.display());
                }
                Vec::new()
            }
            FileEvent::Created { path, is_directory: false, .. } | FileEvent::Modified { path, is_directory: false, .. } => {
                let rel = match self.rel_of(from_root, path) {
                    Some(r) => r,
                    None => return Vec::new(),
                };
                if !self.filter.is_included(&rel, false) {
                    return Vec::new();
                }
                self.plan_file_sync(from_root, to_root, &rel, is_reverse, false)
            }
            FileEvent::Deleted { path, is_directory, .. } => {
                let rel = match self.rel_of(from_root, path) {
                    Some(r) => r,
                    None => return Vec::new(),
                };
                if self.task.disable_delete {
                    return Vec::new();
                }
                let target_path = to_root.join(&rel);
                if !target_path.exists() {
                    return Vec::new();
                }
                vec![self.new_op(OpType::DeleteFile, target_path.clone(), target_path, *is_directory)]
            }
            FileEvent::Moved { src_path, dst_path, is_directory: true, .. } => {
                let old_rel = match self.rel_of(from_root, src_path) {
                    Some(r) => r,
                    None => return Vec::new(),
                };
                let new_rel = match self.rel_of(from_root, dst_path) {
                    Some(r) => r,
                    None => return Vec::new(),
                };
                if !self.filter.is_included(&new_rel, true) {
                    return Vec::new();
                }
                let old_mirror = to_root.join(&old_rel);
                let new_mirror = to_root.join(&new_rel);
                if !old_mirror.exists() {
                    return Vec::new();
                }
                // A single internal-mirror move, detected and executed
                // atomically by `execute_op` (source_path under a target root).
                vec![Operation::new(OpType::CopyFile, old_mirror, new_mirror, self.task.id.clone(), self.task.name.clone())]
            }
            FileEvent::Moved { dst_path, is_directory: false, .. } => {
                // File move: delete the old mirror, copy from the new path.
                // The delete half reuses the deleted-event logic; the copy
                // half reuses the per-file sync logic against the new rel.
                let mut ops = Vec::new();
                if let FileEvent::Moved { src_path, .. } = event {
                    if let Some(old_rel) = self.rel_of(from_root, src_path) {
                        let old_mirror = to_root.join(&old_rel);
                        if old_mirror.exists() {
                            ops.push(self.new_op(OpType::DeleteFile, old_mirror.clone(), old_mirror, false));
                        }
                    }
                }
                if let Some(new_rel) = self.rel_of(from_root, dst_path) {
                    if self.filter.is_included(&new_rel, false) {
                        ops.extend(self.plan_file_sync(from_root, to_root, &new_rel, is_reverse, false));
                    }
                }
                ops
            }
        }
    }

    fn rel_of(&self, root: &Path, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(root).ok().map(|p| p.to_path_buf())
    }

    fn new_op(&self, op_type: OpType, source_path: PathBuf, target_path: PathBuf, _is_directory: bool) -> Operation {
        Operation::new(op_type, source_path, target_path, self.task.id.clone(), self.task.name.clone())
    }

    /// Per-file sync decision (§4.3): mtime or hash method, per `compare_method`.
    /// `is_reverse` only changes behavior for the hash method, whose reverse
    /// pass uses a restricted rule (§4.3 "Reverse variant") rather than the
    /// full forward table with roles swapped — running the full table both
    /// ways would re-raise the same both-changed conflict twice.
    fn plan_file_sync(&self, from_root: &Path, to_root: &Path, rel: &Path, is_reverse: bool, dry_run: bool) -> Vec<Operation> {
        let source_path = from_root.join(rel);
        let target_path = to_root.join(rel);

        if !source_path.exists() {
            return Vec::new();
        }

        match self.task.compare_method {
            CompareMethod::Mtime => self.plan_file_sync_mtime(&source_path, &target_path),
            CompareMethod::Hash if is_reverse => self.plan_file_sync_hash_reverse(&source_path, &target_path, rel),
            CompareMethod::Hash => self.plan_file_sync_hash(&source_path, &target_path, rel, dry_run),
        }
    }

    fn plan_file_sync_mtime(&self, source_path: &Path, target_path: &Path) -> Vec<Operation> {
        if !target_path.exists() {
            return vec![self.copy_op(source_path, target_path)];
        }

        let source_meta = meta_of(source_path);
        let target_meta = meta_of(target_path);
        if !conflict::conflict_exists(&source_meta, &target_meta) {
            return Vec::new();
        }

        match conflict::resolve(&source_meta, &target_meta, self.task.conflict_strategy, self.ask_user.as_deref()) {
            Verdict::Copy => vec![self.copy_op(source_path, target_path)],
            Verdict::Skip => Vec::new(),
            Verdict::KeepBoth => {
                let versioned = versioned_name(target_path);
                vec![
                    self.new_op(OpType::CopyFile, target_path.to_path_buf(), versioned, false),
                    self.copy_op(source_path, target_path),
                ]
            }
        }
    }

    fn plan_file_sync_hash(&self, source_path: &Path, target_path: &Path, rel: &Path, dry_run: bool) -> Vec<Operation> {
        let rel_str = rel.to_string_lossy().to_string();
        let src_hash = match hash_file(source_path) {
            Ok(h) => h,
            Err(e) => {
                log::warn!(target: "replicator::processor", "failed to hash {}: {e}", source_path.display());
                return Vec::new();
            }
        };
        let target_exists = target_path.exists();
        let tgt_hash = if target_exists {
            match hash_file(target_path) {
                Ok(h) => Some(h),
                Err(e) => {
                    log::warn!(target: "replicator::processor", "failed to hash {}: {e}", target_path.display());
                    return Vec::new();
                }
            }
        } else {
            None
        };

        let last = self.state.get(&self.task.id, &rel_str);
        let last_hash = last.as_ref().map(|s| s.hash.as_str());

        let src_changed = Some(src_hash.as_str()) != last_hash;
        let tgt_changed = !target_exists || tgt_hash.as_deref() != last_hash;

        match (src_changed, tgt_changed) {
            (false, false) => Vec::new(),
            (true, false) => vec![self.copy_op(source_path, target_path)],
            (false, true) => match self.task.mode {
                SyncMode::OneWay => {
                    if !dry_run {
                        let (mtime, size) = mtime_size(source_path);
                        self.state.update(&self.task.id, &rel_str, FileState { hash: src_hash.clone(), mtime, size, last_sync_time: now() });
                    }
                    vec![self.copy_op(source_path, target_path)]
                }
                SyncMode::TwoWay => Vec::new(),
            },
            (true, true) => {
                if tgt_hash.as_deref() == Some(src_hash.as_str()) {
                    if !dry_run {
                        self.state.update(&self.task.id, &rel_str, FileState { hash: src_hash, mtime: mtime_size(source_path).0, size: mtime_size(source_path).1, last_sync_time: now() });
                    }
                    Vec::new()
                } else {
                    let conflict_name = conflict_backup_name(target_path);
                    vec![
                        self.new_op(OpType::CopyFile, target_path.to_path_buf(), conflict_name, false),
                        self.copy_op(source_path, target_path),
                    ]
                }
            }
        }
    }

    /// Reverse-pass hash decision (§4.3 "Reverse variant"): `source_path`
    /// here is the target-root file being iterated; `target_path` is the
    /// real source. Only acts when the target changed and the source did
    /// not — every other case defers to the already-applied forward pass.
    fn plan_file_sync_hash_reverse(&self, source_path: &Path, target_path: &Path, rel: &Path) -> Vec<Operation> {
        let rel_str = rel.to_string_lossy().to_string();
        let tgt_hash = match hash_file(source_path) {
            Ok(h) => h,
            Err(e) => {
                log::warn!(target: "replicator::processor", "failed to hash {}: {e}", source_path.display());
                return Vec::new();
            }
        };
        let src_exists = target_path.exists();
        let src_hash = if src_exists {
            match hash_file(target_path) {
                Ok(h) => Some(h),
                Err(e) => {
                    log::warn!(target: "replicator::processor", "failed to hash {}: {e}", target_path.display());
                    return Vec::new();
                }
            }
        } else {
            None
        };

        let last = self.state.get(&self.task.id, &rel_str);
        let last_hash = last.as_ref().map(|s| s.hash.as_str());

        let src_changed = !src_exists || src_hash.as_deref() != last_hash;
        let tgt_changed = Some(tgt_hash.as_str()) != last_hash;

        if tgt_changed && !src_changed {
            vec![self.new_op(OpType::CopyFile, source_path.to_path_buf(), target_path.to_path_buf(), false)]
        } else {
            Vec::new()
        }
    }

    fn copy_op(&self, source_path: &Path, target_path: &Path) -> Operation {
        self.new_op(OpType::CopyFile, source_path.to_path_buf(), target_path.to_path_buf(), false)
    }

    /// Executes an already-planned `Operation` and reports the outcome.
    /// This is the method the installed queue executor calls once it has
    /// resolved an `Operation` back to its owning task's processor (§4.7).
    pub fn execute_operation(&self, op: &Operation) -> SyncResult {
        let (ok, message) = self.execute_op(op.op_type, &op.source_path, &op.target_path);
        let size = fs::metadata(&op.target_path).map(|m| m.len()).unwrap_or(0);
        if !ok {
            return SyncResult::error(op.source_path.clone(), Some(op.target_path.clone()), message);
        }
        match op.op_type {
            OpType::DeleteFile => SyncResult::delete_ok(op.source_path.clone(), op.target_path.clone()),
            OpType::CopyFile if is_under_any_target(&self.task, &op.source_path) => {
                SyncResult::move_ok(op.source_path.clone(), op.target_path.clone())
            }
            OpType::CopyFile => {
                self.update_state_after_copy(&op.source_path, &op.target_path);
                SyncResult::copy_ok(op.source_path.clone(), op.target_path.clone(), size)
            }
            OpType::FullSync => SyncResult::skip(op.source_path.clone(), "full sync marker"),
        }
    }

    fn update_state_after_copy(&self, source_path: &Path, target_path: &Path) {
        if self.task.compare_method != CompareMethod::Hash {
            return;
        }
        let rel = match self.rel_of(&self.task.source, source_path).or_else(|| self.rel_of(&self.task.source, target_path)) {
            Some(r) => r,
            None => return,
        };
        let rel_str = rel.to_string_lossy().to_string();
        if let Ok(hash) = hash_file(target_path) {
            let (mtime, size) = mtime_size(target_path);
            self.state.update(&self.task.id, &rel_str, FileState { hash, mtime, size, last_sync_time: now() });
        }
    }

    // ---------------------------------------------------------------
    // Full-tree scan + plan
    // ---------------------------------------------------------------

    /// Walks the whole tree and returns the Operations a full sync would
    /// execute, without touching the filesystem. `dry_run` additionally
    /// suppresses the hash-method's in-planning state-store writes (the
    /// `check_sync_safety` probe must not leave a mark on disk).
    pub fn scan_and_plan(&self, delete_orphans: bool, dry_run: bool) -> Vec<Operation> {
        let mut ops = Vec::new();
        for target_root in self.task.targets.clone() {
            ops.extend(self.scan_forward(&target_root, delete_orphans, dry_run));
            if self.task.mode == SyncMode::TwoWay && !self.task.disable_delete {
                ops.extend(self.scan_reverse(&target_root, dry_run));
            }
        }
        ops
    }

    fn scan_forward(&self, target_root: &Path, delete_orphans: bool, dry_run: bool) -> Vec<Operation> {
        let mut ops = Vec::new();
        let mut source_rels = std::collections::HashSet::new();

        for entry in WalkDir::new(&self.task.source).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path == self.task.source {
                continue;
            }
            let rel = match self.rel_of(&self.task.source, path) {
                Some(r) => r,
                None => continue,
            };
            let is_dir = entry.file_type().is_dir();
            if !self.filter.is_included(&rel, is_dir) {
                continue;
            }
            if is_dir {
                continue;
            }
            source_rels.insert(rel.clone());
            ops.extend(self.plan_file_sync(&self.task.source, target_root, &rel, false, dry_run));
        }

        if delete_orphans && self.task.mode == SyncMode::OneWay {
            for entry in WalkDir::new(target_root).into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                if path == target_root || entry.file_type().is_dir() {
                    continue;
                }
                let rel = match self.rel_of(target_root, path) {
                    Some(r) => r,
                    None => continue,
                };
                if !self.filter.is_included(&rel, false) {
                    continue;
                }
                if !source_rels.contains(&rel) {
                    ops.push(self.new_op(OpType::DeleteFile, path.to_path_buf(), path.to_path_buf(), false));
                }
            }
        }

        ops
    }

    fn scan_reverse(&self, target_root: &Path, dry_run: bool) -> Vec<Operation> {
        let mut ops = Vec::new();
        for entry in WalkDir::new(target_root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path == target_root || entry.file_type().is_dir() {
                continue;
            }
            let rel = match self.rel_of(target_root, path) {
                Some(r) => r,
                None => continue,
            };
            if !self.filter.is_included(&rel, false) {
                continue;
            }
            ops.extend(self.plan_file_sync(target_root, &self.task.source, &rel, true, dry_run));
        }
        ops
    }

    // ---------------------------------------------------------------
    // Single primitive: the only method that touches the fs destructively.
    // ---------------------------------------------------------------

    pub fn execute_op(&self, op_type: OpType, source: &Path, target: &Path) -> (bool, String) {
        match op_type {
            OpType::CopyFile => {
                if is_under_any_target(&self.task, source) {
                    self.move_within_target(source, target)
                } else {
                    copy_with_metadata(source, target)
                }
            }
            OpType::DeleteFile => delete_path(target),
            OpType::FullSync => (true, "full sync marker, no direct action".to_string()),
        }
    }

    fn move_within_target(&self, old_path: &Path, new_path: &Path) -> (bool, String) {
        if !old_path.exists() {
            return (true, "mirror source already absent".to_string());
        }
        if new_path.exists() {
            if let Err(e) = remove_recursive(new_path) {
                return (false, format!("failed to clear move destination: {e}"));
            }
        }
        if let Some(parent) = new_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return (false, format!("failed to create parent for move: {e}"));
            }
        }
        match fs::rename(old_path, new_path) {
            Ok(_) => (true, "moved".to_string()),
            Err(e) => (false, e.to_string()),
        }
    }
}

fn is_under_any_target(task: &Task, path: &Path) -> bool {
    task.targets.iter().any(|t| path.starts_with(t))
}

fn meta_of(path: &Path) -> FileMeta {
    match fs::metadata(path) {
        Ok(m) => {
            let mtime = m.modified().ok().and_then(|t| t.duration_since(UNIX_EPOCH).ok()).map(|d| d.as_secs()).unwrap_or(0);
            FileMeta { exists: true, size: m.len(), mtime }
        }
        Err(_) => FileMeta::absent(),
    }
}

fn mtime_size(path: &Path) -> (u64, u64) {
    match fs::metadata(path) {
        Ok(m) => {
            let mtime = m.modified().ok().and_then(|t| t.duration_since(UNIX_EPOCH).ok()).map(|d| d.as_secs()).unwrap_or(0);
            (mtime, m.len())
        }
        Err(_) => (0, 0),
    }
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn copy_with_metadata(source: &Path, target: &Path) -> (bool, String) {
    if !source.exists() {
        // Missing source during queued op: best-effort skip, per §7.
        return (true, "source vanished before execution, skipped".to_string());
    }
    if let Some(parent) = target.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            return (false, format!("failed to create parent dir: {e}"));
        }
    }
    if let Err(e) = fs::copy(source, target) {
        return (false, e.to_string());
    }
    if let Ok(meta) = fs::metadata(source) {
        if let Ok(mtime) = meta.modified() {
            let _ = filetime::set_file_mtime(target, filetime::FileTime::from_system_time(mtime));
        }
    }
    (true, "copied".to_string())
}

fn delete_path(target: &Path) -> (bool, String) {
    if !target.exists() {
        return (true, "already absent".to_string());
    }
    match remove_recursive(target) {
        Ok(_) => (true, "deleted".to_string()),
        Err(e) => (false, e.to_string()),
    }
}

fn remove_recursive(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// `<name>_v<N><ext>` where N is the smallest positive integer making the
/// path unique (§6 conflict-keep-both naming).
fn versioned_name(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let mut n = 1u32;
    loop {
        let candidate = parent.join(format!("{stem}_v{n}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// `<name>.conflict.<YYYYMMDDhhmmss><ext>` (§6 conflict-backup naming, hash
/// mode, both-changed case).
fn conflict_backup_name(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let ext = path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{stem}.conflict.{}{ext}", timestamp_tag()))
}

/// `YYYYMMDDhhmmss` in local time (§6 conflict-backup naming).
fn timestamp_tag() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
}

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use tempfile::tempdir;

    fn make_task(source: PathBuf, targets: Vec<PathBuf>, mode: SyncMode) -> Task {
        Task::new("t", source, targets, mode)
    }

    #[test]
    fn created_file_is_copied_forward() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("s");
        let target = dir.path().join("t");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("a.txt"), b"hi").unwrap();

        let task = make_task(source.clone(), vec![target.clone()], SyncMode::OneWay);
        let state = Arc::new(StateStore::new(dir.path().join("state.json")));
        let processor = Processor::new(task, state, None);

        let results = processor.process_event(&FileEvent::created(source.join("a.txt"), false));
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(fs::read(target.join("a.txt")).unwrap(), b"hi");
    }

    #[test]
    fn deleted_event_skipped_when_disable_delete() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("s");
        let target = dir.path().join("t");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("a.txt"), b"hi").unwrap();

        let mut task = make_task(source.clone(), vec![target.clone()], SyncMode::OneWay);
        task.disable_delete = true;
        let state = Arc::new(StateStore::new(dir.path().join("state.json")));
        let processor = Processor::new(task, state, None);

        let results = processor.process_event(&FileEvent::deleted(source.join("a.txt"), false));
        assert!(results.is_empty());
        assert!(target.join("a.txt").exists());
    }

    #[test]
    fn scan_and_plan_finds_missing_target_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("s");
        let target = dir.path().join("t");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("a.txt"), b"hi").unwrap();

        let task = make_task(source, vec![target], SyncMode::OneWay);
        let state = Arc::new(StateStore::new(dir.path().join("state.json")));
        let processor = Processor::new(task, state, None);

        let plan = processor.scan_and_plan(false, true);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].op_type, OpType::CopyFile);
    }

    #[test]
    fn scan_and_plan_is_idempotent_after_successful_sync() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("s");
        let target = dir.path().join("t");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("a.txt"), b"hi").unwrap();

        let task = make_task(source, vec![target], SyncMode::OneWay);
        let state = Arc::new(StateStore::new(dir.path().join("state.json")));
        let processor = Processor::new(task, state, None);

        for op in processor.scan_and_plan(false, true) {
            processor.execute_op(op.op_type, &op.source_path, &op.target_path);
        }
        let plan = processor.scan_and_plan(false, true);
        assert!(plan.is_empty());
    }

    #[test]
    fn delete_orphans_plans_deletion_of_extra_target_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("s");
        let target = dir.path().join("t");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("orphan.txt"), b"x").unwrap();

        let task = make_task(source, vec![target], SyncMode::OneWay);
        let state = Arc::new(StateStore::new(dir.path().join("state.json")));
        let processor = Processor::new(task, state, None);

        let plan = processor.scan_and_plan(true, true);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].op_type, OpType::DeleteFile);
    }

    #[test]
    fn hash_conflict_produces_conflict_backup_and_copy() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("s");
        let target = dir.path().join("t");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("a.txt"), b"A").unwrap();
        fs::write(target.join("a.txt"), b"A").unwrap();

        let mut task = make_task(source.clone(), vec![target.clone()], SyncMode::TwoWay);
        task.compare_method = CompareMethod::Hash;
        let state = Arc::new(StateStore::new(dir.path().join("state.json")));
        let task_id = task.id.clone();
        let common_hash = hash_file(&source.join("a.txt")).unwrap();
        state.update(&task_id, "a.txt", FileState { hash: common_hash, mtime: 0, size: 1, last_sync_time: 0 });

        fs::write(source.join("a.txt"), b"B").unwrap();
        fs::write(target.join("a.txt"), b"C").unwrap();

        let processor = Processor::new(task, state, None);
        let plan = processor.scan_and_plan(false, true);
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().any(|op| op.target_path.to_string_lossy().contains(".conflict.")));
    }

    #[test]
    fn one_way_hash_target_drift_restores_target_from_source() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("s");
        let target = dir.path().join("t");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("a.txt"), b"A").unwrap();
        fs::write(target.join("a.txt"), b"A").unwrap();

        let mut task = make_task(source.clone(), vec![target.clone()], SyncMode::OneWay);
        task.compare_method = CompareMethod::Hash;
        let state = Arc::new(StateStore::new(dir.path().join("state.json")));
        let task_id = task.id.clone();
        let common_hash = hash_file(&source.join("a.txt")).unwrap();
        state.update(&task_id, "a.txt", FileState { hash: common_hash.clone(), mtime: 0, size: 1, last_sync_time: 0 });

        // Only the target drifts; the source still matches the recorded hash.
        fs::write(target.join("a.txt"), b"DRIFTED").unwrap();

        let processor = Processor::new(task, state.clone(), None);
        let plan = processor.scan_and_plan(false, false);
        assert_eq!(plan.len(), 1);
        let op = &plan[0];
        assert_eq!(op.source_path, source.join("a.txt"), "must copy from the authoritative source");
        assert_eq!(op.target_path, target.join("a.txt"), "must overwrite the drifted target");

        // Source bytes are never touched by planning.
        assert_eq!(fs::read(source.join("a.txt")).unwrap(), b"A");
        assert_eq!(state.get(&task_id, "a.txt").unwrap().hash, common_hash);
    }

    #[test]
    fn directory_move_is_planned_as_single_internal_move() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("s");
        let target = dir.path().join("t");
        fs::create_dir_all(source.join("inner")).unwrap();
        fs::create_dir_all(target.join("inner")).unwrap();
        fs::write(target.join("inner/a.txt"), b"hi").unwrap();

        let task = make_task(source.clone(), vec![target.clone()], SyncMode::OneWay);
        let state = Arc::new(StateStore::new(dir.path().join("state.json")));
        let processor = Processor::new(task, state, None);

        let event = FileEvent::moved(source.join("inner"), source.join("inner2"), true);
        let ops = processor.plan_operations_for_event(&event, &target, false);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op_type, OpType::CopyFile);
        assert!(is_under_any_target(processor.task(), &ops[0].source_path));
    }
}
