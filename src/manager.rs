//! C7 — Task Manager: the registry of runners, wired as the operation
//! queue's single executor (§4.7).
//!
//! Grounded on the original Python `TaskManager`: a singleton holding
//! `task_runners: Dict[str, TaskRunner]`, an `operation_queue` whose executor
//! resolves `task_id -> runner -> processor.execute_op`, and `create_task`/
//! `update_task`/`delete_task`/`start_all`/`stop_all` lifecycle methods. The
//! singleton shape itself does not survive the port (§9's capability-
//! interface redesign): this crate has no global instance, only a
//! `TaskManager` built once at process start and shared by `Arc`, with an
//! `Arc<Self>`-returning constructor so it can install itself as the queue's
//! executor — the same self-referential wiring the teacher's
//! `IndexWriter::spawn` uses to hand a worker thread a handle back into its
//! owning struct.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::callbacks::ReplicatorCallbacks;
use crate::config::{self, StorageRoot};
use crate::conflict::AskUserCallback;
use crate::error::{Error, Result};
use crate::id::TaskId;
use crate::log::{log_record, BackupAction, BackupRecord, BackupStatus, HistorySink, LogCategory, LogLevel, LogSink};
use crate::operation::{OpType, Operation};
use crate::queue::OperationQueue;
use crate::result::Action;
use crate::runner::{RunnerStatus, SafetySummary, TaskRunner};
use crate::scheduler::{ScheduleType, Scheduler};
use crate::state::StateStore;
use crate::task::Task;

pub struct TaskManager {
    storage: StorageRoot,
    tasks: Mutex<HashMap<TaskId, Task>>,
    runners: Mutex<HashMap<TaskId, Arc<TaskRunner>>>,
    queue: Arc<OperationQueue>,
    state: Arc<StateStore>,
    ask_user: Mutex<Option<Arc<dyn AskUserCallback>>>,
    log_sink: Arc<dyn LogSink>,
    history_sink: Arc<dyn HistorySink>,
    callbacks: Mutex<Option<Arc<dyn ReplicatorCallbacks>>>,
    scheduler: Mutex<Option<Arc<Scheduler>>>,
}

impl TaskManager {
    /// Builds a manager and installs it as the queue's executor — the
    /// `Arc<Self>` return lets the installed closure hold a weak-free strong
    /// reference back to the manager, mirroring `TaskManager._execute_queue_operation`
    /// being a bound method of the singleton in the original.
    pub fn new(storage: StorageRoot, log_sink: Arc<dyn LogSink>, history_sink: Arc<dyn HistorySink>) -> Arc<Self> {
        let queue = Arc::new(OperationQueue::new());
        let state = Arc::new(StateStore::new(storage.state_path()));
        state.load();

        let manager = Arc::new(Self {
            storage,
            tasks: Mutex::new(HashMap::new()),
            runners: Mutex::new(HashMap::new()),
            queue,
            state,
            ask_user: Mutex::new(None),
            log_sink,
            history_sink,
            callbacks: Mutex::new(None),
            scheduler: Mutex::new(None),
        });

        let executor_manager = Arc::clone(&manager);
        manager.queue.set_executor(Box::new(move |op: &Operation| executor_manager.execute_queue_operation(op)));

        manager
    }

    /// Builds and starts the scheduler, wiring fired jobs back to
    /// `run_full_sync` (§4.8). A manager with no scheduled jobs never calls
    /// this, so the background tick thread only exists when it is needed.
    pub fn enable_scheduler(self: &Arc<Self>) {
        let mut slot = self.scheduler.lock().unwrap();
        if slot.is_some() {
            return;
        }
        let fire_manager = Arc::clone(self);
        let scheduler = Scheduler::new(
            Box::new(move |task_id| {
                if let Err(e) = fire_manager.run_full_sync(task_id, None) {
                    fire_manager.log(LogLevel::Error, format!("scheduled sync for {task_id} failed: {e}"));
                }
            }),
            Arc::clone(&self.log_sink),
        );
        scheduler.start();
        *slot = Some(scheduler);
    }

    pub fn schedule_task(&self, task_id: TaskId, schedule_type: ScheduleType, schedule_value: impl Into<String>) -> Result<crate::id::JobId> {
        let scheduler = self.scheduler.lock().unwrap().clone().ok_or_else(|| Error::InvalidTask("scheduler not enabled".into()))?;
        scheduler.add_job(task_id, schedule_type, schedule_value).map_err(Error::InvalidTask)
    }

    pub fn unschedule_task(&self, task_id: &TaskId) {
        if let Some(scheduler) = self.scheduler.lock().unwrap().as_ref() {
            scheduler.remove_task_jobs(task_id);
        }
    }

    pub fn scheduled_jobs(&self) -> Vec<crate::scheduler::ScheduledJob> {
        self.scheduler.lock().unwrap().as_ref().map(|s| s.get_jobs()).unwrap_or_default()
    }

    pub fn with_storage(storage: StorageRoot) -> Arc<Self> {
        Self::new(storage, Arc::new(crate::log::ChannelLogSink::new()), Arc::new(crate::log::ChannelHistorySink::new()))
    }

    pub fn set_ask_user(&self, callback: Arc<dyn AskUserCallback>) {
        *self.ask_user.lock().unwrap() = Some(callback);
    }

    /// Wires the UI-boundary callback interface onto every runner, present
    /// and future (§4.7 "wires global callbacks... down to every runner").
    pub fn set_callbacks(&self, callbacks: Arc<dyn ReplicatorCallbacks>) {
        *self.callbacks.lock().unwrap() = Some(Arc::clone(&callbacks));
        for runner in self.runners.lock().unwrap().values() {
            runner.set_callbacks(Arc::clone(&callbacks));
        }
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.log_sink.log(log_record(level, message, LogCategory::Manager, None));
    }

    // ---------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------

    /// Loads `tasks.json` into the registry. Does not start anything — call
    /// `start_all` afterwards if desired (§4.7, §4.11).
    pub fn load(self: &Arc<Self>) -> Result<()> {
        let loaded = config::load_tasks(&self.storage.tasks_path())?;
        let mut tasks = self.tasks.lock().unwrap();
        for task in loaded {
            tasks.insert(task.id.clone(), task);
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let tasks: Vec<Task> = self.tasks.lock().unwrap().values().cloned().collect();
        config::save_tasks(&self.storage.tasks_path(), &tasks)
    }

    // ---------------------------------------------------------------
    // Registry
    // ---------------------------------------------------------------

    fn runner_for(self: &Arc<Self>, task: Task) -> Arc<TaskRunner> {
        let runner = TaskRunner::new(
            task,
            Arc::clone(&self.queue),
            Arc::clone(&self.state),
            self.ask_user.lock().unwrap().clone(),
            Arc::clone(&self.log_sink),
            Arc::clone(&self.history_sink),
        );
        if let Some(cb) = self.callbacks.lock().unwrap().as_ref() {
            runner.set_callbacks(Arc::clone(cb));
        }
        runner
    }

    pub fn create_task(self: &Arc<Self>, task: Task) -> Result<TaskId> {
        for target in &task.targets {
            if !Task::validate_target(&task.source, target) {
                return Err(Error::InvalidTask(format!("target {} must not equal the source", target.display())));
            }
        }
        let id = task.id.clone();
        self.tasks.lock().unwrap().insert(id.clone(), task);
        self.persist()?;
        self.log(LogLevel::Info, format!("task created: {id}"));
        Ok(id)
    }

    pub fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().values().cloned().collect()
    }

    /// Stops any live runner, replaces the stored definition, rebuilds a
    /// fresh runner, and restarts it if the task was running before the
    /// update (§4.7).
    pub fn update_task(self: &Arc<Self>, task: Task) -> Result<()> {
        let id = task.id.clone();
        if !self.tasks.lock().unwrap().contains_key(&id) {
            return Err(Error::TaskNotFound(id));
        }

        let was_running = self
            .runners
            .lock()
            .unwrap()
            .get(&id)
            .map(|r| matches!(r.status(), RunnerStatus::Running | RunnerStatus::Paused))
            .unwrap_or(false);

        if let Some(old) = self.runners.lock().unwrap().remove(&id) {
            old.stop();
        }

        self.tasks.lock().unwrap().insert(id.clone(), task);
        self.persist()?;

        if was_running {
            self.start_task(&id)?;
        }
        self.log(LogLevel::Info, format!("task updated: {id}"));
        Ok(())
    }

    pub fn delete_task(&self, id: &TaskId) -> Result<()> {
        if let Some(runner) = self.runners.lock().unwrap().remove(id) {
            runner.stop();
        }
        if self.tasks.lock().unwrap().remove(id).is_none() {
            return Err(Error::TaskNotFound(id.clone()));
        }
        self.state.clear_task(id);
        self.unschedule_task(id);
        self.persist()?;
        self.log(LogLevel::Info, format!("task deleted: {id}"));
        Ok(())
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    pub fn start_task(self: &Arc<Self>, id: &TaskId) -> Result<bool> {
        let task = self.get_task(id).ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        let runner = {
            let mut runners = self.runners.lock().unwrap();
            if let Some(existing) = runners.get(id) {
                Arc::clone(existing)
            } else {
                let runner = self.runner_for(task);
                runners.insert(id.clone(), Arc::clone(&runner));
                runner
            }
        };
        Ok(runner.start())
    }

    pub fn stop_task(&self, id: &TaskId) {
        if let Some(runner) = self.runners.lock().unwrap().get(id) {
            runner.stop();
        }
    }

    pub fn pause_task(&self, id: &TaskId) {
        if let Some(runner) = self.runners.lock().unwrap().get(id) {
            runner.pause();
        }
    }

    pub fn resume_task(&self, id: &TaskId) {
        if let Some(runner) = self.runners.lock().unwrap().get(id) {
            runner.resume();
        }
    }

    pub fn run_full_sync(&self, id: &TaskId, delete_orphans_override: Option<bool>) -> Result<bool> {
        let runner = self.runners.lock().unwrap().get(id).cloned().ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        Ok(runner.run_full_sync(delete_orphans_override))
    }

    pub fn check_sync_safety(&self, id: &TaskId) -> Result<SafetySummary> {
        let runner = self.runners.lock().unwrap().get(id).cloned().ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        Ok(runner.check_sync_safety())
    }

    pub fn confirm_safety_alert(&self, id: &TaskId, filter: Option<&[PathBuf]>) -> Result<()> {
        let runner = self.runners.lock().unwrap().get(id).cloned().ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        runner.confirm_safety_alert(filter);
        Ok(())
    }

    pub fn reset_safety_pause(&self, id: &TaskId) -> Result<()> {
        let runner = self.runners.lock().unwrap().get(id).cloned().ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        runner.reset_safety_pause();
        Ok(())
    }

    pub fn task_status(&self, id: &TaskId) -> Option<RunnerStatus> {
        self.runners.lock().unwrap().get(id).map(|r| r.status())
    }

    pub fn running_count(&self) -> usize {
        self.runners.lock().unwrap().values().filter(|r| r.status() == RunnerStatus::Running).count()
    }

    /// `enabled and (auto_start or force)` (§4.7), mirroring
    /// `TaskManager.start_all(force)` from the original.
    pub fn start_all(self: &Arc<Self>, force: bool) -> Vec<TaskId> {
        let candidates: Vec<Task> = self.tasks.lock().unwrap().values().filter(|t| t.enabled && (t.auto_start || force)).cloned().collect();
        let mut started = Vec::new();
        for task in candidates {
            let id = task.id.clone();
            match self.start_task(&id) {
                Ok(true) => started.push(id),
                Ok(false) => self.log(LogLevel::Warning, format!("task {id} failed to start")),
                Err(e) => self.log(LogLevel::Error, format!("task {id} failed to start: {e}")),
            }
        }
        started
    }

    pub fn stop_all(&self) {
        for runner in self.runners.lock().unwrap().values() {
            runner.stop();
        }
    }

    pub fn get_overall_stats(&self) -> OverallStats {
        let queue_status = self.queue.status();
        let runners = self.runners.lock().unwrap();
        let running = runners.values().filter(|r| r.status() == RunnerStatus::Running).count();
        let paused = runners.values().filter(|r| r.status() == RunnerStatus::Paused).count();
        let errored = runners.values().filter(|r| r.status() == RunnerStatus::Error).count();
        OverallStats {
            total_tasks: self.tasks.lock().unwrap().len(),
            running_tasks: running,
            paused_tasks: paused,
            errored_tasks: errored,
            queue_pending: queue_status.pending,
            queue_completed: queue_status.completed,
            queue_failed: queue_status.failed,
        }
    }

    pub fn shutdown(&self) {
        if let Some(scheduler) = self.scheduler.lock().unwrap().as_ref() {
            scheduler.stop();
        }
        self.stop_all();
        self.queue.shutdown(std::time::Duration::from_secs(10));
        self.state.save();
    }

    // ---------------------------------------------------------------
    // Queue executor (§4.7): resolves an Operation back to its owning
    // runner's processor, executes it, and records the result exactly once.
    // ---------------------------------------------------------------

    fn execute_queue_operation(&self, op: &Operation) -> (bool, String) {
        let runner = match self.runners.lock().unwrap().get(&op.task_id).cloned() {
            Some(r) => r,
            None => return (false, format!("no runner registered for task {}", op.task_id)),
        };
        let processor = runner.ensure_processor();
        let result = processor.execute_operation(op);
        self.report_result(op, &result);
        (result.success, result.message.clone())
    }

    fn report_result(&self, op: &Operation, result: &crate::result::SyncResult) {
        let backup_action = match op.op_type {
            OpType::CopyFile => {
                if result.action == Action::Move {
                    BackupAction::Moved
                } else {
                    BackupAction::Copy
                }
            }
            OpType::DeleteFile => BackupAction::Delete,
            OpType::FullSync => return,
        };
        let status = if !result.success {
            BackupStatus::Failed
        } else if result.action == Action::Skip {
            // Skips are not recorded to history, matching the original's
            // "skip quietly" behavior for per-file no-ops.
            return;
        } else {
            BackupStatus::Success
        };

        self.history_sink.log_backup(BackupRecord {
            task_id: op.task_id.clone(),
            task_name: op.task_name.clone(),
            action: backup_action,
            source_path: op.source_path.to_string_lossy().to_string(),
            target_path: Some(op.target_path.to_string_lossy().to_string()),
            file_size: Some(result.file_size),
            status,
            error_message: if result.success { None } else { Some(result.message.clone()) },
            timestamp: crate::events::now(),
        });

        let action_label = match result.action {
            Action::Copy => "copy",
            Action::Delete => "delete",
            Action::Move => "move",
            Action::Skip => "skip",
            Action::Error => "error",
        };
        let file_result =
            crate::callbacks::FileEventResult::simple(result.success, action_label, result.message.clone(), Some(op.target_path.clone()));
        let event = synthesize_event(op);
        if let Some(cb) = self.callbacks.lock().unwrap().as_ref() {
            cb.on_file_event(&op.task_id, &event, &file_result);
        }
    }
}

/// Best-effort reconstruction of a `FileEvent` from a completed `Operation`
/// for `on_file_event` callback context — the queue only carries
/// `Operation`s, which have lost the original watcher event by the time the
/// worker thread executes them.
fn synthesize_event(op: &Operation) -> crate::events::FileEvent {
    match op.op_type {
        OpType::DeleteFile => crate::events::FileEvent::deleted(op.target_path.clone(), false),
        _ => crate::events::FileEvent::modified(op.source_path.clone(), false),
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverallStats {
    pub total_tasks: usize,
    pub running_tasks: usize,
    pub paused_tasks: usize,
    pub errored_tasks: usize,
    pub queue_pending: usize,
    pub queue_completed: usize,
    pub queue_failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::SyncMode;
    use std::fs;
    use tempfile::tempdir;

    fn manager_in(dir: &std::path::Path) -> Arc<TaskManager> {
        TaskManager::with_storage(StorageRoot::new(dir.to_path_buf()))
    }

    #[test]
    fn create_task_rejects_target_equal_to_source() {
        let dir = tempdir().unwrap();
        let manager = manager_in(dir.path());
        let source = dir.path().join("s");
        let task = Task::new("t", source.clone(), vec![source], SyncMode::OneWay);
        assert!(manager.create_task(task).is_err());
    }

    #[test]
    fn create_then_reload_round_trips_through_tasks_json() {
        let dir = tempdir().unwrap();
        let manager = manager_in(dir.path());
        let task = Task::new("t", dir.path().join("s"), vec![dir.path().join("t")], SyncMode::OneWay);
        let id = manager.create_task(task).unwrap();

        let reloaded = manager_in(dir.path());
        reloaded.load().unwrap();
        assert!(reloaded.get_task(&id).is_some());
    }

    #[test]
    fn start_task_creates_runner_and_runs_initial_sync() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("s");
        let target = dir.path().join("t");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("a.txt"), b"hi").unwrap();

        let manager = manager_in(dir.path());
        let mut task = Task::new("t", source, vec![target.clone()], SyncMode::OneWay);
        task.monitor_mode = crate::task::MonitorMode::Polling;
        task.poll_interval = 1;
        task.batch_delay = 1;
        let id = manager.create_task(task).unwrap();

        assert!(manager.start_task(&id).unwrap());

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !target.join("a.txt").exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        assert!(target.join("a.txt").exists());
        manager.shutdown();
    }

    #[test]
    fn start_all_respects_enabled_and_auto_start() {
        let dir = tempdir().unwrap();
        let manager = manager_in(dir.path());

        let mut auto = Task::new("auto", dir.path().join("s1"), vec![dir.path().join("t1")], SyncMode::OneWay);
        auto.auto_start = true;
        fs::create_dir_all(&dir.path().join("s1")).unwrap();
        fs::create_dir_all(&dir.path().join("t1")).unwrap();

        let manual = Task::new("manual", dir.path().join("s2"), vec![dir.path().join("t2")], SyncMode::OneWay);
        fs::create_dir_all(&dir.path().join("s2")).unwrap();
        fs::create_dir_all(&dir.path().join("t2")).unwrap();

        manager.create_task(auto).unwrap();
        manager.create_task(manual).unwrap();

        let started = manager.start_all(false);
        assert_eq!(started.len(), 1);
        manager.shutdown();
    }

    #[test]
    fn delete_task_stops_runner_and_clears_state() {
        let dir = tempdir().unwrap();
        let manager = manager_in(dir.path());
        let task = Task::new("t", dir.path().join("s"), vec![dir.path().join("t")], SyncMode::OneWay);
        fs::create_dir_all(dir.path().join("s")).unwrap();
        fs::create_dir_all(dir.path().join("t")).unwrap();
        let id = manager.create_task(task).unwrap();
        manager.start_task(&id).unwrap();

        manager.delete_task(&id).unwrap();
        assert!(manager.get_task(&id).is_none());
        assert!(manager.delete_task(&id).is_err());
    }
}
