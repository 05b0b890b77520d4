//! Log/history sinks (§6, §4.9): the two crash-safe asynchronous sinks the
//! surrounding environment provides. Grounded on the teacher's own async
//! logger shape — `indexing/writer.rs::IndexWriter` owns a dedicated
//! background thread draining an unbounded channel so callers never block
//! on the write; here the same enqueue-and-return contract is generalized
//! from SQLite rows to arbitrary [`LogRecord`]/[`BackupRecord`] sinks.
//!
//! Actual durable persistence (a database, a rotating file) is explicitly
//! out of scope for the core (§1: "log/history persistence is out of scope
//! except for its write contract") — the default sinks here satisfy the
//! contract by forwarding onto the `log` facade, which the bundled binary
//! wires to `env_logger`.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, RwLock};
use std::thread::JoinHandle;

use crate::id::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Module/category a log line belongs to, threaded through as a
/// `log::target` so consumers can filter with `RUST_LOG=replicator::queue=debug`
/// the conventional `env_logger` way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Watcher,
    Processor,
    Queue,
    Runner,
    Manager,
    Scheduler,
    StateStore,
}

impl LogCategory {
    pub fn target(self) -> &'static str {
        match self {
            LogCategory::Watcher => "replicator::watcher",
            LogCategory::Processor => "replicator::processor",
            LogCategory::Queue => "replicator::queue",
            LogCategory::Runner => "replicator::runner",
            LogCategory::Manager => "replicator::manager",
            LogCategory::Scheduler => "replicator::scheduler",
            LogCategory::StateStore => "replicator::state_store",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub category: LogCategory,
    pub task_id: Option<TaskId>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupAction {
    Created,
    Modified,
    Deleted,
    Moved,
    Copy,
    Delete,
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Success,
    Failed,
    Skipped,
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub task_id: TaskId,
    pub task_name: String,
    pub action: BackupAction,
    pub source_path: String,
    pub target_path: Option<String>,
    pub file_size: Option<u64>,
    pub status: BackupStatus,
    pub error_message: Option<String>,
    pub timestamp: u64,
}

/// `log(level, message, category, task_id?)` (§6). Enqueue-and-return.
pub trait LogSink: Send + Sync {
    fn log(&self, record: LogRecord);
}

/// `log_backup(...)` (§6). Enqueue-and-return.
pub trait HistorySink: Send + Sync {
    fn log_backup(&self, record: BackupRecord);
}

fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

pub fn log_record(level: LogLevel, message: impl Into<String>, category: LogCategory, task_id: Option<TaskId>) -> LogRecord {
    LogRecord { level, message: message.into(), category, task_id, timestamp: now_millis() }
}

fn emit_to_facade(record: &LogRecord) {
    let target = record.category.target();
    let msg = match &record.task_id {
        Some(id) => format!("[task {id}] {}", record.message),
        None => record.message.clone(),
    };
    match record.level {
        LogLevel::Debug => log::debug!(target: "replicator", "{target}: {msg}"),
        LogLevel::Info => log::info!(target: "replicator", "{target}: {msg}"),
        LogLevel::Warning => log::warn!(target: "replicator", "{target}: {msg}"),
        LogLevel::Error => log::error!(target: "replicator", "{target}: {msg}"),
    }
}

fn emit_history_to_facade(record: &BackupRecord) {
    log::info!(
        target: "replicator::history",
        "[task {}] {:?} {} -> {:?} ({:?}){}",
        record.task_id,
        record.action,
        record.source_path,
        record.target_path,
        record.status,
        record.error_message.as_deref().map(|m| format!(": {m}")).unwrap_or_default(),
    );
}

/// Background-thread-backed sink: `log()`/`log_backup()` push onto an
/// unbounded `mpsc` channel and return immediately; a dedicated worker
/// drains the channel and forwards to the `log` facade. Mirrors the
/// teacher's `IndexWriter` thread-plus-channel shape.
pub struct ChannelLogSink {
    tx: Sender<LogRecord>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelLogSink {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<LogRecord>();
        let worker = std::thread::Builder::new()
            .name("log-sink".into())
            .spawn(move || {
                for record in rx {
                    emit_to_facade(&record);
                }
            })
            .expect("failed to spawn log sink worker");
        Self { tx, worker: Mutex::new(Some(worker)) }
    }
}

impl Default for ChannelLogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChannelLogSink {
    fn drop(&mut self) {
        // Dropping `tx` closes the channel; join so in-flight records flush
        // before the process exits.
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl LogSink for ChannelLogSink {
    fn log(&self, record: LogRecord) {
        let _ = self.tx.send(record);
    }
}

pub struct ChannelHistorySink {
    tx: Sender<BackupRecord>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelHistorySink {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<BackupRecord>();
        let worker = std::thread::Builder::new()
            .name("history-sink".into())
            .spawn(move || {
                for record in rx {
                    emit_history_to_facade(&record);
                }
            })
            .expect("failed to spawn history sink worker");
        Self { tx, worker: Mutex::new(Some(worker)) }
    }
}

impl Default for ChannelHistorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChannelHistorySink {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl HistorySink for ChannelHistorySink {
    fn log_backup(&self, record: BackupRecord) {
        let _ = self.tx.send(record);
    }
}

/// Discards everything. Useful for tests that don't care about logging.
pub struct NullSink;
impl LogSink for NullSink {
    fn log(&self, _record: LogRecord) {}
}
impl HistorySink for NullSink {
    fn log_backup(&self, _record: BackupRecord) {}
}

/// Collects records in memory for test assertions.
#[derive(Default)]
pub struct VecSink {
    logs: RwLock<Vec<LogRecord>>,
    history: RwLock<Vec<BackupRecord>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.logs.read().unwrap().clone()
    }

    pub fn history(&self) -> Vec<BackupRecord> {
        self.history.read().unwrap().clone()
    }
}

impl LogSink for VecSink {
    fn log(&self, record: LogRecord) {
        self.logs.write().unwrap().push(record);
    }
}

impl HistorySink for VecSink {
    fn log_backup(&self, record: BackupRecord) {
        self.history.write().unwrap().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_collects_records() {
        let sink = VecSink::new();
        sink.log(log_record(LogLevel::Info, "hello", LogCategory::Runner, None));
        assert_eq!(sink.logs().len(), 1);
        assert_eq!(sink.logs()[0].message, "hello");
    }

    #[test]
    fn channel_log_sink_does_not_block_caller() {
        let sink = ChannelLogSink::new();
        for i in 0..100 {
            sink.log(log_record(LogLevel::Debug, format!("msg {i}"), LogCategory::Queue, None));
        }
        drop(sink);
    }
}
