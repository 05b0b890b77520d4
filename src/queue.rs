//! C4 — Operation Queue: a single-producer/single-consumer FIFO with
//! pause/resume/clear (§4.4).
//!
//! The worker thread is the system's one serialization point for destructive
//! I/O (§9 "ownership of destructive I/O") — grounded directly on the
//! teacher's `indexing/writer.rs::IndexWriter`, which spawns a dedicated
//! `std::thread` owning the only write connection and drains an `mpsc`-style
//! work list, with a `Shutdown` message and an `Arc<Mutex<Option<JoinHandle>>>`
//! used to join on shutdown. Here the "write connection" is generalized from
//! SQLite to an arbitrary installed `Executor` closure.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::operation::{OpStatus, OpType, Operation};

/// Performs the actual operation. Installed by the `TaskManager`, which
/// resolves each `Operation` back to its owning runner's processor
/// (`execute_op`). Returns `(ok, message)`.
pub type Executor = Box<dyn Fn(&Operation) -> (bool, String) + Send + Sync>;

/// Invoked whenever the queue's visible state changes (enqueue, start,
/// finish, pause/resume/clear) — the "queue changed" notification of §4.4.
pub type ChangeCallback = Box<dyn Fn(&QueueStatus) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub is_paused: bool,
    pub current_file: Option<PathBuf>,
    pub current_op: Option<Operation>,
}

struct Shared {
    state: Mutex<State>,
    cv: Condvar,
    executor: Mutex<Option<Executor>>,
    on_change: Mutex<Option<ChangeCallback>>,
}

struct State {
    pending: VecDeque<Operation>,
    completed: usize,
    failed: usize,
    cancelled: usize,
    is_paused: bool,
    should_stop: bool,
    current: Option<Operation>,
}

pub struct OperationQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl OperationQueue {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                completed: 0,
                failed: 0,
                cancelled: 0,
                is_paused: false,
                should_stop: false,
                current: None,
            }),
            cv: Condvar::new(),
            executor: Mutex::new(None),
            on_change: Mutex::new(None),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("operation-queue".into())
            .spawn(move || worker_loop(worker_shared))
            .expect("failed to spawn operation queue worker");

        Self { shared, worker: Mutex::new(Some(worker)) }
    }

    pub fn set_executor(&self, executor: Executor) {
        *self.shared.executor.lock().unwrap() = Some(executor);
    }

    pub fn set_on_change(&self, callback: ChangeCallback) {
        *self.shared.on_change.lock().unwrap() = Some(callback);
    }

    /// Non-blocking; accepted while not shut down.
    pub fn enqueue(&self, op: Operation) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.should_stop {
                return;
            }
            state.pending.push_back(op);
        }
        self.notify_change();
        self.shared.cv.notify_all();
    }

    pub fn enqueue_batch(&self, ops: Vec<Operation>) {
        if ops.is_empty() {
            return;
        }
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.should_stop {
                return;
            }
            state.pending.extend(ops);
        }
        self.notify_change();
        self.shared.cv.notify_all();
    }

    pub fn pause(&self) {
        self.shared.state.lock().unwrap().is_paused = true;
        self.notify_change();
    }

    pub fn resume(&self) {
        self.shared.state.lock().unwrap().is_paused = false;
        self.notify_change();
        self.shared.cv.notify_all();
    }

    /// Discards pending items, marking them `cancelled`. The currently
    /// running op (if any) completes.
    pub fn clear(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.cancelled += state.pending.len();
            state.pending.clear();
        }
        self.notify_change();
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.shared.state.lock().unwrap();
        QueueStatus {
            pending: state.pending.len(),
            completed: state.completed,
            failed: state.failed,
            cancelled: state.cancelled,
            is_paused: state.is_paused,
            current_file: state.current.as_ref().map(|op| op.source_path.clone()),
            current_op: state.current.clone(),
        }
    }

    fn notify_change(&self) {
        let status = self.status();
        if let Some(cb) = self.shared.on_change.lock().unwrap().as_ref() {
            cb(&status);
        }
    }

    /// Stops the worker; blocks up to `timeout` for it to drain the
    /// in-flight op.
    pub fn shutdown(&self, timeout: Duration) {
        self.shared.state.lock().unwrap().should_stop = true;
        self.shared.cv.notify_all();

        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let deadline_thread = std::thread::spawn(move || {
                let _ = handle.join();
            });
            // JoinHandle doesn't expose a timed join, so we poll a flag the
            // worker sets right before returning instead; here we just give
            // the join a bounded grace period by racing it against a timer.
            let start = std::time::Instant::now();
            while !deadline_thread.is_finished() && start.elapsed() < timeout {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let op = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if state.should_stop {
                    return;
                }
                if !state.is_paused {
                    if let Some(op) = state.pending.pop_front() {
                        break op;
                    }
                }
                let (guard, _timeout) = shared.cv.wait_timeout(state, Duration::from_millis(200)).unwrap();
                state = guard;
            }
        };

        {
            let mut state = shared.state.lock().unwrap();
            let mut running = op.clone();
            running.status = OpStatus::Running;
            state.current = Some(running);
        }
        drop_notify(&shared);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run_operation(&shared, &op)));

        let (ok, message) = match result {
            Ok(outcome) => outcome,
            Err(_) => (false, "operation panicked".to_string()),
        };

        {
            let mut state = shared.state.lock().unwrap();
            state.current = None;
            if ok {
                state.completed += 1;
            } else {
                state.failed += 1;
                log::warn!(target: "replicator::queue", "operation {} failed: {message}", op.id);
            }
        }
        drop_notify(&shared);
    }
}

fn drop_notify(shared: &Arc<Shared>) {
    let status = {
        let state = shared.state.lock().unwrap();
        QueueStatus {
            pending: state.pending.len(),
            completed: state.completed,
            failed: state.failed,
            cancelled: state.cancelled,
            is_paused: state.is_paused,
            current_file: state.current.as_ref().map(|op| op.source_path.clone()),
            current_op: state.current.clone(),
        }
    };
    if let Some(cb) = shared.on_change.lock().unwrap().as_ref() {
        cb(&status);
    }
}

fn run_operation(shared: &Arc<Shared>, op: &Operation) -> (bool, String) {
    let executor = shared.executor.lock().unwrap();
    match executor.as_ref() {
        Some(exec) => exec(op),
        None => fallback_executor(op),
    }
}

/// Safety net used only when no executor has been installed (tests).
fn fallback_executor(op: &Operation) -> (bool, String) {
    match op.op_type {
        OpType::CopyFile => match fs::copy(&op.source_path, &op.target_path) {
            Ok(_) => (true, "copied".to_string()),
            Err(e) => (false, e.to_string()),
        },
        OpType::DeleteFile => match fs::remove_file(&op.target_path) {
            Ok(_) => (true, "deleted".to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (true, "already absent".to_string()),
            Err(e) => (false, e.to_string()),
        },
        OpType::FullSync => (true, "no-op".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TaskId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn make_op(op_type: OpType, source: PathBuf, target: PathBuf) -> Operation {
        Operation::new(op_type, source, target, TaskId::from("t"), "t".to_string())
    }

    #[test]
    fn enqueued_completed_failed_cancelled_sum_matches_lifecycle() {
        let queue = OperationQueue::new();
        let processed = Arc::new(AtomicUsize::new(0));
        let processed_clone = Arc::clone(&processed);
        queue.set_executor(Box::new(move |_op| {
            processed_clone.fetch_add(1, Ordering::SeqCst);
            (true, "ok".to_string())
        }));

        for i in 0..5 {
            queue.enqueue(make_op(OpType::CopyFile, PathBuf::from(format!("s{i}")), PathBuf::from(format!("t{i}"))));
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while processed.load(Ordering::SeqCst) < 5 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        let status = queue.status();
        assert_eq!(status.completed, 5);
        assert_eq!(status.pending, 0);
        queue.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn clear_cancels_pending_but_not_running() {
        let queue = OperationQueue::new();
        queue.pause();
        for i in 0..3 {
            queue.enqueue(make_op(OpType::CopyFile, PathBuf::from(format!("s{i}")), PathBuf::from(format!("t{i}"))));
        }
        queue.clear();
        let status = queue.status();
        assert_eq!(status.pending, 0);
        assert_eq!(status.cancelled, 3);
        queue.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn fallback_executor_copies_when_none_installed() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        let dst = dir.path().join("b.txt");
        fs::write(&src, b"hi").unwrap();

        let queue = OperationQueue::new();
        queue.enqueue(make_op(OpType::CopyFile, src, dst.clone()));

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.status().completed == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(fs::read(&dst).unwrap(), b"hi");
        queue.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn paused_queue_does_not_consume() {
        let queue = OperationQueue::new();
        queue.pause();
        queue.enqueue(make_op(OpType::FullSync, PathBuf::from("s"), PathBuf::from("t")));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(queue.status().pending, 1);
        queue.resume();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.status().pending > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(queue.status().completed, 1);
        queue.shutdown(Duration::from_secs(2));
    }
}
