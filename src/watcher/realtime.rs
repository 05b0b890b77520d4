//! Realtime watcher: OS notifications via `notify`, wrapped in our own
//! per-path debouncer (§4.5).
//!
//! Grounded on the teacher's `file_system/watcher.rs`, which drives
//! `notify_debouncer_full::new_debouncer` on its own background thread and
//! translates raw `notify` events into its own `FileSystemEvent`. We drive
//! plain `notify` directly (not `notify_debouncer_full`) because the spec's
//! debounce is a per-path reset-on-arrival timer rather than a fixed window,
//! so debouncing is delegated to our generic [`crate::debounce::Debouncer`]
//! instead.

use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcherTrait};

use crate::debounce::Debouncer;
use crate::events::FileEvent;
use crate::filter::Filter;

use super::{is_hidden, EventCallback, Watcher};

pub struct RealtimeWatcher {
    root: PathBuf,
    debounce: Duration,
    ignore_hidden: bool,
    filter: Arc<Filter>,
    callback: Arc<EventCallback>,
    inner: Option<RecommendedWatcher>,
    debouncer: Arc<Debouncer<PathBuf, FileEvent>>,
    stopped: Arc<std::sync::atomic::AtomicBool>,
}

impl RealtimeWatcher {
    pub fn new(root: PathBuf, debounce: Duration, ignore_hidden: bool, filter: Arc<Filter>, callback: EventCallback) -> Self {
        Self {
            root,
            debounce,
            ignore_hidden,
            filter,
            callback: Arc::new(callback),
            inner: None,
            debouncer: Arc::new(Debouncer::new(debounce)),
            stopped: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }
}

fn should_ignore(root: &Path, filter: &Filter, ignore_hidden: bool, path: &Path) -> bool {
    if ignore_hidden && is_hidden(path) {
        return true;
    }
    let rel = match path.strip_prefix(root) {
        Ok(rel) => rel,
        Err(_) => return false,
    };
    let is_dir = path.is_dir();
    !filter.is_included(rel, is_dir)
}

fn translate(root: &Path, filter: &Filter, ignore_hidden: bool, event: Event) -> Vec<FileEvent> {
    match event.kind {
        EventKind::Create(_) => event
            .paths
            .into_iter()
            .filter(|p| !should_ignore(root, filter, ignore_hidden, p))
            .map(|p| {
                let dir = p.is_dir();
                FileEvent::created(p, dir)
            })
            .collect(),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => {
            // Rename events: `notify` gives `from` then `to` as separate
            // single-path events on most platforms; we treat the common
            // two-path case (some backends coalesce them) as a move.
            if event.paths.len() == 2 {
                let dst = &event.paths[1];
                if should_ignore(root, filter, ignore_hidden, dst) {
                    return Vec::new();
                }
                let dir = dst.is_dir();
                vec![FileEvent::moved(event.paths[0].clone(), dst.clone(), dir)]
            } else {
                event
                    .paths
                    .into_iter()
                    .filter(|p| !should_ignore(root, filter, ignore_hidden, p))
                    .map(|p| {
                        let dir = p.is_dir();
                        FileEvent::modified(p, dir)
                    })
                    .collect()
            }
        }
        EventKind::Modify(_) => event
            .paths
            .into_iter()
            .filter(|p| !should_ignore(root, filter, ignore_hidden, p))
            .map(|p| {
                let dir = p.is_dir();
                FileEvent::modified(p, dir)
            })
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .into_iter()
            .filter(|p| !(ignore_hidden && is_hidden(p)))
            .map(|p| FileEvent::deleted(p, false))
            .collect(),
        _ => Vec::new(),
    }
}

impl Watcher for RealtimeWatcher {
    fn start(&mut self) -> Result<(), String> {
        let (tx, rx) = channel::<notify::Result<Event>>();
        let mut watcher =
            notify::recommended_watcher(move |res| { let _ = tx.send(res); }).map_err(|e| e.to_string())?;
        watcher.watch(&self.root, RecursiveMode::Recursive).map_err(|e| e.to_string())?;
        self.inner = Some(watcher);

        let debouncer = Arc::clone(&self.debouncer);
        let callback = Arc::clone(&self.callback);
        let stopped = Arc::clone(&self.stopped);
        let root = self.root.clone();
        let ignore_hidden = self.ignore_hidden;
        let filter = Arc::clone(&self.filter);

        std::thread::Builder::new()
            .name("watcher-realtime".to_string())
            .spawn(move || {
                while !stopped.load(std::sync::atomic::Ordering::SeqCst) {
                    match rx.recv_timeout(Duration::from_millis(200)) {
                        Ok(Ok(event)) => {
                            for file_event in translate(&root, &filter, ignore_hidden, event) {
                                let cb = Arc::clone(&callback);
                                debouncer.push(
                                    file_event.key_path().clone(),
                                    file_event,
                                    |_old, new| new.clone(),
                                    move |_key, value| cb(value),
                                );
                            }
                        }
                        Ok(Err(e)) => {
                            log::warn!(target: "replicator::watcher", "notify error on {}: {e}", root.display());
                        }
                        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, std::sync::atomic::Ordering::SeqCst);
        self.debouncer.cancel_all();
        self.inner = None;
    }
}
