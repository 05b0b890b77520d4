//! Polling watcher: interval enumeration diffed against the previous
//! snapshot (§4.5). Used when OS notifications are unreliable (network
//! drives). Moves are not detected — they appear as delete+create.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use walkdir::WalkDir;

use crate::events::FileEvent;
use crate::filter::Filter;

use super::{is_hidden, EventCallback, Watcher};

pub struct PollingWatcher {
    root: PathBuf,
    interval: Duration,
    ignore_hidden: bool,
    filter: Arc<Filter>,
    callback: Arc<EventCallback>,
    stopped: Arc<AtomicBool>,
}

impl PollingWatcher {
    pub fn new(root: PathBuf, interval: Duration, ignore_hidden: bool, filter: Arc<Filter>, callback: EventCallback) -> Self {
        Self { root, interval, ignore_hidden, filter, callback: Arc::new(callback), stopped: Arc::new(AtomicBool::new(false)) }
    }

    fn snapshot(root: &std::path::Path, filter: &Filter, ignore_hidden: bool) -> HashMap<PathBuf, (u64, bool)> {
        let mut out = HashMap::new();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path == root {
                continue;
            }
            let rel = match path.strip_prefix(root) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            if ignore_hidden && is_hidden(path) {
                continue;
            }
            let is_dir = entry.file_type().is_dir();
            if !filter.is_included(rel, is_dir) {
                continue;
            }
            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            out.insert(path.to_path_buf(), (mtime, is_dir));
        }
        out
    }
}

impl Watcher for PollingWatcher {
    fn start(&mut self) -> Result<(), String> {
        let root = self.root.clone();
        let interval = self.interval;
        let ignore_hidden = self.ignore_hidden;
        let filter = Arc::clone(&self.filter);
        let callback = Arc::clone(&self.callback);
        let stopped = Arc::clone(&self.stopped);

        std::thread::Builder::new()
            .name("watcher-polling".to_string())
            .spawn(move || {
                let mut previous = Self::snapshot(&root, &filter, ignore_hidden);
                while !stopped.load(Ordering::SeqCst) {
                    std::thread::sleep(interval);
                    if stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    let current = Self::snapshot(&root, &filter, ignore_hidden);

                    for (path, (mtime, is_dir)) in &current {
                        match previous.get(path) {
                            None => callback(FileEvent::created(path.clone(), *is_dir)),
                            Some((prev_mtime, _)) if prev_mtime != mtime => {
                                callback(FileEvent::modified(path.clone(), *is_dir))
                            }
                            _ => {}
                        }
                    }
                    for (path, (_, is_dir)) in &previous {
                        if !current.contains_key(path) {
                            callback(FileEvent::deleted(path.clone(), *is_dir));
                        }
                    }

                    previous = current;
                }
            })
            .map_err(|e| e.to_string())?;

        Ok(())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tempfile::tempdir;

    #[test]
    fn detects_create_modify_delete_across_polls() {
        let dir = tempdir().unwrap();
        let filter = Arc::new(Filter::new(&[], &[]));
        let (tx, rx) = mpsc::channel();
        let mut watcher = PollingWatcher::new(
            dir.path().to_path_buf(),
            Duration::from_millis(50),
            false,
            filter,
            Box::new(move |event| {
                let _ = tx.send(event);
            }),
        );
        watcher.start().unwrap();

        std::thread::sleep(Duration::from_millis(80));
        std::fs::write(dir.path().join("a.txt"), b"one").unwrap();

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(event, FileEvent::Created { .. }));

        watcher.stop();
    }
}
