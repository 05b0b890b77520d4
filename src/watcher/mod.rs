//! C5 — File Watcher: two interchangeable shapes producing `FileEvent`
//! streams into a user-supplied callback (§4.5).

mod polling;
mod realtime;

pub use polling::PollingWatcher;
pub use realtime::RealtimeWatcher;

use crate::events::FileEvent;
use std::path::Path;

/// Implemented by both watcher shapes. A watcher owns its own thread once
/// started and stops cooperatively (§5's "watchers are asked to stop").
pub trait Watcher: Send {
    fn start(&mut self) -> Result<(), String>;
    fn stop(&mut self);
}

/// Hidden-file heuristic applied before buffering (§4.5): leading-dot
/// basename, on any platform. The platform hidden-attribute bit (Windows)
/// isn't reachable portably without extra crates the teacher doesn't already
/// depend on, so this covers the cross-platform half of the rule.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).map(|n| n.starts_with('.')).unwrap_or(false)
}

pub type EventCallback = Box<dyn Fn(FileEvent) + Send + Sync>;
