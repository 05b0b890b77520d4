//! `FileEvent` — a tagged union of the change intents the watcher emits.
//!
//! Encoded as a Rust enum (§9 "sum types for events and results") rather
//! than a flat struct with an optional `dst_path`, so the compiler enforces
//! that only `Moved` carries a destination.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum FileEvent {
    Created { path: PathBuf, is_directory: bool, timestamp: u64 },
    Modified { path: PathBuf, is_directory: bool, timestamp: u64 },
    Deleted { path: PathBuf, is_directory: bool, timestamp: u64 },
    Moved { src_path: PathBuf, dst_path: PathBuf, is_directory: bool, timestamp: u64 },
}

impl FileEvent {
    /// The path this event keys into the debounce dictionary by. For moves,
    /// this is the destination — a later modify of the new name collapses
    /// with the move, matching "later event overwrites earlier for the same
    /// path" (§4.5).
    pub fn key_path(&self) -> &PathBuf {
        match self {
            FileEvent::Created { path, .. } => path,
            FileEvent::Modified { path, .. } => path,
            FileEvent::Deleted { path, .. } => path,
            FileEvent::Moved { dst_path, .. } => dst_path,
        }
    }

    pub fn is_directory(&self) -> bool {
        match self {
            FileEvent::Created { is_directory, .. }
            | FileEvent::Modified { is_directory, .. }
            | FileEvent::Deleted { is_directory, .. }
            | FileEvent::Moved { is_directory, .. } => *is_directory,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            FileEvent::Created { timestamp, .. }
            | FileEvent::Modified { timestamp, .. }
            | FileEvent::Deleted { timestamp, .. }
            | FileEvent::Moved { timestamp, .. } => *timestamp,
        }
    }

    pub fn created(path: PathBuf, is_directory: bool) -> Self {
        FileEvent::Created { path, is_directory, timestamp: now() }
    }

    pub fn modified(path: PathBuf, is_directory: bool) -> Self {
        FileEvent::Modified { path, is_directory, timestamp: now() }
    }

    pub fn deleted(path: PathBuf, is_directory: bool) -> Self {
        FileEvent::Deleted { path, is_directory, timestamp: now() }
    }

    pub fn moved(src_path: PathBuf, dst_path: PathBuf, is_directory: bool) -> Self {
        FileEvent::Moved { src_path, dst_path, is_directory, timestamp: now() }
    }
}

pub fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
