//! Crate-wide error type.
//!
//! Per-file sync operations never surface this type across the public API —
//! they report a [`crate::result::SyncResult`] instead (see §7 of the design).
//! This enum is reserved for lifecycle operations: loading/saving JSON
//! documents, wiring the queue executor, and watcher start failures.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    Io {
        path: Option<PathBuf>,
        source: std::io::Error,
    },
    Json {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
    TaskNotFound(crate::id::TaskId),
    InvalidTask(String),
    WatcherStart(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io { path: Some(p), source } => write!(f, "I/O error at {}: {source}", p.display()),
            Error::Io { path: None, source } => write!(f, "I/O error: {source}"),
            Error::Json { path: Some(p), source } => write!(f, "JSON error in {}: {source}", p.display()),
            Error::Json { path: None, source } => write!(f, "JSON error: {source}"),
            Error::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Error::InvalidTask(msg) => write!(f, "invalid task: {msg}"),
            Error::WatcherStart(msg) => write!(f, "failed to start watcher: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            Error::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io { path: None, source }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Error::Json { path: None, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
