//! `SyncResult` — the outcome of a single sync decision (§3, §7).
//!
//! Per-file operations report one of these instead of a `Result<_, Error>`;
//! this is the teacher's own pattern (`WriteOperationError` folded into an
//! `action: "error"` payload rather than an `Err` bubbling through the
//! Tauri command layer), generalized to every sync action, not just errors.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Copy,
    Delete,
    Move,
    Skip,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub success: bool,
    pub action: Action,
    pub source_path: PathBuf,
    pub target_path: Option<PathBuf>,
    pub message: String,
    pub file_size: u64,
}

impl SyncResult {
    pub fn skip(source_path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            success: true,
            action: Action::Skip,
            source_path,
            target_path: None,
            message: reason.into(),
            file_size: 0,
        }
    }

    pub fn copy_ok(source_path: PathBuf, target_path: PathBuf, file_size: u64) -> Self {
        Self {
            success: true,
            action: Action::Copy,
            source_path,
            target_path: Some(target_path),
            message: "copied".to_string(),
            file_size,
        }
    }

    pub fn delete_ok(source_path: PathBuf, target_path: PathBuf) -> Self {
        Self {
            success: true,
            action: Action::Delete,
            source_path,
            target_path: Some(target_path),
            message: "deleted".to_string(),
            file_size: 0,
        }
    }

    pub fn move_ok(source_path: PathBuf, target_path: PathBuf) -> Self {
        Self {
            success: true,
            action: Action::Move,
            source_path,
            target_path: Some(target_path),
            message: "moved".to_string(),
            file_size: 0,
        }
    }

    pub fn error(source_path: PathBuf, target_path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            action: Action::Error,
            source_path,
            target_path,
            message: message.into(),
            file_size: 0,
        }
    }
}
