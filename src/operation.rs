//! `Operation` — an enqueued unit of destructive I/O (§3).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::id::{OperationId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    CopyFile,
    DeleteFile,
    FullSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub op_type: OpType,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub task_id: TaskId,
    pub task_name: String,
    pub status: OpStatus,
    pub error_message: Option<String>,
    pub created_at: u64,
    pub completed_at: Option<u64>,
}

impl Operation {
    pub fn new(op_type: OpType, source_path: PathBuf, target_path: PathBuf, task_id: TaskId, task_name: String) -> Self {
        Self {
            id: OperationId::new(),
            op_type,
            source_path,
            target_path,
            task_id,
            task_name,
            status: OpStatus::Pending,
            error_message: None,
            created_at: now(),
            completed_at: None,
        }
    }
}

fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
