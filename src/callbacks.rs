//! UI-boundary contract (§6): the desktop UI, tray, and alert panel are out
//! of scope (§1), but the core still exposes the typed callback surface they
//! would consume. Modeled as a capability interface (§9 "small capability
//! interfaces the adapter implements") rather than loosely-typed dynamic
//! callbacks — the teacher's own Tauri layer calls `app.emit(...)` inline
//! from worker code with a serializable payload; `ReplicatorCallbacks` is
//! that same shape generalized away from Tauri's event bus.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::events::FileEvent;
use crate::id::TaskId;
use crate::runner::RunnerStatus;

/// One item of a batch awaiting the safety gate, as shown in an alert
/// preview (§6: `batch_data`, capped to 100 items by the caller).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPreviewItem {
    pub event: FileEvent,
    pub is_reverse: bool,
    pub target_base: Option<PathBuf>,
}

/// The `result_dict` of §6's `on_file_event(task_id, event, result_dict)`.
/// Fields are optional because distinct call sites populate different
/// subsets — a plain copy/delete result looks nothing like a folder-batch
/// summary or a safety-alert payload, but both travel through the same
/// callback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileEventResult {
    pub success: bool,
    pub action: String,
    pub message: String,
    pub target_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_folder_batch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_current: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_remaining: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_data: Option<Vec<BatchPreviewItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_total_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accumulated_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_initial_sync: Option<bool>,
}

impl FileEventResult {
    pub fn simple(success: bool, action: impl Into<String>, message: impl Into<String>, target_path: Option<PathBuf>) -> Self {
        Self { success, action: action.into(), message: message.into(), target_path, ..Default::default() }
    }
}

/// Re-entry points and outbound notifications for the out-of-scope UI
/// layer (§1, §6). Implementations must not block — the core invokes these
/// inline on worker threads, exactly as the teacher's command handlers call
/// `app.emit(...)` inline from copy/move/delete worker code.
pub trait ReplicatorCallbacks: Send + Sync {
    fn on_status_change(&self, _task_id: &TaskId, _status: RunnerStatus) {}
    fn on_file_event(&self, _task_id: &TaskId, _event: &FileEvent, _result: &FileEventResult) {}
    /// Fired instead of `on_file_event` when the safety gate trips or an
    /// initial full sync needs confirmation — `result.alert_type` tells the
    /// two cases apart (`"massive_change"` vs `"empty_source"`).
    fn on_safety_alert(&self, _task_id: &TaskId, _alert: &FileEventResult) {}
}

/// A `ReplicatorCallbacks` that does nothing — the default when no UI
/// adapter is wired up (e.g. the `replicatord` binary running headless).
pub struct NullCallbacks;
impl ReplicatorCallbacks for NullCallbacks {}
