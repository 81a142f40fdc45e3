//! HTTP request and response bodies.
//!
//! These are the JSON shapes exchanged between sync clients and the
//! server's `/v1` endpoints.

use crate::{ChangeKind, ChangeLogEntry, ConflictId, DeviceId, FileId, ResolutionType, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Register a new device for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDeviceRequest {
    /// Owning user.
    pub user_id: UserId,
    /// Human-readable device name.
    pub device_name: String,
    /// Platform type.
    #[serde(default)]
    pub device_type: String,
    /// Operating system.
    #[serde(default)]
    pub os: String,
    /// Operating system version.
    #[serde(default)]
    pub os_version: String,
}

/// Result of a device registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDeviceResponse {
    /// Server-assigned device id.
    pub device_id: DeviceId,
    /// The device's sync credential (returned only here).
    pub sync_token: String,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
}

/// One local mutation pushed by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushChange {
    /// Client-generated change id; the server generates one if absent.
    #[serde(default)]
    pub change_id: Option<String>,
    /// File identifier (validated per entry).
    pub file_id: String,
    /// Kind of mutation.
    pub change_type: ChangeKind,
    /// File path.
    #[serde(default)]
    pub file_path: String,
    /// Content hash.
    #[serde(default)]
    pub file_hash: String,
    /// Size in bytes.
    #[serde(default)]
    pub file_size: i64,
    /// Local version of the file.
    #[serde(default)]
    pub version: i32,
    /// Client timestamp; server time when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Opaque metadata.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Push a batch of changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Changes in client order.
    pub changes: Vec<PushChange>,
}

/// Per-entry push status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    /// Entry appended to the log.
    Success,
    /// Entry appended and recorded as a conflict.
    Conflict,
    /// Entry rejected or not persisted.
    Failed,
}

/// Outcome for one pushed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeResult {
    /// File id as submitted.
    pub file_id: String,
    /// Change id assigned to the entry.
    pub change_id: String,
    /// Status.
    pub status: ChangeStatus,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Conflict recorded for this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_id: Option<ConflictId>,
}

impl ChangeResult {
    /// Whether the entry reached the log.
    pub fn persisted(&self) -> bool {
        !matches!(self.status, ChangeStatus::Failed)
    }
}

/// Response to a push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    /// One result per submitted change, in order.
    pub results: Vec<ChangeResult>,
}

/// Response to a pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Changes from other devices, oldest first.
    pub changes: Vec<ChangeLogEntry>,
    /// Cursor to commit once the changes are applied.
    pub sync_cursor: Option<String>,
    /// Always false: pulls return the full result set.
    pub has_more: bool,
}

/// Commit a cursor after applying pulled changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitCursorRequest {
    /// Cursor returned by a pull.
    pub sync_cursor: String,
    /// Number of files applied since the previous commit.
    #[serde(default)]
    pub files_synced: u32,
}

/// Record a conflict observed by a client or another service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterConflictRequest {
    /// File in disagreement.
    pub file_id: FileId,
    /// Owning user.
    pub user_id: UserId,
    /// Classification.
    #[serde(default = "default_conflict_type")]
    pub conflict_type: String,
    /// First device.
    pub device_a_id: DeviceId,
    /// Second device.
    pub device_b_id: DeviceId,
    /// Version from device A.
    pub version_a: i32,
    /// Version from device B.
    pub version_b: i32,
}

fn default_conflict_type() -> String {
    "concurrent_edit".to_string()
}

/// Resolve a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveConflictRequest {
    /// Chosen resolution.
    pub resolution_type: ResolutionType,
    /// File holding the resolution artifact.
    #[serde(default)]
    pub conflict_file_id: Option<FileId>,
}

/// Query for conflict listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictQuery {
    /// Only return unresolved conflicts.
    #[serde(default)]
    pub unresolved: bool,
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}
