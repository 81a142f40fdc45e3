//! Stored records: devices, change-log entries, sync state and conflicts.

use crate::{ChangeId, ConflictId, DeviceId, FileId, SyncCredential, SyncError, UserId};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered sync client.
///
/// Owned by the device registry. Other components only ever touch
/// `last_sync_at` and `is_active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Server-assigned identifier.
    pub id: DeviceId,
    /// Owning user.
    pub user_id: UserId,
    /// Human-readable name.
    pub device_name: String,
    /// Platform type (desktop, mobile, web, ...).
    pub device_type: String,
    /// Operating system.
    pub os: String,
    /// Operating system version.
    pub os_version: String,
    /// Credential proving this device's identity.
    #[serde(skip_serializing)]
    pub sync_token: SyncCredential,
    /// Last time the device committed a sync cursor.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Inactive devices cannot authenticate.
    pub is_active: bool,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
}

/// Kind of mutation recorded in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// File was created or uploaded.
    Created,
    /// File content or metadata changed.
    Updated,
    /// File was deleted.
    Deleted,
}

impl ChangeKind {
    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ChangeKind::Created),
            "updated" => Ok(ChangeKind::Updated),
            "deleted" => Ok(ChangeKind::Deleted),
            other => Err(SyncError::DecodeFailure(format!(
                "unknown change kind: {other}"
            ))),
        }
    }
}

/// An immutable entry of the append-only change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Globally unique change identifier.
    pub change_id: ChangeId,
    /// File the change applies to.
    pub file_id: FileId,
    /// Owning user.
    pub user_id: UserId,
    /// Originating device. `None` for changes ingested from upstream
    /// file events, which no device can claim.
    pub device_id: Option<DeviceId>,
    /// Kind of mutation.
    pub change_type: ChangeKind,
    /// Path of the file at the time of the change.
    pub file_path: String,
    /// Content hash.
    pub file_hash: String,
    /// Size in bytes.
    pub file_size: i64,
    /// Per-file version number reported by the originator.
    pub version: i32,
    /// Wall-clock time of the change (microsecond precision).
    pub timestamp: DateTime<Utc>,
    /// Opaque metadata payload.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ChangeLogEntry {
    /// Whether this entry was produced by the given device.
    pub fn originated_by(&self, device: &DeviceId) -> bool {
        self.device_id.as_ref() == Some(device)
    }
}

/// Truncate a timestamp to the precision the log stores.
pub fn log_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// A device's private bookmark into the change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Device this state belongs to.
    pub device_id: DeviceId,
    /// Owning user.
    pub user_id: UserId,
    /// Opaque resumption token; `None` means "from the beginning".
    pub sync_cursor: Option<String>,
    /// Last time the cursor was committed.
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    /// Cumulative number of files acknowledged.
    pub files_synced: i64,
    /// Changes from other devices after the cursor at commit time.
    pub pending_changes: i64,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    /// State of a device that has never committed a cursor.
    pub fn empty(device_id: DeviceId, user_id: UserId) -> Self {
        Self {
            device_id,
            user_id,
            sync_cursor: None,
            last_sync_timestamp: None,
            files_synced: 0,
            pending_changes: 0,
            updated_at: Utc::now(),
        }
    }
}

/// How a conflict was settled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    /// Device A's version kept.
    KeepA,
    /// Device B's version kept.
    KeepB,
    /// Both versions kept; one side moved to a conflict copy.
    KeepBoth,
    /// Versions merged by the client.
    Merged,
    /// Any other client-defined resolution.
    #[serde(untagged)]
    Other(String),
}

impl ResolutionType {
    /// Wire name.
    pub fn as_str(&self) -> &str {
        match self {
            ResolutionType::KeepA => "keep_a",
            ResolutionType::KeepB => "keep_b",
            ResolutionType::KeepBoth => "keep_both",
            ResolutionType::Merged => "merged",
            ResolutionType::Other(s) => s,
        }
    }

    /// Parse a wire name; unknown names become [`ResolutionType::Other`].
    pub fn parse(s: &str) -> Self {
        match s {
            "keep_a" => ResolutionType::KeepA,
            "keep_b" => ResolutionType::KeepB,
            "keep_both" => ResolutionType::KeepBoth,
            "merged" => ResolutionType::Merged,
            other => ResolutionType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResolutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded divergence between two devices' versions of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Server-assigned identifier.
    pub id: ConflictId,
    /// File in disagreement.
    pub file_id: FileId,
    /// Owning user.
    pub user_id: UserId,
    /// Free-form conflict classification (e.g. `concurrent_edit`).
    pub conflict_type: String,
    /// First device.
    pub device_a_id: DeviceId,
    /// Second device, always distinct from the first.
    pub device_b_id: DeviceId,
    /// Version seen from device A.
    pub version_a: i32,
    /// Version seen from device B.
    pub version_b: i32,
    /// Terminal once true.
    pub resolved: bool,
    /// Set together with `resolved`.
    pub resolution_type: Option<ResolutionType>,
    /// File created to hold one side of the conflict, if any.
    pub conflict_file_id: Option<FileId>,
    /// Insert time.
    pub created_at: DateTime<Utc>,
    /// Resolution time.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SyncConflict {
    /// Lifecycle status.
    pub fn status(&self) -> ConflictStatus {
        if self.resolved {
            ConflictStatus::Resolved
        } else {
            ConflictStatus::Pending
        }
    }
}

/// Lifecycle status of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    /// Awaiting resolution.
    Pending,
    /// Resolved; no further changes.
    Resolved,
}
