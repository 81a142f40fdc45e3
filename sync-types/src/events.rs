//! Event payloads exchanged with the upstream and downstream pipelines.
//!
//! Inbound: [`FileEvent`] and [`StorageEvent`] arrive as JSON bytes from
//! the file and storage services. [`FileChangeEvent`] is the normalized
//! form the bridge appends to the change log.
//!
//! Outbound: [`SyncEvent`] describes a sync lifecycle step and
//! [`NotificationEvent`] is a user-facing notification produced elsewhere
//! that the hub forwards to connected clients.

use crate::{ChangeKind, DeviceId, FileId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// File-domain event in its strict (snake_case) shape.
///
/// Identifiers are kept as strings here; validation happens during
/// normalization so that a malformed id can be reported precisely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    /// Upstream event type, e.g. `file.uploaded` or `FILE_DELETED`.
    pub event_type: String,
    /// File identifier.
    pub file_id: String,
    /// Owning user identifier.
    pub user_id: String,
    /// Originating device, when the producer knows it.
    #[serde(default)]
    pub device_id: Option<String>,
    /// File version.
    #[serde(default)]
    pub version: i32,
    /// File name (used as path when no path is given).
    #[serde(default)]
    pub file_name: String,
    /// File path.
    #[serde(default)]
    pub file_path: String,
    /// Size in bytes.
    #[serde(default, alias = "file_size")]
    pub size: i64,
    /// Content hash.
    #[serde(default, alias = "file_hash")]
    pub hash: String,
    /// Event time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Extra producer metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Storage-domain event (object stored, deleted or moved).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEvent {
    /// Upstream event type.
    pub event_type: String,
    /// File the object belongs to.
    #[serde(default)]
    pub file_id: String,
    /// File version stored.
    #[serde(default)]
    pub version: i32,
    /// Object path inside the bucket.
    #[serde(default)]
    pub storage_path: String,
    /// Bucket name.
    #[serde(default)]
    pub bucket: String,
    /// Object size in bytes.
    #[serde(default)]
    pub size: i64,
    /// Content hash.
    #[serde(default)]
    pub hash: String,
    /// Event time.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Normalized file event, ready to be appended to the change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    /// Upstream event type as received.
    pub event_type: String,
    /// File identifier.
    pub file_id: FileId,
    /// Owning user.
    pub user_id: UserId,
    /// Originating device, if known.
    pub device_id: Option<DeviceId>,
    /// Normalized change kind.
    pub change_type: ChangeKind,
    /// File path.
    pub file_path: String,
    /// Content hash.
    pub file_hash: String,
    /// Size in bytes.
    pub file_size: i64,
    /// File version.
    pub version: i32,
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Opaque metadata.
    pub metadata: Map<String, Value>,
}

/// Sync lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncEventType {
    /// A sync operation began.
    #[serde(rename = "sync.started")]
    SyncStarted,
    /// Changes were persisted.
    #[serde(rename = "sync.completed")]
    SyncCompleted,
    /// No change of a batch could be persisted.
    #[serde(rename = "sync.failed")]
    SyncFailed,
    /// Two devices diverged on a file.
    #[serde(rename = "conflict.detected")]
    ConflictDetected,
    /// A conflict was resolved.
    #[serde(rename = "conflict.resolved")]
    ConflictResolved,
}

impl SyncEventType {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncEventType::SyncStarted => "sync.started",
            SyncEventType::SyncCompleted => "sync.completed",
            SyncEventType::SyncFailed => "sync.failed",
            SyncEventType::ConflictDetected => "conflict.detected",
            SyncEventType::ConflictResolved => "conflict.resolved",
        }
    }
}

/// Outward sync lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Lifecycle step.
    pub event_type: SyncEventType,
    /// Generated sync-session identifier (also the publish key).
    pub sync_id: String,
    /// Affected user.
    pub user_id: UserId,
    /// Device that triggered the event, if any.
    pub device_id: Option<DeviceId>,
    /// Affected files.
    #[serde(default)]
    pub file_ids: Vec<FileId>,
    /// Number of changes involved.
    #[serde(default)]
    pub changes_count: u32,
    /// Number of conflicts involved.
    #[serde(default)]
    pub conflicts_count: u32,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SyncEvent {
    /// Start a new event with a fresh sync id.
    pub fn new(event_type: SyncEventType, user_id: UserId, device_id: Option<DeviceId>) -> Self {
        Self {
            event_type,
            sync_id: uuid::Uuid::new_v4().to_string(),
            user_id,
            device_id,
            file_ids: Vec::new(),
            changes_count: 0,
            conflicts_count: 0,
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    /// Set the affected files.
    pub fn with_files(mut self, file_ids: Vec<FileId>) -> Self {
        self.file_ids = file_ids;
        self
    }

    /// Set change and conflict counts.
    pub fn with_counts(mut self, changes: u32, conflicts: u32) -> Self {
        self.changes_count = changes;
        self.conflicts_count = conflicts;
        self
    }

    /// Attach a metadata value.
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// User notification produced by the notification service.
///
/// The producer is camelCase; the hub forwards the payload as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Target user.
    pub user_id: String,
    /// Notification identifier.
    #[serde(default)]
    pub notification_id: String,
    /// Notification type.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Body.
    #[serde(default)]
    pub message: String,
    /// Priority label.
    #[serde(default)]
    pub priority: String,
    /// Related resource id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Related resource type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Creation time as sent by the producer.
    #[serde(default)]
    pub created_at: String,
    /// Extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}
