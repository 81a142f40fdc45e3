//! Storage layer for sync-server.
//!
//! Four narrow repository traits, one per record kind. [`SqliteStorage`]
//! implements all of them; the services only see [`Storage`].

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filesync_sync_core::SyncCursor;
use filesync_sync_types::{
    ChangeLogEntry, ConflictId, Device, DeviceId, FileId, SyncConflict, SyncState, UserId,
};

/// Registered devices, keyed by id and by credential.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Insert a new device. Fails if the id or credential already exists.
    async fn insert_device(&self, device: &Device) -> StorageResult<()>;

    /// Get a device by id.
    async fn get_device(&self, id: &DeviceId) -> StorageResult<Option<Device>>;

    /// Get a device by its sync credential.
    async fn get_device_by_token(&self, token: &str) -> StorageResult<Option<Device>>;

    /// All devices of a user, oldest registration first.
    async fn list_devices(&self, user_id: &UserId) -> StorageResult<Vec<Device>>;

    /// Flip the active flag. Returns false if the device does not exist.
    async fn set_device_active(&self, id: &DeviceId, active: bool) -> StorageResult<bool>;

    /// Record a completed sync. Returns false if the device does not exist.
    async fn set_last_sync(&self, id: &DeviceId, at: DateTime<Utc>) -> StorageResult<bool>;

    /// Remove a device row. Returns false if it did not exist.
    async fn delete_device(&self, id: &DeviceId) -> StorageResult<bool>;
}

/// The append-only change log.
#[async_trait]
pub trait ChangeLogStore: Send + Sync {
    /// Append one entry. Fails on a duplicate change id.
    async fn append_change(&self, entry: &ChangeLogEntry) -> StorageResult<()>;

    /// Entries of a user strictly after `after`, in `(timestamp, change_id)`
    /// order. `None` means from the beginning.
    async fn list_changes_after(
        &self,
        user_id: &UserId,
        after: Option<&SyncCursor>,
    ) -> StorageResult<Vec<ChangeLogEntry>>;

    /// Most recent entry for a file.
    async fn latest_change_for_file(
        &self,
        user_id: &UserId,
        file_id: &FileId,
    ) -> StorageResult<Option<ChangeLogEntry>>;

    /// Highest version `device_id` has logged for a file.
    async fn max_version_for_device(
        &self,
        user_id: &UserId,
        file_id: &FileId,
        device_id: &DeviceId,
    ) -> StorageResult<Option<i32>>;

    /// Number of entries after `after` not originated by `device_id`.
    async fn count_pending(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        after: Option<&SyncCursor>,
    ) -> StorageResult<u64>;
}

/// Recorded conflicts. Never deleted.
#[async_trait]
pub trait ConflictStore: Send + Sync {
    /// Insert a new conflict.
    async fn insert_conflict(&self, conflict: &SyncConflict) -> StorageResult<()>;

    /// Get a conflict by id.
    async fn get_conflict(&self, id: &ConflictId) -> StorageResult<Option<SyncConflict>>;

    /// Conflicts of a user, newest first.
    async fn list_conflicts(
        &self,
        user_id: &UserId,
        unresolved_only: bool,
    ) -> StorageResult<Vec<SyncConflict>>;

    /// Store the resolution fields of a conflict that is still open.
    /// Returns false if it does not exist or is already resolved.
    async fn resolve_conflict(&self, conflict: &SyncConflict) -> StorageResult<bool>;
}

/// Per-device sync bookmarks.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Get the state of a device.
    async fn get_sync_state(&self, device_id: &DeviceId) -> StorageResult<Option<SyncState>>;

    /// Insert or replace the state of a device as a whole.
    async fn upsert_sync_state(&self, state: &SyncState) -> StorageResult<()>;
}

/// Everything the services need from persistence.
#[async_trait]
pub trait Storage: DeviceStore + ChangeLogStore + ConflictStore + SyncStateStore {
    /// Round trip to the backing store, for health checks.
    async fn ping(&self) -> StorageResult<()>;
}
