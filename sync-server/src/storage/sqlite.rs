//! SQLite storage backend for sync-server.
//!
//! Identifiers are stored as 16-byte BLOBs and timestamps as INTEGER
//! microseconds since the epoch, so the change log sorts natively by
//! `(timestamp, change_id)`.

use super::{ChangeLogStore, ConflictStore, DeviceStore, Storage, SyncStateStore};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filesync_sync_core::SyncCursor;
use filesync_sync_types::{
    ChangeId, ChangeKind, ChangeLogEntry, ConflictId, Device, DeviceId, FileId, ResolutionType,
    SyncConflict, SyncCredential, SyncState, UserId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// SQLite-based storage for devices, the change log, conflicts and sync
/// state.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("connections", &self.pool.size())
            .finish()
    }
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // A single connection: every new connection would see an empty db.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Close the pool. Later queries fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        const SCHEMA: &[&str] = &[
            r#"
            CREATE TABLE IF NOT EXISTS devices (
                id BLOB PRIMARY KEY,
                user_id BLOB NOT NULL,
                device_name TEXT NOT NULL,
                device_type TEXT NOT NULL,
                os TEXT NOT NULL,
                os_version TEXT NOT NULL,
                sync_token TEXT NOT NULL UNIQUE,
                last_sync_at INTEGER,
                is_active INTEGER NOT NULL DEFAULT 1,
                registered_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS change_log (
                change_id TEXT PRIMARY KEY,
                file_id BLOB NOT NULL,
                user_id BLOB NOT NULL,
                device_id BLOB,
                change_type TEXT NOT NULL,
                file_path TEXT NOT NULL,
                file_hash TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                version INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                metadata TEXT NOT NULL DEFAULT 'null'
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sync_conflicts (
                id BLOB PRIMARY KEY,
                file_id BLOB NOT NULL,
                user_id BLOB NOT NULL,
                conflict_type TEXT NOT NULL,
                device_a_id BLOB NOT NULL,
                device_b_id BLOB NOT NULL,
                version_a INTEGER NOT NULL,
                version_b INTEGER NOT NULL,
                resolved INTEGER NOT NULL DEFAULT 0,
                resolution_type TEXT,
                conflict_file_id BLOB,
                created_at INTEGER NOT NULL,
                resolved_at INTEGER,
                CHECK (device_a_id != device_b_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sync_state (
                device_id BLOB PRIMARY KEY,
                user_id BLOB NOT NULL,
                sync_cursor TEXT,
                last_sync_timestamp INTEGER,
                files_synced INTEGER NOT NULL DEFAULT 0,
                pending_changes INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_devices_user ON devices(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_change_log_user_order ON change_log(user_id, timestamp, change_id)",
            "CREATE INDEX IF NOT EXISTS idx_change_log_file ON change_log(user_id, file_id, timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_conflicts_user ON sync_conflicts(user_id, resolved)",
        ];

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(StorageError::Database)?;
        }
        Ok(())
    }
}

fn micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(table: &'static str, column: &'static str, v: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(v).ok_or_else(|| StorageError::Corrupt {
        table,
        column,
        value: v.to_string(),
    })
}

macro_rules! decode_id {
    ($ty:ty, $table:literal, $column:literal, $raw:expr) => {
        <$ty>::from_bytes(&$raw).ok_or_else(|| StorageError::corrupt_bytes($table, $column, &$raw))
    };
}

#[async_trait]
impl DeviceStore for SqliteStorage {
    async fn insert_device(&self, device: &Device) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO devices (id, user_id, device_name, device_type, os, os_version,
                                 sync_token, last_sync_at, is_active, registered_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(device.id.as_bytes().as_slice())
        .bind(device.user_id.as_bytes().as_slice())
        .bind(&device.device_name)
        .bind(&device.device_type)
        .bind(&device.os)
        .bind(&device.os_version)
        .bind(device.sync_token.as_str())
        .bind(device.last_sync_at.map(micros))
        .bind(device.is_active)
        .bind(micros(device.registered_at))
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn get_device(&self, id: &DeviceId) -> StorageResult<Option<Device>> {
        let row = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT id, user_id, device_name, device_type, os, os_version,
                   sync_token, last_sync_at, is_active, registered_at
            FROM devices WHERE id = ?1
            "#,
        )
        .bind(id.as_bytes().as_slice())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(Device::try_from).transpose()
    }

    async fn get_device_by_token(&self, token: &str) -> StorageResult<Option<Device>> {
        let row = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT id, user_id, device_name, device_type, os, os_version,
                   sync_token, last_sync_at, is_active, registered_at
            FROM devices WHERE sync_token = ?1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(Device::try_from).transpose()
    }

    async fn list_devices(&self, user_id: &UserId) -> StorageResult<Vec<Device>> {
        let rows = sqlx::query_as::<_, DeviceRow>(
            r#"
            SELECT id, user_id, device_name, device_type, os, os_version,
                   sync_token, last_sync_at, is_active, registered_at
            FROM devices WHERE user_id = ?1
            ORDER BY registered_at ASC
            "#,
        )
        .bind(user_id.as_bytes().as_slice())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(Device::try_from).collect()
    }

    async fn set_device_active(&self, id: &DeviceId, active: bool) -> StorageResult<bool> {
        let result = sqlx::query("UPDATE devices SET is_active = ?2 WHERE id = ?1")
            .bind(id.as_bytes().as_slice())
            .bind(active)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_last_sync(&self, id: &DeviceId, at: DateTime<Utc>) -> StorageResult<bool> {
        let result = sqlx::query("UPDATE devices SET last_sync_at = ?2 WHERE id = ?1")
            .bind(id.as_bytes().as_slice())
            .bind(micros(at))
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_device(&self, id: &DeviceId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE id = ?1")
            .bind(id.as_bytes().as_slice())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ChangeLogStore for SqliteStorage {
    async fn append_change(&self, entry: &ChangeLogEntry) -> StorageResult<()> {
        let metadata = serde_json::to_string(&entry.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO change_log (change_id, file_id, user_id, device_id, change_type,
                                    file_path, file_hash, file_size, version, timestamp, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(entry.change_id.as_str())
        .bind(entry.file_id.as_bytes().as_slice())
        .bind(entry.user_id.as_bytes().as_slice())
        .bind(entry.device_id.as_ref().map(|d| d.as_bytes().to_vec()))
        .bind(entry.change_type.as_str())
        .bind(&entry.file_path)
        .bind(&entry.file_hash)
        .bind(entry.file_size)
        .bind(entry.version)
        .bind(micros(entry.timestamp))
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn list_changes_after(
        &self,
        user_id: &UserId,
        after: Option<&SyncCursor>,
    ) -> StorageResult<Vec<ChangeLogEntry>> {
        let rows = match after {
            None => {
                sqlx::query_as::<_, ChangeRow>(
                    r#"
                    SELECT change_id, file_id, user_id, device_id, change_type, file_path,
                           file_hash, file_size, version, timestamp, metadata
                    FROM change_log
                    WHERE user_id = ?1
                    ORDER BY timestamp ASC, change_id ASC
                    "#,
                )
                .bind(user_id.as_bytes().as_slice())
                .fetch_all(&self.pool)
                .await
            }
            Some(cursor) => {
                sqlx::query_as::<_, ChangeRow>(
                    r#"
                    SELECT change_id, file_id, user_id, device_id, change_type, file_path,
                           file_hash, file_size, version, timestamp, metadata
                    FROM change_log
                    WHERE user_id = ?1
                      AND (timestamp > ?2 OR (timestamp = ?2 AND change_id > ?3))
                    ORDER BY timestamp ASC, change_id ASC
                    "#,
                )
                .bind(user_id.as_bytes().as_slice())
                .bind(micros(cursor.timestamp()))
                .bind(cursor.change_id().as_str())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StorageError::Database)?;

        rows.into_iter().map(ChangeLogEntry::try_from).collect()
    }

    async fn latest_change_for_file(
        &self,
        user_id: &UserId,
        file_id: &FileId,
    ) -> StorageResult<Option<ChangeLogEntry>> {
        let row = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT change_id, file_id, user_id, device_id, change_type, file_path,
                   file_hash, file_size, version, timestamp, metadata
            FROM change_log
            WHERE user_id = ?1 AND file_id = ?2
            ORDER BY timestamp DESC, change_id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_bytes().as_slice())
        .bind(file_id.as_bytes().as_slice())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(ChangeLogEntry::try_from).transpose()
    }

    async fn max_version_for_device(
        &self,
        user_id: &UserId,
        file_id: &FileId,
        device_id: &DeviceId,
    ) -> StorageResult<Option<i32>> {
        let version: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT MAX(version)
            FROM change_log
            WHERE user_id = ?1 AND file_id = ?2 AND device_id = ?3
            "#,
        )
        .bind(user_id.as_bytes().as_slice())
        .bind(file_id.as_bytes().as_slice())
        .bind(device_id.as_bytes().as_slice())
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(version)
    }

    async fn count_pending(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        after: Option<&SyncCursor>,
    ) -> StorageResult<u64> {
        // A NULL cursor timestamp matches everything.
        let (ts, change_id) = match after {
            Some(c) => (Some(micros(c.timestamp())), c.change_id().as_str().to_string()),
            None => (None, String::new()),
        };

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM change_log
            WHERE user_id = ?1
              AND (device_id IS NULL OR device_id != ?2)
              AND (?3 IS NULL OR timestamp > ?3 OR (timestamp = ?3 AND change_id > ?4))
            "#,
        )
        .bind(user_id.as_bytes().as_slice())
        .bind(device_id.as_bytes().as_slice())
        .bind(ts)
        .bind(change_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(count as u64)
    }
}

#[async_trait]
impl ConflictStore for SqliteStorage {
    async fn insert_conflict(&self, conflict: &SyncConflict) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_conflicts (id, file_id, user_id, conflict_type, device_a_id,
                                        device_b_id, version_a, version_b, resolved,
                                        resolution_type, conflict_file_id, created_at, resolved_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(conflict.id.as_bytes().as_slice())
        .bind(conflict.file_id.as_bytes().as_slice())
        .bind(conflict.user_id.as_bytes().as_slice())
        .bind(&conflict.conflict_type)
        .bind(conflict.device_a_id.as_bytes().as_slice())
        .bind(conflict.device_b_id.as_bytes().as_slice())
        .bind(conflict.version_a)
        .bind(conflict.version_b)
        .bind(conflict.resolved)
        .bind(conflict.resolution_type.as_ref().map(|r| r.as_str().to_string()))
        .bind(conflict.conflict_file_id.map(|f| f.as_bytes().to_vec()))
        .bind(micros(conflict.created_at))
        .bind(conflict.resolved_at.map(micros))
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn get_conflict(&self, id: &ConflictId) -> StorageResult<Option<SyncConflict>> {
        let row = sqlx::query_as::<_, ConflictRow>(
            r#"
            SELECT id, file_id, user_id, conflict_type, device_a_id, device_b_id,
                   version_a, version_b, resolved, resolution_type, conflict_file_id,
                   created_at, resolved_at
            FROM sync_conflicts WHERE id = ?1
            "#,
        )
        .bind(id.as_bytes().as_slice())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(SyncConflict::try_from).transpose()
    }

    async fn list_conflicts(
        &self,
        user_id: &UserId,
        unresolved_only: bool,
    ) -> StorageResult<Vec<SyncConflict>> {
        let rows = sqlx::query_as::<_, ConflictRow>(
            r#"
            SELECT id, file_id, user_id, conflict_type, device_a_id, device_b_id,
                   version_a, version_b, resolved, resolution_type, conflict_file_id,
                   created_at, resolved_at
            FROM sync_conflicts
            WHERE user_id = ?1 AND (?2 = 0 OR resolved = 0)
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.as_bytes().as_slice())
        .bind(unresolved_only)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        rows.into_iter().map(SyncConflict::try_from).collect()
    }

    async fn resolve_conflict(&self, conflict: &SyncConflict) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sync_conflicts
            SET resolved = 1, resolution_type = ?2, conflict_file_id = ?3, resolved_at = ?4
            WHERE id = ?1 AND resolved = 0
            "#,
        )
        .bind(conflict.id.as_bytes().as_slice())
        .bind(conflict.resolution_type.as_ref().map(|r| r.as_str().to_string()))
        .bind(conflict.conflict_file_id.map(|f| f.as_bytes().to_vec()))
        .bind(conflict.resolved_at.map(micros))
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SyncStateStore for SqliteStorage {
    async fn get_sync_state(&self, device_id: &DeviceId) -> StorageResult<Option<SyncState>> {
        let row = sqlx::query_as::<_, SyncStateRow>(
            r#"
            SELECT device_id, user_id, sync_cursor, last_sync_timestamp,
                   files_synced, pending_changes, updated_at
            FROM sync_state WHERE device_id = ?1
            "#,
        )
        .bind(device_id.as_bytes().as_slice())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        row.map(SyncState::try_from).transpose()
    }

    async fn upsert_sync_state(&self, state: &SyncState) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (device_id, user_id, sync_cursor, last_sync_timestamp,
                                    files_synced, pending_changes, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(device_id) DO UPDATE SET
                user_id = excluded.user_id,
                sync_cursor = excluded.sync_cursor,
                last_sync_timestamp = excluded.last_sync_timestamp,
                files_synced = excluded.files_synced,
                pending_changes = excluded.pending_changes,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(state.device_id.as_bytes().as_slice())
        .bind(state.user_id.as_bytes().as_slice())
        .bind(state.sync_cursor.as_deref())
        .bind(state.last_sync_timestamp.map(micros))
        .bind(state.files_synced)
        .bind(state.pending_changes)
        .bind(micros(state.updated_at))
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    id: Vec<u8>,
    user_id: Vec<u8>,
    device_name: String,
    device_type: String,
    os: String,
    os_version: String,
    sync_token: String,
    last_sync_at: Option<i64>,
    is_active: bool,
    registered_at: i64,
}

impl TryFrom<DeviceRow> for Device {
    type Error = StorageError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        Ok(Device {
            id: decode_id!(DeviceId, "devices", "id", row.id)?,
            user_id: decode_id!(UserId, "devices", "user_id", row.user_id)?,
            device_name: row.device_name,
            device_type: row.device_type,
            os: row.os,
            os_version: row.os_version,
            sync_token: SyncCredential::from_presented(row.sync_token),
            last_sync_at: row
                .last_sync_at
                .map(|v| from_micros("devices", "last_sync_at", v))
                .transpose()?,
            is_active: row.is_active,
            registered_at: from_micros("devices", "registered_at", row.registered_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChangeRow {
    change_id: String,
    file_id: Vec<u8>,
    user_id: Vec<u8>,
    device_id: Option<Vec<u8>>,
    change_type: String,
    file_path: String,
    file_hash: String,
    file_size: i64,
    version: i32,
    timestamp: i64,
    metadata: String,
}

impl TryFrom<ChangeRow> for ChangeLogEntry {
    type Error = StorageError;

    fn try_from(row: ChangeRow) -> Result<Self, Self::Error> {
        let device_id = match row.device_id {
            Some(raw) => Some(decode_id!(DeviceId, "change_log", "device_id", raw)?),
            None => None,
        };
        let change_type =
            ChangeKind::from_str(&row.change_type).map_err(|_| StorageError::Corrupt {
                table: "change_log",
                column: "change_type",
                value: row.change_type.clone(),
            })?;

        Ok(ChangeLogEntry {
            change_id: ChangeId::from(row.change_id),
            file_id: decode_id!(FileId, "change_log", "file_id", row.file_id)?,
            user_id: decode_id!(UserId, "change_log", "user_id", row.user_id)?,
            device_id,
            change_type,
            file_path: row.file_path,
            file_hash: row.file_hash,
            file_size: row.file_size,
            version: row.version,
            timestamp: from_micros("change_log", "timestamp", row.timestamp)?,
            metadata: serde_json::from_str(&row.metadata)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ConflictRow {
    id: Vec<u8>,
    file_id: Vec<u8>,
    user_id: Vec<u8>,
    conflict_type: String,
    device_a_id: Vec<u8>,
    device_b_id: Vec<u8>,
    version_a: i32,
    version_b: i32,
    resolved: bool,
    resolution_type: Option<String>,
    conflict_file_id: Option<Vec<u8>>,
    created_at: i64,
    resolved_at: Option<i64>,
}

impl TryFrom<ConflictRow> for SyncConflict {
    type Error = StorageError;

    fn try_from(row: ConflictRow) -> Result<Self, Self::Error> {
        let conflict_file_id = match row.conflict_file_id {
            Some(raw) => Some(decode_id!(FileId, "sync_conflicts", "conflict_file_id", raw)?),
            None => None,
        };

        Ok(SyncConflict {
            id: decode_id!(ConflictId, "sync_conflicts", "id", row.id)?,
            file_id: decode_id!(FileId, "sync_conflicts", "file_id", row.file_id)?,
            user_id: decode_id!(UserId, "sync_conflicts", "user_id", row.user_id)?,
            conflict_type: row.conflict_type,
            device_a_id: decode_id!(DeviceId, "sync_conflicts", "device_a_id", row.device_a_id)?,
            device_b_id: decode_id!(DeviceId, "sync_conflicts", "device_b_id", row.device_b_id)?,
            version_a: row.version_a,
            version_b: row.version_b,
            resolved: row.resolved,
            resolution_type: row.resolution_type.as_deref().map(ResolutionType::parse),
            conflict_file_id,
            created_at: from_micros("sync_conflicts", "created_at", row.created_at)?,
            resolved_at: row
                .resolved_at
                .map(|v| from_micros("sync_conflicts", "resolved_at", v))
                .transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SyncStateRow {
    device_id: Vec<u8>,
    user_id: Vec<u8>,
    sync_cursor: Option<String>,
    last_sync_timestamp: Option<i64>,
    files_synced: i64,
    pending_changes: i64,
    updated_at: i64,
}

impl TryFrom<SyncStateRow> for SyncState {
    type Error = StorageError;

    fn try_from(row: SyncStateRow) -> Result<Self, Self::Error> {
        Ok(SyncState {
            device_id: decode_id!(DeviceId, "sync_state", "device_id", row.device_id)?,
            user_id: decode_id!(UserId, "sync_state", "user_id", row.user_id)?,
            sync_cursor: row.sync_cursor,
            last_sync_timestamp: row
                .last_sync_timestamp
                .map(|v| from_micros("sync_state", "last_sync_timestamp", v))
                .transpose()?,
            files_synced: row.files_synced,
            pending_changes: row.pending_changes,
            updated_at: from_micros("sync_state", "updated_at", row.updated_at)?,
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;
        Ok(())
    }
}
