//! Change log and cursor sync.
//!
//! Push appends entries best-effort, one at a time: a failed entry is
//! reported in its [`ChangeResult`] and the rest of the batch still goes
//! through. Pull returns everything after the device's committed cursor
//! except the device's own entries. Committing the cursor is a separate
//! step so that a client which crashes mid-apply pulls the same changes
//! again.

use crate::conflicts::ConflictLedger;
use crate::events::SyncEventPublisher;
use crate::registry::DeviceRegistry;
use crate::server::ServerMetrics;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use filesync_sync_core::{ConflictPolicy, PullBatch, SyncCursor};
use filesync_sync_types::api::{
    ChangeResult, ChangeStatus, CommitCursorRequest, PullResponse, PushChange, PushResponse,
};
use filesync_sync_types::{
    log_precision, ChangeId, ChangeLogEntry, Device, DeviceId, FileChangeEvent, FileId, SyncError,
    SyncEvent, SyncEventType, SyncState,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Push, pull and cursor bookkeeping over the change log.
#[derive(Clone)]
pub struct ChangeLog {
    store: Arc<dyn Storage>,
    registry: DeviceRegistry,
    conflicts: ConflictLedger,
    policy: Arc<dyn ConflictPolicy>,
    publisher: SyncEventPublisher,
    metrics: Arc<ServerMetrics>,
}

impl std::fmt::Debug for ChangeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeLog")
            .field("policy", &self.policy.name())
            .finish_non_exhaustive()
    }
}

impl ChangeLog {
    /// Create the change log service.
    pub fn new(
        store: Arc<dyn Storage>,
        registry: DeviceRegistry,
        conflicts: ConflictLedger,
        policy: Arc<dyn ConflictPolicy>,
        publisher: SyncEventPublisher,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            store,
            registry,
            conflicts,
            policy,
            publisher,
            metrics,
        }
    }

    /// Append a batch of changes from a device.
    ///
    /// Fails as a whole only if the device is unknown or inactive, before
    /// anything is written.
    pub async fn push(
        &self,
        device_id: &DeviceId,
        changes: Vec<PushChange>,
    ) -> Result<PushResponse, SyncError> {
        let device = self.registry.get_active(device_id).await?;
        self.metrics.pushes_total.fetch_add(1, Ordering::Relaxed);

        let now = log_precision(Utc::now());
        let submitted = changes.len();
        let mut results = Vec::with_capacity(submitted);
        for change in changes {
            results.push(self.push_one(&device, change, now).await);
        }

        let persisted: Vec<FileId> = results
            .iter()
            .filter(|r| r.persisted())
            .filter_map(|r| FileId::parse(&r.file_id).ok())
            .collect();
        let conflicts = results
            .iter()
            .filter(|r| r.status == ChangeStatus::Conflict)
            .count();
        let failed = submitted - persisted.len();

        tracing::info!(
            device_id = %device.id,
            user_id = %device.user_id,
            submitted,
            persisted = persisted.len(),
            failed,
            conflicts,
            "push complete"
        );

        let event_type = if persisted.is_empty() && submitted > 0 {
            SyncEventType::SyncFailed
        } else {
            SyncEventType::SyncCompleted
        };
        let event = SyncEvent::new(event_type, device.user_id, Some(device.id))
            .with_counts(persisted.len() as u32, conflicts as u32)
            .with_files(persisted)
            .with_meta("source", "push")
            .with_meta("failed", failed);
        self.publisher.publish(&event).await;

        Ok(PushResponse { results })
    }

    async fn push_one(&self, device: &Device, change: PushChange, now: DateTime<Utc>) -> ChangeResult {
        let change_id = ChangeId::from_client(change.change_id);
        let file_id = match FileId::parse(&change.file_id) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(device_id = %device.id, error = %e, "rejecting pushed change");
                self.metrics.push_entry_failures.fetch_add(1, Ordering::Relaxed);
                return failed(change.file_id, change_id, &e);
            }
        };

        match self
            .store
            .max_version_for_device(&device.user_id, &file_id, &device.id)
            .await
        {
            Ok(Some(logged)) if change.version < logged => {
                tracing::warn!(
                    device_id = %device.id,
                    file_id = %file_id,
                    logged,
                    incoming = change.version,
                    "rejecting version regression"
                );
                self.metrics.push_entry_failures.fetch_add(1, Ordering::Relaxed);
                let err = SyncError::VersionRegression {
                    file_id: file_id.to_string(),
                    logged,
                    incoming: change.version,
                };
                return failed(change.file_id, change_id, &err);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(file_id = %file_id, error = %e, "version lookup failed");
                self.metrics.push_entry_failures.fetch_add(1, Ordering::Relaxed);
                return failed(
                    change.file_id,
                    change_id,
                    &SyncError::PersistenceFailure(e.to_string()),
                );
            }
        }

        let entry = ChangeLogEntry {
            change_id,
            file_id,
            user_id: device.user_id,
            device_id: Some(device.id),
            change_type: change.change_type,
            file_path: change.file_path,
            file_hash: change.file_hash,
            file_size: change.file_size,
            version: change.version,
            timestamp: log_precision(change.timestamp.unwrap_or(now)),
            metadata: change.metadata.unwrap_or(serde_json::Value::Null),
        };

        let latest = if self.policy.inspects_history() {
            match self
                .store
                .latest_change_for_file(&entry.user_id, &entry.file_id)
                .await
            {
                Ok(latest) => latest,
                Err(e) => {
                    tracing::warn!(file_id = %entry.file_id, error = %e, "conflict check skipped");
                    None
                }
            }
        } else {
            None
        };

        if let Err(e) = self.store.append_change(&entry).await {
            tracing::error!(
                change_id = %entry.change_id,
                file_id = %entry.file_id,
                error = %e,
                "failed to persist change, skipping"
            );
            self.metrics.push_entry_failures.fetch_add(1, Ordering::Relaxed);
            return failed(
                change.file_id,
                entry.change_id,
                &SyncError::PersistenceFailure(e.to_string()),
            );
        }
        self.metrics.changes_appended.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(change_id = %entry.change_id, file_id = %entry.file_id, "change appended");

        let mut result = ChangeResult {
            file_id: change.file_id,
            change_id: entry.change_id.as_str().to_string(),
            status: ChangeStatus::Success,
            error: None,
            conflict_id: None,
        };

        if let Some(candidate) = self.policy.evaluate(latest.as_ref(), &entry) {
            match self.conflicts.record(candidate).await {
                Ok(conflict) => {
                    result.status = ChangeStatus::Conflict;
                    result.conflict_id = Some(conflict.id);
                }
                Err(e) => {
                    tracing::warn!(file_id = %entry.file_id, error = %e, "conflict not recorded");
                }
            }
        }
        result
    }

    /// Changes for a device since its committed cursor.
    pub async fn pull(&self, device_id: &DeviceId) -> Result<PullResponse, SyncError> {
        let device = self.registry.get_active(device_id).await?;
        self.metrics.pulls_total.fetch_add(1, Ordering::Relaxed);

        let previous = self.stored_cursor(&device).await?;
        let entries = self
            .store
            .list_changes_after(&device.user_id, previous.as_ref())
            .await?;
        let fetched = entries.len();
        let batch = PullBatch::assemble(entries, &device.id, previous);

        tracing::debug!(
            device_id = %device.id,
            fetched,
            delivered = batch.changes.len(),
            "pull complete"
        );

        Ok(PullResponse {
            changes: batch.changes,
            sync_cursor: batch.cursor.map(|c| c.encode()),
            has_more: false,
        })
    }

    /// Acknowledge a pull: store the cursor and refresh the counters.
    pub async fn commit_cursor(
        &self,
        device_id: &DeviceId,
        req: CommitCursorRequest,
    ) -> Result<SyncState, SyncError> {
        let device = self.registry.get_active(device_id).await?;
        let cursor = SyncCursor::decode(&req.sync_cursor)?;
        self.metrics.commits_total.fetch_add(1, Ordering::Relaxed);

        let pending = self
            .store
            .count_pending(&device.user_id, &device.id, Some(&cursor))
            .await?;
        let previous = self.store.get_sync_state(&device.id).await?;
        let now = log_precision(Utc::now());

        let state = SyncState {
            device_id: device.id,
            user_id: device.user_id,
            sync_cursor: Some(cursor.encode()),
            last_sync_timestamp: Some(now),
            files_synced: previous.map_or(0, |s| s.files_synced) + i64::from(req.files_synced),
            pending_changes: pending as i64,
            updated_at: now,
        };
        self.store.upsert_sync_state(&state).await.map_err(|e| {
            tracing::error!(device_id = %device.id, error = %e, "sync state upsert failed");
            SyncError::from(e)
        })?;
        self.registry.touch_last_sync(&device.id, now).await?;

        tracing::info!(
            device_id = %device.id,
            files_synced = state.files_synced,
            pending_changes = state.pending_changes,
            "cursor committed"
        );
        Ok(state)
    }

    /// Stored sync state, or an empty one if the device never committed.
    pub async fn sync_state(&self, device_id: &DeviceId) -> Result<SyncState, SyncError> {
        let device = self.registry.get(device_id).await?;
        Ok(self
            .store
            .get_sync_state(&device.id)
            .await?
            .unwrap_or_else(|| SyncState::empty(device.id, device.user_id)))
    }

    /// Append a normalized upstream file event as a new entry and announce
    /// it.
    pub async fn append_upstream(&self, upstream: FileChangeEvent) -> Result<ChangeLogEntry, SyncError> {
        let entry = ChangeLogEntry {
            change_id: ChangeId::generate(),
            file_id: upstream.file_id,
            user_id: upstream.user_id,
            device_id: upstream.device_id,
            change_type: upstream.change_type,
            file_path: upstream.file_path,
            file_hash: upstream.file_hash,
            file_size: upstream.file_size,
            version: upstream.version,
            timestamp: log_precision(upstream.timestamp),
            metadata: serde_json::Value::Object(upstream.metadata),
        };

        self.store.append_change(&entry).await?;
        self.metrics.changes_appended.fetch_add(1, Ordering::Relaxed);

        let event = SyncEvent::new(SyncEventType::SyncCompleted, entry.user_id, entry.device_id)
            .with_files(vec![entry.file_id])
            .with_counts(1, 0)
            .with_meta("source", "file_event")
            .with_meta("event_type", upstream.event_type)
            .with_meta("change_type", entry.change_type.as_str());
        self.publisher.publish(&event).await;

        Ok(entry)
    }

    async fn stored_cursor(&self, device: &Device) -> Result<Option<SyncCursor>, SyncError> {
        let Some(state) = self.store.get_sync_state(&device.id).await? else {
            return Ok(None);
        };
        let Some(token) = state.sync_cursor else {
            return Ok(None);
        };
        match SyncCursor::decode(&token) {
            Ok(cursor) => Ok(Some(cursor)),
            Err(_) => {
                tracing::warn!(device_id = %device.id, "stored cursor unreadable, pulling from start");
                Ok(None)
            }
        }
    }
}

fn failed(file_id: String, change_id: ChangeId, error: &SyncError) -> ChangeResult {
    ChangeResult {
        file_id,
        change_id: change_id.into_string(),
        status: ChangeStatus::Failed,
        error: Some(error.to_string()),
        conflict_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{channel, ChannelSource, EventSource};
    use crate::storage::SqliteStorage;
    use chrono::TimeZone;
    use filesync_sync_core::{DivergentVersion, NoDetection};
    use filesync_sync_types::api::RegisterDeviceRequest;
    use filesync_sync_types::{ChangeKind, UserId};

    struct Fixture {
        log: ChangeLog,
        registry: DeviceRegistry,
        conflicts: ConflictLedger,
        events: ChannelSource,
        metrics: Arc<ServerMetrics>,
    }

    async fn fixture_with(policy: Arc<dyn ConflictPolicy>) -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let metrics = Arc::new(ServerMetrics::default());
        let (sink, events) = channel(64);
        let publisher =
            SyncEventPublisher::new(Arc::new(sink), "sync.events".to_string(), metrics.clone());
        let registry = DeviceRegistry::new(storage.clone());
        let conflicts = ConflictLedger::new(storage.clone(), publisher.clone(), metrics.clone());
        let log = ChangeLog::new(
            storage,
            registry.clone(),
            conflicts.clone(),
            policy,
            publisher,
            metrics.clone(),
        );
        Fixture {
            log,
            registry,
            conflicts,
            events,
            metrics,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(Arc::new(NoDetection)).await
    }

    async fn device(registry: &DeviceRegistry, user_id: UserId, name: &str) -> Device {
        registry
            .register(RegisterDeviceRequest {
                user_id,
                device_name: name.to_string(),
                device_type: "desktop".to_string(),
                os: "linux".to_string(),
                os_version: "6.8".to_string(),
            })
            .await
            .unwrap()
    }

    fn change(file_id: FileId, version: i32, secs: i64) -> PushChange {
        PushChange {
            change_id: None,
            file_id: file_id.to_string(),
            change_type: ChangeKind::Updated,
            file_path: "/notes/todo.md".to_string(),
            file_hash: "sha256:abc".to_string(),
            file_size: 128,
            version,
            timestamp: Some(Utc.timestamp_opt(secs, 123_456_000).unwrap()),
            metadata: Some(serde_json::json!({ "mime": "text/markdown" })),
        }
    }

    async fn next_event(events: &mut ChannelSource) -> SyncEvent {
        let message = events.recv().await.unwrap();
        serde_json::from_slice(&message.payload).unwrap()
    }

    #[tokio::test]
    async fn push_then_pull_from_other_device() {
        let mut fx = fixture().await;
        let user = UserId::new();
        let a = device(&fx.registry, user, "a").await;
        let b = device(&fx.registry, user, "b").await;
        let file = FileId::new();

        let pushed = fx
            .log
            .push(&a.id, vec![change(file, 2, 1_700_000_000)])
            .await
            .unwrap();
        assert_eq!(pushed.results.len(), 1);
        assert_eq!(pushed.results[0].status, ChangeStatus::Success);

        let event = next_event(&mut fx.events).await;
        assert_eq!(event.event_type, SyncEventType::SyncCompleted);
        assert_eq!(event.changes_count, 1);
        assert_eq!(event.device_id, Some(a.id));
        assert_eq!(event.file_ids, vec![file]);

        let pulled = fx.log.pull(&b.id).await.unwrap();
        assert_eq!(pulled.changes.len(), 1);
        let entry = &pulled.changes[0];
        assert_eq!(entry.file_id, file);
        assert_eq!(entry.change_type, ChangeKind::Updated);
        assert_eq!(entry.file_path, "/notes/todo.md");
        assert_eq!(entry.file_size, 128);
        assert_eq!(entry.file_hash, "sha256:abc");
        assert_eq!(entry.version, 2);
        assert_eq!(
            entry.timestamp,
            Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap()
        );
        assert_eq!(entry.device_id, Some(a.id));
        assert!(!pulled.has_more);

        let own = fx.log.pull(&a.id).await.unwrap();
        assert!(own.changes.is_empty());
        assert!(own.sync_cursor.is_some());
    }

    #[tokio::test]
    async fn pull_without_changes_is_empty() {
        let fx = fixture().await;
        let d = device(&fx.registry, UserId::new(), "solo").await;
        let pulled = fx.log.pull(&d.id).await.unwrap();
        assert!(pulled.changes.is_empty());
        assert!(pulled.sync_cursor.is_none());
    }

    #[tokio::test]
    async fn push_from_unknown_or_inactive_device_fails_before_writing() {
        let fx = fixture().await;
        let user = UserId::new();
        let err = fx
            .log
            .push(&DeviceId::new(), vec![change(FileId::new(), 1, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));

        let gone = device(&fx.registry, user, "gone").await;
        fx.registry.deactivate(&gone.id).await.unwrap();
        let err = fx
            .log
            .push(&gone.id, vec![change(FileId::new(), 1, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Inactive(_)));

        let other = device(&fx.registry, user, "other").await;
        assert!(fx.log.pull(&other.id).await.unwrap().changes.is_empty());
        assert_eq!(fx.metrics.changes_appended.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn push_is_best_effort_per_entry() {
        let mut fx = fixture().await;
        let user = UserId::new();
        let a = device(&fx.registry, user, "a").await;
        let b = device(&fx.registry, user, "b").await;

        let mut bad_id = change(FileId::new(), 1, 10);
        bad_id.file_id = "not-a-uuid".to_string();
        let mut dup_first = change(FileId::new(), 1, 11);
        dup_first.change_id = Some("fixed-id".to_string());
        let mut dup_second = change(FileId::new(), 1, 12);
        dup_second.change_id = Some("fixed-id".to_string());
        let fine = change(FileId::new(), 1, 13);

        let response = fx
            .log
            .push(&a.id, vec![bad_id, dup_first, dup_second, fine])
            .await
            .unwrap();
        let statuses: Vec<_> = response.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                ChangeStatus::Failed,
                ChangeStatus::Success,
                ChangeStatus::Failed,
                ChangeStatus::Success
            ]
        );
        assert!(response.results[0].error.is_some());
        assert_eq!(response.results[1].change_id, "fixed-id");

        let event = next_event(&mut fx.events).await;
        assert_eq!(event.changes_count, 2);
        assert_eq!(event.metadata["failed"], 2);
        assert_eq!(fx.log.pull(&b.id).await.unwrap().changes.len(), 2);
        assert_eq!(fx.metrics.push_entry_failures.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn lower_version_from_same_device_fails_entry() {
        let fx = fixture().await;
        let user = UserId::new();
        let a = device(&fx.registry, user, "a").await;
        let b = device(&fx.registry, user, "b").await;
        let file = FileId::new();
        let other = FileId::new();

        let response = fx
            .log
            .push(
                &a.id,
                vec![
                    change(file, 5, 10),
                    change(file, 3, 11),
                    change(other, 1, 12),
                    change(file, 5, 13),
                ],
            )
            .await
            .unwrap();
        let statuses: Vec<_> = response.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                ChangeStatus::Success,
                ChangeStatus::Failed,
                ChangeStatus::Success,
                ChangeStatus::Success
            ]
        );
        let error = response.results[1].error.as_deref().unwrap();
        assert!(error.contains("below logged version 5"), "{error}");
        assert_eq!(fx.metrics.push_entry_failures.load(Ordering::Relaxed), 1);

        // The lineage is per device: another device may still log a lower version.
        let from_b = fx.log.push(&b.id, vec![change(file, 2, 20)]).await.unwrap();
        assert_eq!(from_b.results[0].status, ChangeStatus::Success);

        let pulled = fx.log.pull(&b.id).await.unwrap();
        let versions: Vec<_> = pulled.changes.iter().map(|c| c.version).collect();
        assert_eq!(versions, vec![5, 1, 5]);
    }

    #[tokio::test]
    async fn fully_failed_push_emits_sync_failed() {
        let mut fx = fixture().await;
        let a = device(&fx.registry, UserId::new(), "a").await;
        let mut bad = change(FileId::new(), 1, 1);
        bad.file_id = "x".to_string();

        fx.log.push(&a.id, vec![bad]).await.unwrap();
        assert_eq!(
            next_event(&mut fx.events).await.event_type,
            SyncEventType::SyncFailed
        );
    }

    #[tokio::test]
    async fn commit_cursor_advances_pull_and_counts() {
        let fx = fixture().await;
        let user = UserId::new();
        let a = device(&fx.registry, user, "a").await;
        let b = device(&fx.registry, user, "b").await;

        fx.log
            .push(&a.id, vec![change(FileId::new(), 1, 100)])
            .await
            .unwrap();
        let first = fx.log.pull(&b.id).await.unwrap();
        assert_eq!(first.changes.len(), 1);

        // Pull alone does not move the cursor.
        assert_eq!(fx.log.pull(&b.id).await.unwrap().changes.len(), 1);

        let state = fx
            .log
            .commit_cursor(
                &b.id,
                CommitCursorRequest {
                    sync_cursor: first.sync_cursor.clone().unwrap(),
                    files_synced: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(state.files_synced, 1);
        assert_eq!(state.pending_changes, 0);
        assert!(fx.registry.get(&b.id).await.unwrap().last_sync_at.is_some());

        assert!(fx.log.pull(&b.id).await.unwrap().changes.is_empty());

        fx.log
            .push(&a.id, vec![change(FileId::new(), 1, 200)])
            .await
            .unwrap();
        let second = fx.log.pull(&b.id).await.unwrap();
        assert_eq!(second.changes.len(), 1);
        assert_eq!(second.changes[0].timestamp.timestamp(), 200);

        let stored = fx.log.sync_state(&b.id).await.unwrap();
        assert_eq!(stored.sync_cursor, first.sync_cursor);
        assert_eq!(stored.files_synced, 1);
    }

    #[tokio::test]
    async fn commit_rejects_garbage_cursor() {
        let fx = fixture().await;
        let d = device(&fx.registry, UserId::new(), "d").await;
        let err = fx
            .log
            .commit_cursor(
                &d.id,
                CommitCursorRequest {
                    sync_cursor: "!!".to_string(),
                    files_synced: 0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidCursor));
    }

    #[tokio::test]
    async fn sync_state_defaults_to_empty() {
        let fx = fixture().await;
        let d = device(&fx.registry, UserId::new(), "d").await;
        let state = fx.log.sync_state(&d.id).await.unwrap();
        assert!(state.sync_cursor.is_none());
        assert_eq!(state.files_synced, 0);
        assert!(matches!(
            fx.log.sync_state(&DeviceId::new()).await,
            Err(SyncError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn divergent_versions_record_conflict_and_still_append() {
        let fx = fixture_with(Arc::new(DivergentVersion)).await;
        let user = UserId::new();
        let a = device(&fx.registry, user, "a").await;
        let b = device(&fx.registry, user, "b").await;
        let file = FileId::new();

        fx.log.push(&a.id, vec![change(file, 2, 10)]).await.unwrap();
        let response = fx.log.push(&b.id, vec![change(file, 2, 20)]).await.unwrap();
        let result = &response.results[0];
        assert_eq!(result.status, ChangeStatus::Conflict);

        let conflict = fx.conflicts.get(&result.conflict_id.unwrap()).await.unwrap();
        assert_eq!(conflict.device_a_id, a.id);
        assert_eq!(conflict.device_b_id, b.id);
        assert_eq!(conflict.conflict_type, "concurrent_edit");
        assert!(!conflict.resolved);

        // Recorded, not resolved: device A still sees B's entry.
        assert_eq!(fx.log.pull(&a.id).await.unwrap().changes.len(), 1);

        let newer = fx.log.push(&a.id, vec![change(file, 3, 30)]).await.unwrap();
        assert_eq!(newer.results[0].status, ChangeStatus::Success);
    }

    #[tokio::test]
    async fn upstream_entries_reach_every_device() {
        let mut fx = fixture().await;
        let user = UserId::new();
        let a = device(&fx.registry, user, "a").await;

        let entry = fx
            .log
            .append_upstream(FileChangeEvent {
                event_type: "FILE_UPLOADED".to_string(),
                file_id: FileId::new(),
                user_id: user,
                device_id: None,
                change_type: ChangeKind::Created,
                file_path: "/a.txt".to_string(),
                file_hash: String::new(),
                file_size: 1,
                version: 1,
                timestamp: Utc::now(),
                metadata: serde_json::Map::new(),
            })
            .await
            .unwrap();
        assert!(entry.device_id.is_none());

        let event = next_event(&mut fx.events).await;
        assert_eq!(event.metadata["source"], "file_event");
        assert_eq!(fx.log.pull(&a.id).await.unwrap().changes, vec![entry]);
    }
}
