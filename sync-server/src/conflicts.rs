//! Conflict ledger: records and resolves divergent edits.
//!
//! The ledger never decides anything about file contents. Detection is a
//! caller concern (see [`filesync_sync_core::ConflictPolicy`]); resolution
//! is the client's choice, recorded here once.

use crate::events::SyncEventPublisher;
use crate::server::ServerMetrics;
use crate::storage::Storage;
use chrono::Utc;
use filesync_sync_core::ConflictCandidate;
use filesync_sync_types::api::RegisterConflictRequest;
use filesync_sync_types::{
    log_precision, ConflictId, DeviceId, FileId, ResolutionType, SyncConflict, SyncError,
    SyncEvent, SyncEventType, UserId,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Records conflicts and their resolutions.
#[derive(Clone)]
pub struct ConflictLedger {
    store: Arc<dyn Storage>,
    publisher: SyncEventPublisher,
    metrics: Arc<ServerMetrics>,
}

impl std::fmt::Debug for ConflictLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictLedger")
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

impl ConflictLedger {
    /// Create a ledger.
    pub fn new(
        store: Arc<dyn Storage>,
        publisher: SyncEventPublisher,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            store,
            publisher,
            metrics,
        }
    }

    /// Persist a new unresolved conflict and announce it.
    pub async fn register(&self, req: RegisterConflictRequest) -> Result<SyncConflict, SyncError> {
        if req.device_a_id == req.device_b_id {
            return Err(SyncError::InvalidIdentifier {
                kind: "device_b_id",
                value: req.device_b_id.to_string(),
            });
        }

        let conflict = SyncConflict {
            id: ConflictId::new(),
            file_id: req.file_id,
            user_id: req.user_id,
            conflict_type: req.conflict_type,
            device_a_id: req.device_a_id,
            device_b_id: req.device_b_id,
            version_a: req.version_a,
            version_b: req.version_b,
            resolved: false,
            resolution_type: None,
            conflict_file_id: None,
            created_at: log_precision(Utc::now()),
            resolved_at: None,
        };

        self.store.insert_conflict(&conflict).await.map_err(|e| {
            tracing::error!(file_id = %conflict.file_id, error = %e, "conflict insert failed");
            SyncError::from(e)
        })?;
        self.metrics.conflicts_detected.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            conflict_id = %conflict.id,
            file_id = %conflict.file_id,
            conflict_type = %conflict.conflict_type,
            "conflict registered"
        );

        let event = SyncEvent::new(
            SyncEventType::ConflictDetected,
            conflict.user_id,
            Some(conflict.device_b_id),
        )
        .with_files(vec![conflict.file_id])
        .with_counts(0, 1)
        .with_meta("conflict_id", conflict.id.to_string())
        .with_meta("conflict_type", conflict.conflict_type.clone());
        self.publisher.publish(&event).await;

        Ok(conflict)
    }

    /// Register a conflict produced by a detection policy.
    pub async fn record(&self, candidate: ConflictCandidate) -> Result<SyncConflict, SyncError> {
        self.register(RegisterConflictRequest {
            file_id: candidate.file_id,
            user_id: candidate.user_id,
            conflict_type: candidate.conflict_type,
            device_a_id: candidate.device_a,
            device_b_id: candidate.device_b,
            version_a: candidate.version_a,
            version_b: candidate.version_b,
        })
        .await
    }

    /// Resolve a conflict.
    ///
    /// Resolving again with the same resolution type returns the stored
    /// record unchanged. A different type fails with
    /// [`SyncError::AlreadyResolved`]. Concurrent resolves race on a
    /// conditional update; only the winner publishes `conflict.resolved`.
    pub async fn resolve(
        &self,
        id: &ConflictId,
        resolution: ResolutionType,
        conflict_file_id: Option<FileId>,
    ) -> Result<SyncConflict, SyncError> {
        let mut conflict = self.get(id).await?;
        if conflict.resolved {
            return settled(conflict, &resolution);
        }

        conflict.resolved = true;
        conflict.resolution_type = Some(resolution.clone());
        conflict.conflict_file_id = conflict_file_id;
        conflict.resolved_at = Some(log_precision(Utc::now()));

        if !self.store.resolve_conflict(&conflict).await? {
            // Lost the race, or the row vanished.
            tracing::debug!(conflict_id = %id, "conflict resolved concurrently");
            return settled(self.get(id).await?, &resolution);
        }

        tracing::info!(
            conflict_id = %id,
            resolution = resolution.as_str(),
            "conflict resolved"
        );

        let event = SyncEvent::new(SyncEventType::ConflictResolved, conflict.user_id, None)
            .with_files(vec![conflict.file_id])
            .with_counts(0, 1)
            .with_meta("conflict_id", conflict.id.to_string())
            .with_meta("resolution_type", resolution.to_string());
        self.publisher.publish(&event).await;

        Ok(conflict)
    }

    /// Get a conflict by id.
    pub async fn get(&self, id: &ConflictId) -> Result<SyncConflict, SyncError> {
        self.store
            .get_conflict(id)
            .await?
            .ok_or_else(|| SyncError::not_found("conflict", id))
    }

    /// Conflicts of a user, newest first.
    pub async fn list(
        &self,
        user_id: &UserId,
        unresolved_only: bool,
    ) -> Result<Vec<SyncConflict>, SyncError> {
        Ok(self.store.list_conflicts(user_id, unresolved_only).await?)
    }

    /// Pending conflicts involving a device.
    pub async fn pending_for_device(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
    ) -> Result<Vec<SyncConflict>, SyncError> {
        let conflicts = self.list(user_id, true).await?;
        Ok(conflicts
            .into_iter()
            .filter(|c| c.device_a_id == *device_id || c.device_b_id == *device_id)
            .collect())
    }
}

/// Outcome of resolving an already-resolved conflict with `resolution`.
fn settled(conflict: SyncConflict, resolution: &ResolutionType) -> Result<SyncConflict, SyncError> {
    if conflict.resolution_type.as_ref() == Some(resolution) {
        tracing::debug!(conflict_id = %conflict.id, "conflict already resolved identically");
        return Ok(conflict);
    }
    Err(SyncError::AlreadyResolved {
        id: conflict.id.to_string(),
        resolution: conflict
            .resolution_type
            .map(|r| r.to_string())
            .unwrap_or_default(),
    })
}
