//! Event bridge: upstream file and storage events into the change log.

use super::{EventMessage, EventSource, SyncEventPublisher};
use crate::changelog::ChangeLog;
use crate::config::EventsConfig;
use crate::server::ServerMetrics;
use chrono::Utc;
use filesync_sync_core::{decode_file_event, decode_storage_event, normalize_file_event};
use filesync_sync_types::{ChangeLogEntry, SyncError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;

/// What the bridge did with one message.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeOutcome {
    /// A file event became a change-log entry.
    Appended(ChangeLogEntry),
    /// A storage event was decoded and logged.
    Observed,
    /// A notification was passed to the outbound queue.
    Forwarded,
    /// The message was malformed or could not be stored. Not retried.
    Dropped(String),
    /// The topic is not one the bridge consumes.
    Skipped,
}

/// Consumes inbound topics one message at a time.
pub struct EventBridge<S> {
    source: S,
    changes: ChangeLog,
    outbound: SyncEventPublisher,
    topics: EventsConfig,
    metrics: Arc<ServerMetrics>,
}

impl<S> std::fmt::Debug for EventBridge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBridge")
            .field("file_topic", &self.topics.file_topic)
            .field("storage_topic", &self.topics.storage_topic)
            .finish_non_exhaustive()
    }
}

impl<S: EventSource> EventBridge<S> {
    /// Create a bridge reading from `source`.
    pub fn new(
        source: S,
        changes: ChangeLog,
        outbound: SyncEventPublisher,
        topics: EventsConfig,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            source,
            changes,
            outbound,
            topics,
            metrics,
        }
    }

    /// Receive and handle messages until shutdown or the source ends.
    ///
    /// Shutdown only interrupts the wait for the next message; a message
    /// already received is handled to completion.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            file_topic = %self.topics.file_topic,
            storage_topic = %self.topics.storage_topic,
            "event bridge started"
        );
        loop {
            let message = tokio::select! {
                _ = shutdown.changed() => break,
                message = self.source.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.handle(message).await;
        }
        tracing::info!("event bridge stopped");
    }

    /// Handle a single message.
    pub async fn handle(&self, message: EventMessage) -> BridgeOutcome {
        let outcome = if message.topic == self.topics.file_topic {
            self.handle_file_event(&message.payload).await
        } else if message.topic == self.topics.storage_topic {
            self.handle_storage_event(&message.payload)
        } else if message.topic == self.topics.notifications_topic {
            self.outbound.relay(message).await;
            return BridgeOutcome::Forwarded;
        } else {
            tracing::warn!(topic = %message.topic, "message on unknown topic skipped");
            return BridgeOutcome::Skipped;
        };

        match &outcome {
            BridgeOutcome::Dropped(reason) => {
                self.metrics.events_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(topic = %message.topic, reason = %reason, "event dropped");
            }
            _ => {
                self.metrics.events_ingested.fetch_add(1, Ordering::Relaxed);
            }
        }
        outcome
    }

    async fn handle_file_event(&self, payload: &[u8]) -> BridgeOutcome {
        let decoded = match decode_file_event(payload) {
            Ok(decoded) => decoded,
            Err(e) => return BridgeOutcome::Dropped(e.to_string()),
        };
        if !decoded.is_typed() {
            tracing::debug!("file event decoded through field table");
        }

        let event = match normalize_file_event(decoded.into_file_event(), Utc::now()) {
            Ok(event) => event,
            Err(e) => return BridgeOutcome::Dropped(e.to_string()),
        };

        match self.changes.append_upstream(event).await {
            Ok(entry) => {
                tracing::info!(
                    file_id = %entry.file_id,
                    user_id = %entry.user_id,
                    change_type = entry.change_type.as_str(),
                    "file event appended to change log"
                );
                BridgeOutcome::Appended(entry)
            }
            Err(e @ SyncError::PersistenceFailure(_)) => {
                tracing::error!(error = %e, "file event not persisted");
                BridgeOutcome::Dropped(e.to_string())
            }
            Err(e) => BridgeOutcome::Dropped(e.to_string()),
        }
    }

    fn handle_storage_event(&self, payload: &[u8]) -> BridgeOutcome {
        match decode_storage_event(payload) {
            Ok(event) => {
                tracing::info!(
                    event_type = %event.event_type,
                    file_id = %event.file_id,
                    version = event.version,
                    bucket = %event.bucket,
                    "storage event observed"
                );
                BridgeOutcome::Observed
            }
            Err(e) => BridgeOutcome::Dropped(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflicts::ConflictLedger;
    use crate::events::{channel, ChannelSource};
    use crate::registry::DeviceRegistry;
    use crate::storage::{SqliteStorage, Storage};
    use filesync_sync_core::NoDetection;
    use filesync_sync_types::api::RegisterDeviceRequest;
    use filesync_sync_types::{ChangeKind, FileId, SyncEvent, UserId};
    use serde_json::json;

    struct Fixture {
        bridge: EventBridge<ChannelSource>,
        changes: ChangeLog,
        registry: DeviceRegistry,
        outbound: ChannelSource,
        metrics: Arc<ServerMetrics>,
    }

    async fn fixture() -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let metrics = Arc::new(ServerMetrics::default());
        let (out_sink, outbound) = channel(16);
        let publisher =
            SyncEventPublisher::new(Arc::new(out_sink), "sync.events".to_string(), metrics.clone());
        let registry = DeviceRegistry::new(storage.clone());
        let conflicts = ConflictLedger::new(storage.clone(), publisher.clone(), metrics.clone());
        let changes = ChangeLog::new(
            storage,
            registry.clone(),
            conflicts,
            Arc::new(NoDetection),
            publisher.clone(),
            metrics.clone(),
        );
        let (_in_sink, inbound) = channel(16);
        let bridge = EventBridge::new(
            inbound,
            changes.clone(),
            publisher,
            EventsConfig::default(),
            metrics.clone(),
        );
        Fixture {
            bridge,
            changes,
            registry,
            outbound,
            metrics,
        }
    }

    fn file_message(payload: serde_json::Value) -> EventMessage {
        EventMessage::new("file.events", payload.to_string())
    }

    #[tokio::test]
    async fn uploaded_event_appends_created_entry() {
        let mut fx = fixture().await;
        let user = UserId::new();
        let file = FileId::new();
        let device = fx
            .registry
            .register(RegisterDeviceRequest {
                user_id: user,
                device_name: "desk".to_string(),
                device_type: "desktop".to_string(),
                os: "linux".to_string(),
                os_version: "6".to_string(),
            })
            .await
            .unwrap();

        let outcome = fx
            .bridge
            .handle(file_message(json!({
                "event_type": "FILE_UPLOADED",
                "file_id": file.to_string(),
                "user_id": user.to_string(),
                "version": 1,
                "file_name": "report.pdf",
                "size": 2048,
                "hash": "sha256:ff",
            })))
            .await;
        let BridgeOutcome::Appended(entry) = outcome else {
            panic!("expected an appended entry, got {outcome:?}");
        };
        assert_eq!(entry.change_type, ChangeKind::Created);
        assert_eq!(entry.file_path, "report.pdf");
        assert_eq!(entry.file_size, 2048);
        assert!(entry.device_id.is_none());

        let pulled = fx.changes.pull(&device.id).await.unwrap();
        assert_eq!(pulled.changes, vec![entry]);

        let message = fx.outbound.recv().await.unwrap();
        let event: SyncEvent = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(event.user_id, user);
        assert_eq!(event.file_ids, vec![file]);
        assert_eq!(fx.metrics.events_ingested.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn camel_case_event_uses_field_table() {
        let fx = fixture().await;
        let outcome = fx
            .bridge
            .handle(file_message(json!({
                "eventType": "file.deleted",
                "fileId": FileId::new().to_string(),
                "userId": UserId::new().to_string(),
                "filePath": "/old.txt",
                "fileSize": "12",
                "createdAt": "2024-05-01T10:00:00Z",
            })))
            .await;
        let BridgeOutcome::Appended(entry) = outcome else {
            panic!("expected an appended entry, got {outcome:?}");
        };
        assert_eq!(entry.change_type, ChangeKind::Deleted);
        assert_eq!(entry.file_path, "/old.txt");
        assert_eq!(entry.file_size, 12);
        assert_eq!(entry.timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[tokio::test]
    async fn invalid_user_id_is_dropped_without_append() {
        let fx = fixture().await;
        let user = UserId::new();
        let outcome = fx
            .bridge
            .handle(file_message(json!({
                "event_type": "FILE_UPLOADED",
                "file_id": FileId::new().to_string(),
                "user_id": "not-a-user",
            })))
            .await;
        assert!(matches!(outcome, BridgeOutcome::Dropped(_)));
        assert_eq!(fx.metrics.events_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(fx.metrics.changes_appended.load(Ordering::Relaxed), 0);

        let device = fx
            .registry
            .register(RegisterDeviceRequest {
                user_id: user,
                device_name: "d".to_string(),
                device_type: "desktop".to_string(),
                os: "linux".to_string(),
                os_version: "6".to_string(),
            })
            .await
            .unwrap();
        assert!(fx.changes.pull(&device.id).await.unwrap().changes.is_empty());
    }

    #[tokio::test]
    async fn non_object_payload_is_dropped() {
        let fx = fixture().await;
        let outcome = fx
            .bridge
            .handle(EventMessage::new("file.events", "[1,2,3]"))
            .await;
        assert!(matches!(outcome, BridgeOutcome::Dropped(_)));
    }

    #[tokio::test]
    async fn storage_events_are_observed_only() {
        let fx = fixture().await;
        let payload = json!({
            "event_type": "STORAGE_WRITTEN",
            "file_id": FileId::new().to_string(),
            "version": 4,
            "storage_path": "objects/ab/cd",
            "bucket": "files",
            "size": 10,
            "hash": "sha256:00",
        });
        let outcome = fx
            .bridge
            .handle(EventMessage::new("storage.events", payload.to_string()))
            .await;
        assert_eq!(outcome, BridgeOutcome::Observed);
        assert_eq!(fx.metrics.changes_appended.load(Ordering::Relaxed), 0);

        let bad = fx
            .bridge
            .handle(EventMessage::new("storage.events", "{\"bucket\": 5}"))
            .await;
        assert!(matches!(bad, BridgeOutcome::Dropped(_)));
    }

    #[tokio::test]
    async fn notifications_pass_through_and_unknown_topics_skip() {
        let mut fx = fixture().await;
        let outcome = fx
            .bridge
            .handle(EventMessage::new("sync-notifications", "{\"userId\":\"x\"}"))
            .await;
        assert_eq!(outcome, BridgeOutcome::Forwarded);
        let relayed = fx.outbound.recv().await.unwrap();
        assert_eq!(relayed.topic, "sync-notifications");
        assert_eq!(relayed.payload, b"{\"userId\":\"x\"}".to_vec());

        let skipped = fx
            .bridge
            .handle(EventMessage::new("billing.events", "{}"))
            .await;
        assert_eq!(skipped, BridgeOutcome::Skipped);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let fx = fixture().await;
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(fx.bridge.run(rx));
        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
