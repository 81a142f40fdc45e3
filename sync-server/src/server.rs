//! Server wiring.
//!
//! [`SyncServer`] owns the request-path services shared by HTTP handlers.
//! [`BackgroundTasks`] holds the long-running loops (hub, bridge,
//! forwarder) until the binary spawns them.

use crate::changelog::ChangeLog;
use crate::config::Config;
use crate::conflicts::ConflictLedger;
use crate::events::{
    channel, ChannelSink, ChannelSource, EventBridge, EventMessage, EventSink, Forwarder,
    SyncEventPublisher,
};
use crate::hub::{Hub, HubHandle};
use crate::limits::RateLimits;
use crate::registry::DeviceRegistry;
use crate::storage::Storage;
use filesync_sync_types::SyncError;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Operational counters, monotonic since startup.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    /// Push requests accepted.
    pub pushes_total: AtomicU64,
    /// Pull requests served.
    pub pulls_total: AtomicU64,
    /// Cursor commits.
    pub commits_total: AtomicU64,
    /// Entries appended to the change log (push and upstream).
    pub changes_appended: AtomicU64,
    /// Pushed entries that were rejected or not persisted.
    pub push_entry_failures: AtomicU64,
    /// Conflicts registered.
    pub conflicts_detected: AtomicU64,
    /// Inbound events handled.
    pub events_ingested: AtomicU64,
    /// Inbound events dropped as malformed or unstorable.
    pub events_dropped: AtomicU64,
    /// Outbound events that could not be queued.
    pub publish_failures: AtomicU64,
    /// Requests rejected by a rate limiter.
    pub rate_limit_hits: AtomicU64,
}

/// Request-path state shared by all handlers.
pub struct SyncServer {
    config: Config,
    registry: DeviceRegistry,
    changes: ChangeLog,
    conflicts: ConflictLedger,
    hub: HubHandle,
    inbound: ChannelSink,
    store: Arc<dyn Storage>,
    rate_limits: RateLimits,
    metrics: Arc<ServerMetrics>,
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

/// Long-running loops created alongside the server.
pub struct BackgroundTasks {
    hub: Hub,
    bridge: EventBridge<ChannelSource>,
    forwarder: Forwarder<ChannelSource>,
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks")
            .field("hub", &self.hub)
            .field("bridge", &self.bridge)
            .field("forwarder", &self.forwarder)
            .finish()
    }
}

impl BackgroundTasks {
    /// Spawn the hub, bridge and forwarder. Each stops when `shutdown`
    /// changes.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.hub.run(shutdown.clone())),
            tokio::spawn(self.bridge.run(shutdown.clone())),
            tokio::spawn(self.forwarder.run(shutdown)),
        ]
    }
}

impl SyncServer {
    /// Wire services, queues and background loops over `storage`.
    pub fn new(config: Config, storage: Arc<dyn Storage>) -> (Arc<Self>, BackgroundTasks) {
        let metrics = Arc::new(ServerMetrics::default());
        let (outbound_sink, outbound_source) = channel(config.events.outbound_capacity.max(1));
        let (inbound_sink, inbound_source) = channel(config.events.inbound_capacity.max(1));

        let publisher = SyncEventPublisher::new(
            Arc::new(outbound_sink),
            config.events.sync_topic.clone(),
            metrics.clone(),
        );
        let registry = DeviceRegistry::new(storage.clone());
        let conflicts = ConflictLedger::new(storage.clone(), publisher.clone(), metrics.clone());
        let policy = config.conflicts.policy.build();
        tracing::info!(policy = policy.name(), "conflict detection policy");
        let changes = ChangeLog::new(
            storage.clone(),
            registry.clone(),
            conflicts.clone(),
            policy,
            publisher.clone(),
            metrics.clone(),
        );

        let (hub, hub_handle) = Hub::new(&config.hub);
        let bridge = EventBridge::new(
            inbound_source,
            changes.clone(),
            publisher,
            config.events.clone(),
            metrics.clone(),
        );
        let forwarder = Forwarder::new(
            outbound_source,
            hub_handle.clone(),
            registry.clone(),
            config.hub.identity_mode,
            config.events.clone(),
        );

        let server = Arc::new(Self {
            rate_limits: RateLimits::new(&config.limits),
            config,
            registry,
            changes,
            conflicts,
            hub: hub_handle,
            inbound: inbound_sink,
            store: storage,
            metrics,
        });
        let tasks = BackgroundTasks {
            hub,
            bridge,
            forwarder,
        };
        (server, tasks)
    }

    /// Server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Device registry.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Change log and cursor sync.
    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    /// Conflict ledger.
    pub fn conflicts(&self) -> &ConflictLedger {
        &self.conflicts
    }

    /// Notification hub handle.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Operational counters.
    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    /// Whether the backing store answers a round trip.
    pub async fn storage_reachable(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "storage ping failed");
                false
            }
        }
    }

    /// Whether the event bridge is still consuming the inbound queue.
    pub fn bridge_running(&self) -> bool {
        !self.inbound.is_closed()
    }

    /// Queue an upstream event for the bridge. Fails with
    /// [`SyncError::PublishFailure`] when the inbound queue is full.
    pub async fn ingest(&self, topic: &str, payload: Vec<u8>) -> Result<(), SyncError> {
        self.inbound.publish(EventMessage::new(topic, payload)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use std::time::Duration;

    async fn test_server(config: Config) -> (Arc<SyncServer>, BackgroundTasks) {
        let storage = SqliteStorage::in_memory().await.unwrap();
        SyncServer::new(config, Arc::new(storage))
    }

    #[tokio::test]
    async fn background_tasks_stop_on_shutdown() {
        let (_server, tasks) = test_server(Config::default()).await;
        let (tx, rx) = watch::channel(false);
        let handles = tasks.spawn(rx);
        assert_eq!(handles.len(), 3);

        tx.send(true).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("task should stop")
                .expect("task should not panic");
        }
    }

    #[tokio::test]
    async fn ingest_reports_full_queue() {
        let mut config = Config::default();
        config.events.inbound_capacity = 1;
        let (server, _tasks) = test_server(config).await;

        server.ingest("file.events", b"{}".to_vec()).await.unwrap();
        let err = server
            .ingest("file.events", b"{}".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::PublishFailure(_)));
    }

    #[tokio::test]
    async fn metrics_start_at_zero() {
        let (server, _tasks) = test_server(Config::default()).await;
        let debug = format!("{:?}", server.metrics());
        assert!(debug.contains("pushes_total: 0"));
        assert_eq!(server.hub().stats().sessions, 0);
    }
}
