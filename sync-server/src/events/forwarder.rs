//! Outbound events to hub sessions.

use super::{EventMessage, EventSource};
use crate::config::{EventsConfig, IdentityMode};
use crate::hub::{HubHandle, Identity};
use crate::registry::DeviceRegistry;
use filesync_sync_types::{DeviceId, NotificationEvent, SyncEvent, UserId};
use tokio::sync::watch;

/// Reads the outbound queue and delivers each message to the sessions of
/// the affected user.
pub struct Forwarder<S> {
    source: S,
    hub: HubHandle,
    registry: DeviceRegistry,
    mode: IdentityMode,
    topics: EventsConfig,
}

impl<S> std::fmt::Debug for Forwarder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("mode", &self.mode)
            .field("sync_topic", &self.topics.sync_topic)
            .finish_non_exhaustive()
    }
}

impl<S: EventSource> Forwarder<S> {
    /// Create a forwarder.
    pub fn new(
        source: S,
        hub: HubHandle,
        registry: DeviceRegistry,
        mode: IdentityMode,
        topics: EventsConfig,
    ) -> Self {
        Self {
            source,
            hub,
            registry,
            mode,
            topics,
        }
    }

    /// Forward messages until shutdown or the source ends.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(mode = ?self.mode, "notification forwarder started");
        loop {
            let message = tokio::select! {
                _ = shutdown.changed() => break,
                message = self.source.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.forward(message).await;
        }
        tracing::info!("notification forwarder stopped");
    }

    /// Deliver one message. Returns the number of identities targeted.
    pub async fn forward(&self, message: EventMessage) -> usize {
        let (user_id, origin) = if message.topic == self.topics.sync_topic {
            match serde_json::from_slice::<SyncEvent>(&message.payload) {
                Ok(event) => (event.user_id, event.device_id),
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable sync event not forwarded");
                    return 0;
                }
            }
        } else if message.topic == self.topics.notifications_topic {
            let event = match serde_json::from_slice::<NotificationEvent>(&message.payload) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable notification dropped");
                    return 0;
                }
            };
            match UserId::parse(&event.user_id) {
                Ok(user_id) => (user_id, None),
                Err(e) => {
                    tracing::warn!(
                        notification_id = %event.notification_id,
                        error = %e,
                        "notification for invalid user dropped"
                    );
                    return 0;
                }
            }
        } else {
            tracing::debug!(topic = %message.topic, "outbound topic not forwarded");
            return 0;
        };

        let payload = match String::from_utf8(message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "non-UTF-8 payload not forwarded");
                return 0;
            }
        };

        let targets = self.targets(user_id, origin).await;
        for identity in &targets {
            if let Err(e) = self.hub.deliver(*identity, payload.clone()) {
                tracing::debug!(identity = %identity, error = %e, "hub delivery skipped");
            }
        }
        tracing::debug!(
            topic = %message.topic,
            user_id = %user_id,
            targets = targets.len(),
            "forwarded to hub"
        );
        targets.len()
    }

    async fn targets(&self, user_id: UserId, origin: Option<DeviceId>) -> Vec<Identity> {
        match self.mode {
            IdentityMode::User => vec![Identity::User(user_id)],
            IdentityMode::Device => match self.registry.list_for_user(&user_id).await {
                Ok(devices) => devices
                    .into_iter()
                    .filter(|d| d.is_active && Some(d.id) != origin)
                    .map(|d| Identity::Device(d.id))
                    .collect(),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "device lookup failed");
                    Vec::new()
                }
            },
        }
    }
}
