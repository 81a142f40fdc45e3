//! Device registry: identity and credential issuance for sync clients.

use crate::storage::Storage;
use chrono::{DateTime, Utc};
use filesync_sync_types::api::RegisterDeviceRequest;
use filesync_sync_types::{log_precision, Device, DeviceId, SyncCredential, SyncError, UserId};
use std::sync::Arc;

/// Registers devices and authenticates their credentials.
#[derive(Clone)]
pub struct DeviceRegistry {
    store: Arc<dyn Storage>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry").finish_non_exhaustive()
    }
}

impl DeviceRegistry {
    /// Create a registry over `store`.
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self { store }
    }

    /// Register a device with a fresh credential.
    pub async fn register(&self, req: RegisterDeviceRequest) -> Result<Device, SyncError> {
        let device = Device {
            id: DeviceId::new(),
            user_id: req.user_id,
            device_name: req.device_name,
            device_type: req.device_type,
            os: req.os,
            os_version: req.os_version,
            sync_token: SyncCredential::issue(),
            last_sync_at: None,
            is_active: true,
            registered_at: log_precision(Utc::now()),
        };

        self.store.insert_device(&device).await.map_err(|e| {
            tracing::error!(user_id = %device.user_id, error = %e, "device registration failed");
            SyncError::from(e)
        })?;

        tracing::info!(
            device_id = %device.id,
            user_id = %device.user_id,
            device_type = %device.device_type,
            "registered device"
        );
        Ok(device)
    }

    /// Resolve a presented credential to an active device.
    pub async fn authenticate(&self, credential: &str) -> Result<Device, SyncError> {
        let device = self
            .store
            .get_device_by_token(credential)
            .await?
            .ok_or_else(|| SyncError::not_found("device", "<credential>"))?;
        ensure_active(device)
    }

    /// Get a device by id.
    pub async fn get(&self, id: &DeviceId) -> Result<Device, SyncError> {
        self.store
            .get_device(id)
            .await?
            .ok_or_else(|| SyncError::not_found("device", id))
    }

    /// Get a device by id, failing if it is deactivated.
    pub async fn get_active(&self, id: &DeviceId) -> Result<Device, SyncError> {
        ensure_active(self.get(id).await?)
    }

    /// All devices of a user.
    pub async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Device>, SyncError> {
        Ok(self.store.list_devices(user_id).await?)
    }

    /// Mark a device inactive. Its credential stops authenticating.
    pub async fn deactivate(&self, id: &DeviceId) -> Result<(), SyncError> {
        if !self.store.set_device_active(id, false).await? {
            return Err(SyncError::not_found("device", id));
        }
        tracing::info!(device_id = %id, "deactivated device");
        Ok(())
    }

    /// Record the time of a completed sync.
    pub async fn touch_last_sync(&self, id: &DeviceId, at: DateTime<Utc>) -> Result<(), SyncError> {
        if !self.store.set_last_sync(id, at).await? {
            return Err(SyncError::not_found("device", id));
        }
        Ok(())
    }
}

fn ensure_active(device: Device) -> Result<Device, SyncError> {
    if device.is_active {
        Ok(device)
    } else {
        Err(SyncError::Inactive(device.id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    async fn registry() -> DeviceRegistry {
        let storage = SqliteStorage::in_memory().await.unwrap();
        DeviceRegistry::new(Arc::new(storage))
    }

    fn request(user_id: UserId, name: &str) -> RegisterDeviceRequest {
        RegisterDeviceRequest {
            user_id,
            device_name: name.to_string(),
            device_type: "desktop".to_string(),
            os: "linux".to_string(),
            os_version: "6.8".to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let registry = registry().await;
        let user = UserId::new();
        let device = registry.register(request(user, "laptop")).await.unwrap();
        assert!(device.is_active);
        assert!(device.last_sync_at.is_none());

        let authed = registry
            .authenticate(device.sync_token.as_str())
            .await
            .unwrap();
        assert_eq!(authed.id, device.id);
        assert_eq!(authed.user_id, user);
    }

    #[tokio::test]
    async fn credentials_are_unique() {
        let registry = registry().await;
        let user = UserId::new();
        let a = registry.register(request(user, "a")).await.unwrap();
        let b = registry.register(request(user, "b")).await.unwrap();
        assert_ne!(a.sync_token, b.sync_token);
        assert_eq!(registry.list_for_user(&user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_credential_is_not_found() {
        let registry = registry().await;
        let err = registry.authenticate("bogus").await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { entity: "device", .. }));
    }

    #[tokio::test]
    async fn deactivated_device_cannot_authenticate() {
        let registry = registry().await;
        let device = registry
            .register(request(UserId::new(), "phone"))
            .await
            .unwrap();
        registry.deactivate(&device.id).await.unwrap();

        let err = registry
            .authenticate(device.sync_token.as_str())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Inactive(_)));
        assert!(matches!(
            registry.get_active(&device.id).await,
            Err(SyncError::Inactive(_))
        ));
        // Still visible by id.
        assert!(!registry.get(&device.id).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn missing_device_operations_are_not_found() {
        let registry = registry().await;
        let id = DeviceId::new();
        assert!(matches!(
            registry.deactivate(&id).await,
            Err(SyncError::NotFound { .. })
        ));
        assert!(matches!(
            registry.touch_last_sync(&id, Utc::now()).await,
            Err(SyncError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn touch_last_sync_updates_device() {
        let registry = registry().await;
        let device = registry
            .register(request(UserId::new(), "tablet"))
            .await
            .unwrap();
        let at = log_precision(Utc::now());
        registry.touch_last_sync(&device.id, at).await.unwrap();
        assert_eq!(registry.get(&device.id).await.unwrap().last_sync_at, Some(at));
    }
}
