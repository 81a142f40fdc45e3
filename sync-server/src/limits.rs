//! Rate limiting for sync-server.
//!
//! Three governor limiters:
//! - per device, for push/pull/cursor requests
//! - per websocket identity, for connection attempts
//! - one global limiter across all clients
//!
//! Keyed limiters are backed by DashMap and keyed by the 16 UUID bytes of
//! the device or identity.

use crate::config::LimitsConfig;
use crate::hub::Identity;
use filesync_sync_types::{DeviceId, SyncError};
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters for the HTTP and websocket surfaces.
#[derive(Clone)]
pub struct RateLimits {
    device_limiter: Arc<KeyedLimiter<[u8; 16]>>,
    connect_limiter: Arc<KeyedLimiter<[u8; 16]>>,
    global_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("device_keys", &self.device_limiter.len())
            .field("connect_keys", &self.connect_limiter.len())
            .finish_non_exhaustive()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// Zero values are rejected by [`Config::validate`](crate::config::Config::validate);
    /// here they are raised to one.
    pub fn new(config: &LimitsConfig) -> Self {
        let per_minute = |n: u32| Quota::per_minute(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN));
        let global = NonZeroU32::new(config.global_requests_per_second).unwrap_or(NonZeroU32::MIN);

        Self {
            device_limiter: Arc::new(RateLimiter::keyed(per_minute(config.requests_per_minute))),
            connect_limiter: Arc::new(RateLimiter::keyed(per_minute(
                config.ws_connects_per_minute,
            ))),
            global_limiter: Arc::new(RateLimiter::direct(Quota::per_second(global))),
        }
    }

    /// Check a sync request from `device`.
    pub fn check_device(&self, device: &DeviceId) -> Result<(), RateLimitError> {
        self.device_limiter
            .check_key(device.as_bytes())
            .map_err(|_| RateLimitError::DeviceLimitExceeded)
    }

    /// Check a websocket connection attempt for `identity`.
    pub fn check_connect(&self, identity: &Identity) -> Result<(), RateLimitError> {
        self.connect_limiter
            .check_key(&identity_key(identity))
            .map_err(|_| RateLimitError::ConnectLimitExceeded)
    }

    /// Check the server-wide request rate.
    pub fn check_global(&self) -> Result<(), RateLimitError> {
        self.global_limiter
            .check()
            .map_err(|_| RateLimitError::GlobalLimitExceeded)
    }

    /// Number of tracked keys across both keyed limiters.
    pub fn tracked_keys(&self) -> usize {
        self.device_limiter.len() + self.connect_limiter.len()
    }

    /// Evict keys whose limits have fully recharged.
    pub fn shrink(&self) {
        self.device_limiter.retain_recent();
        self.connect_limiter.retain_recent();
    }
}

fn identity_key(identity: &Identity) -> [u8; 16] {
    match identity {
        Identity::User(id) => *id.as_bytes(),
        Identity::Device(id) => *id.as_bytes(),
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Too many sync requests from this device.
    #[error("device rate limit exceeded")]
    DeviceLimitExceeded,
    /// Too many websocket connection attempts for this identity.
    #[error("connection rate limit exceeded")]
    ConnectLimitExceeded,
    /// Global request rate exceeded.
    #[error("global rate limit exceeded")]
    GlobalLimitExceeded,
}

impl From<RateLimitError> for SyncError {
    fn from(e: RateLimitError) -> Self {
        SyncError::RateLimited(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filesync_sync_types::UserId;

    fn config(per_minute: u32, connects: u32, global: u32) -> LimitsConfig {
        LimitsConfig {
            requests_per_minute: per_minute,
            global_requests_per_second: global,
            ws_connects_per_minute: connects,
            shrink_interval_secs: 300,
        }
    }

    #[test]
    fn device_limit_allows_within_quota() {
        let limits = RateLimits::new(&config(5, 100, 1000));
        let device = DeviceId::new();
        for _ in 0..5 {
            assert!(limits.check_device(&device).is_ok());
        }
        assert_eq!(
            limits.check_device(&device),
            Err(RateLimitError::DeviceLimitExceeded)
        );
    }

    #[test]
    fn devices_have_independent_limits() {
        let limits = RateLimits::new(&config(2, 100, 1000));
        let (a, b) = (DeviceId::new(), DeviceId::new());
        assert!(limits.check_device(&a).is_ok());
        assert!(limits.check_device(&a).is_ok());
        assert!(limits.check_device(&a).is_err());
        assert!(limits.check_device(&b).is_ok());
        assert_eq!(limits.tracked_keys(), 2);
    }

    #[test]
    fn connect_limit_per_identity() {
        let limits = RateLimits::new(&config(100, 1, 1000));
        let user = Identity::User(UserId::new());
        assert!(limits.check_connect(&user).is_ok());
        assert_eq!(
            limits.check_connect(&user),
            Err(RateLimitError::ConnectLimitExceeded)
        );
        assert!(limits
            .check_connect(&Identity::Device(DeviceId::new()))
            .is_ok());
    }

    #[test]
    fn global_limit_rejects_excess() {
        let limits = RateLimits::new(&config(100, 100, 3));
        for _ in 0..3 {
            assert!(limits.check_global().is_ok());
        }
        assert_eq!(
            limits.check_global(),
            Err(RateLimitError::GlobalLimitExceeded)
        );
    }

    #[test]
    fn rate_limit_maps_to_sync_error() {
        let err: SyncError = RateLimitError::DeviceLimitExceeded.into();
        assert!(matches!(err, SyncError::RateLimited(_)));
        assert_eq!(err.to_string(), "rate limit exceeded: device rate limit exceeded");
    }

    #[test]
    fn shrink_keeps_limiter_usable() {
        let limits = RateLimits::new(&config(10, 10, 1000));
        let _ = limits.check_device(&DeviceId::new());
        let _ = limits.check_connect(&Identity::User(UserId::new()));
        limits.shrink();
        assert!(limits.check_global().is_ok());
    }
}
