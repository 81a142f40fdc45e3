//! Configuration loading for sync-server.
//!
//! Configuration is loaded from a TOML file (default: `sync.toml`). Every
//! section and field is optional; missing values fall back to the defaults
//! below.

use filesync_sync_core::PolicyKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration for sync-server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Notification hub configuration.
    pub hub: HubConfig,
    /// Event pipeline configuration.
    pub events: EventsConfig,
    /// Bearer token configuration.
    pub auth: AuthConfig,
    /// Rate limiting configuration.
    pub limits: LimitsConfig,
    /// Conflict detection configuration.
    pub conflicts: ConflictsConfig,
    /// Log output configuration.
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP server (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// What a websocket session is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// Sessions authenticate with a user JWT; every tab of a user shares
    /// one identity.
    User,
    /// Sessions authenticate with a device sync credential.
    Device,
}

/// Notification hub configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Identity sessions are registered under (default: device).
    #[serde(default = "default_identity_mode")]
    pub identity_mode: IdentityMode,
    /// Outbound buffer per session (default: 256).
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,
    /// Capacity of each hub control channel (default: 1024).
    #[serde(default = "default_control_capacity")]
    pub control_capacity: usize,
}

/// Event pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Inbound topic carrying file-domain events.
    #[serde(default = "default_file_topic")]
    pub file_topic: String,
    /// Inbound topic carrying storage-domain events.
    #[serde(default = "default_storage_topic")]
    pub storage_topic: String,
    /// Outbound topic for sync lifecycle events.
    #[serde(default = "default_sync_topic")]
    pub sync_topic: String,
    /// Topic carrying user notifications for the hub.
    #[serde(default = "default_notifications_topic")]
    pub notifications_topic: String,
    /// Inbound queue capacity (default: 1024).
    #[serde(default = "default_channel_capacity")]
    pub inbound_capacity: usize,
    /// Outbound queue capacity (default: 1024).
    #[serde(default = "default_channel_capacity")]
    pub outbound_capacity: usize,
    /// Bearer token for `POST /v1/events/{topic}`. Ingest is disabled
    /// when unset.
    #[serde(default)]
    pub ingest_token: Option<String>,
}

/// Bearer token configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for user tokens. Base64 is decoded; anything else is
    /// used as raw bytes.
    #[serde(default)]
    pub jwt_secret: Option<String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Push/pull/commit requests per device per minute (default: 600).
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Requests per second across all clients (default: 1000).
    #[serde(default = "default_global_requests_per_second")]
    pub global_requests_per_second: u32,
    /// Websocket connects per identity per minute (default: 30).
    #[serde(default = "default_ws_connects_per_minute")]
    pub ws_connects_per_minute: u32,
    /// How often idle limiter keys are evicted, in seconds (default: 300).
    #[serde(default = "default_shrink_interval")]
    pub shrink_interval_secs: u64,
}

/// Conflict detection configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConflictsConfig {
    /// Detection policy applied on push (default: none).
    #[serde(default)]
    pub policy: PolicyKind,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Output format (default: pretty).
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("sync.db")
}

fn default_identity_mode() -> IdentityMode {
    IdentityMode::Device
}

fn default_session_buffer() -> usize {
    256
}

fn default_control_capacity() -> usize {
    1024
}

fn default_file_topic() -> String {
    "file.events".to_string()
}

fn default_storage_topic() -> String {
    "storage.events".to_string()
}

fn default_sync_topic() -> String {
    "sync.events".to_string()
}

fn default_notifications_topic() -> String {
    "sync-notifications".to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_requests_per_minute() -> u32 {
    600
}

fn default_global_requests_per_second() -> u32 {
    1000
}

fn default_ws_connects_per_minute() -> u32 {
    30
}

fn default_shrink_interval() -> u64 {
    300 // 5 minutes
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_filter() -> String {
    "filesync_sync_server=info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            identity_mode: default_identity_mode(),
            session_buffer: default_session_buffer(),
            control_capacity: default_control_capacity(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            file_topic: default_file_topic(),
            storage_topic: default_storage_topic(),
            sync_topic: default_sync_topic(),
            notifications_topic: default_notifications_topic(),
            inbound_capacity: default_channel_capacity(),
            outbound_capacity: default_channel_capacity(),
            ingest_token: None,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            global_requests_per_second: default_global_requests_per_second(),
            ws_connects_per_minute: default_ws_connects_per_minute(),
            shrink_interval_secs: default_shrink_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = [
            ("limits.requests_per_minute", self.limits.requests_per_minute as u64),
            (
                "limits.global_requests_per_second",
                self.limits.global_requests_per_second as u64,
            ),
            ("limits.ws_connects_per_minute", self.limits.ws_connects_per_minute as u64),
            ("limits.shrink_interval_secs", self.limits.shrink_interval_secs),
            ("hub.session_buffer", self.hub.session_buffer as u64),
            ("hub.control_capacity", self.hub.control_capacity as u64),
            ("events.inbound_capacity", self.events.inbound_capacity as u64),
            ("events.outbound_capacity", self.events.outbound_capacity as u64),
        ];
        if let Some((key, _)) = nonzero.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{key} must be > 0")));
        }

        if self.hub.identity_mode == IdentityMode::User
            && self.auth.jwt_secret.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::Invalid(
                "hub.identity_mode = \"user\" requires auth.jwt_secret".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Parsed values are unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
        assert_eq!(config.hub.session_buffer, 256);
        assert_eq!(config.hub.identity_mode, IdentityMode::Device);
        assert_eq!(config.events.notifications_topic, "sync-notifications");
        assert_eq!(config.conflicts.policy, PolicyKind::None);
        config.validate().unwrap();
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
bind_address = "127.0.0.1:5000"

[storage]
database = "/data/sync.db"

[hub]
identity_mode = "user"
session_buffer = 16

[auth]
jwt_secret = "c2VjcmV0"

[events]
file_topic = "files"
ingest_token = "bridge-secret"

[limits]
requests_per_minute = 5

[conflicts]
policy = "divergent-version"

[logging]
format = "json"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:5000");
        assert_eq!(config.storage.database, PathBuf::from("/data/sync.db"));
        assert_eq!(config.hub.identity_mode, IdentityMode::User);
        assert_eq!(config.hub.session_buffer, 16);
        assert_eq!(config.events.file_topic, "files");
        assert_eq!(config.events.storage_topic, "storage.events");
        assert_eq!(config.events.ingest_token.as_deref(), Some("bridge-secret"));
        assert_eq!(config.limits.requests_per_minute, 5);
        assert_eq!(config.conflicts.policy, PolicyKind::DivergentVersion);
        assert_eq!(config.logging.format, LogFormat::Json);
        config.validate().unwrap();
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.storage.database, PathBuf::from("sync.db"));
        assert_eq!(config.limits.shrink_interval_secs, 300);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.events.ingest_token.is_none());
    }

    #[test]
    fn user_mode_requires_secret() {
        let config: Config = toml::from_str("[hub]\nidentity_mode = \"user\"\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut config = Config::default();
        config.limits.global_requests_per_second = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("global_requests_per_second"));

        let mut config = Config::default();
        config.hub.session_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_and_validates_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind_address = \"127.0.0.1:9999\"").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:9999");

        assert!(matches!(
            Config::load(Path::new("/nonexistent/sync.toml")),
            Err(ConfigError::ReadError { .. })
        ));
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[hub]\nidentity_mode = \"tenant\"").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
