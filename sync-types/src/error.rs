//! Error types for the sync service.

use thiserror::Error;

/// Errors surfaced by sync operations.
///
/// Request paths return `NotFound`, `InvalidIdentifier` and `Inactive`
/// directly to the caller. `DecodeFailure` and `PublishFailure` are
/// logged and swallowed by the event paths.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Device, conflict or entry absent.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
    },

    /// Malformed identifier string.
    #[error("invalid {kind}: {value:?}")]
    InvalidIdentifier {
        /// Which identifier field was malformed.
        kind: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Device is deactivated.
    #[error("device {0} is inactive")]
    Inactive(String),

    /// Event payload could not be decoded, even after fallback.
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// Store operation failed.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// Outbound event was not delivered.
    #[error("publish failure: {0}")]
    PublishFailure(String),

    /// Conflict was already resolved with a different resolution.
    #[error("conflict {id} already resolved as {resolution}")]
    AlreadyResolved {
        /// The conflict id.
        id: String,
        /// The resolution recorded earlier.
        resolution: String,
    },

    /// A device pushed a version below one it already logged for the file.
    #[error("version {incoming} of file {file_id} is below logged version {logged}")]
    VersionRegression {
        /// The file.
        file_id: String,
        /// Highest version the device already logged.
        logged: i32,
        /// The rejected version.
        incoming: i32,
    },

    /// Sync cursor token could not be decoded.
    #[error("invalid sync cursor")]
    InvalidCursor,

    /// Missing or rejected bearer credential.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),
}

impl SyncError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SyncError::not_found("device", "abc");
        assert_eq!(err.to_string(), "device not found: abc");
    }

    #[test]
    fn invalid_identifier_display_quotes_value() {
        let err = SyncError::InvalidIdentifier {
            kind: "user_id",
            value: "nope".to_string(),
        };
        assert_eq!(err.to_string(), "invalid user_id: \"nope\"");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncError>();
    }
}
