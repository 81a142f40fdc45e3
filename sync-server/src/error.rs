//! Error types for sync-server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use filesync_sync_types::api::ErrorBody;
use filesync_sync_types::SyncError;

/// Top-level error type for sync-server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Domain error from a sync operation.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Malformed request (body, query or path).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A bounded queue refused the request.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Sync(e) => sync_status(e),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) | Self::Storage(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn sync_status(e: &SyncError) -> StatusCode {
    match e {
        SyncError::NotFound { .. } => StatusCode::NOT_FOUND,
        SyncError::InvalidIdentifier { .. }
        | SyncError::DecodeFailure(_)
        | SyncError::InvalidCursor => StatusCode::BAD_REQUEST,
        SyncError::Inactive(_) => StatusCode::FORBIDDEN,
        SyncError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        SyncError::AlreadyResolved { .. } | SyncError::VersionRegression { .. } => {
            StatusCode::CONFLICT
        }
        SyncError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        SyncError::PersistenceFailure(_) | SyncError::PublishFailure(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored column could not be decoded back into its domain type.
    #[error("corrupt {column} in {table}: {value}")]
    Corrupt {
        /// Table the row came from.
        table: &'static str,
        /// Offending column.
        column: &'static str,
        /// Hex or textual rendering of the stored value.
        value: String,
    },

    /// Metadata payload could not be (de)serialized.
    #[error("metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl StorageError {
    pub(crate) fn corrupt_bytes(table: &'static str, column: &'static str, raw: &[u8]) -> Self {
        Self::Corrupt {
            table,
            column,
            value: hex::encode(raw),
        }
    }
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        SyncError::PersistenceFailure(e.to_string())
    }
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_http_status() {
        let cases = [
            (SyncError::not_found("device", "x"), StatusCode::NOT_FOUND),
            (
                SyncError::InvalidIdentifier {
                    kind: "user_id",
                    value: "x".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (SyncError::Inactive("d".into()), StatusCode::FORBIDDEN),
            (SyncError::InvalidCursor, StatusCode::BAD_REQUEST),
            (SyncError::Unauthorized("no".into()), StatusCode::UNAUTHORIZED),
            (SyncError::RateLimited("slow".into()), StatusCode::TOO_MANY_REQUESTS),
            (
                SyncError::AlreadyResolved {
                    id: "c".into(),
                    resolution: "keep_a".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                SyncError::PersistenceFailure("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status(), status);
        }
    }

    #[test]
    fn corrupt_bytes_renders_hex() {
        let err = StorageError::corrupt_bytes("devices", "id", &[0xde, 0xad]);
        assert_eq!(err.to_string(), "corrupt id in devices: dead");
    }

    #[test]
    fn storage_error_becomes_persistence_failure() {
        let err: SyncError = StorageError::corrupt_bytes("t", "c", &[1]).into();
        assert!(matches!(err, SyncError::PersistenceFailure(_)));
    }

    #[test]
    fn unavailable_is_503() {
        assert_eq!(
            ServerError::Unavailable("queue full".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
