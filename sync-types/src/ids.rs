//! Identifier types.
//!
//! Every entity identifier is a UUID newtype so a device id can never be
//! passed where a user id is expected. Parsing failures surface as
//! [`SyncError::InvalidIdentifier`].

use crate::SyncError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Create an identifier from its 16 raw bytes.
            pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
                Uuid::from_slice(bytes).ok().map(Self)
            }

            /// Get the raw bytes of this identifier.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Parse from the canonical hyphenated (or simple) form.
            pub fn parse(s: &str) -> Result<Self, SyncError> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| SyncError::InvalidIdentifier {
                        kind: $label,
                        value: s.to_string(),
                    })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl FromStr for $name {
            type Err = SyncError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of the user owning devices, files and changes.
    UserId,
    "user_id"
);
uuid_id!(
    /// Server-assigned identifier of a registered device.
    DeviceId,
    "device_id"
);
uuid_id!(
    /// Identifier of a file tracked by the change log.
    FileId,
    "file_id"
);
uuid_id!(
    /// Identifier of a recorded sync conflict.
    ConflictId,
    "conflict_id"
);

/// Globally unique identifier of a change-log entry.
///
/// Clients may supply their own (any non-empty string); the server
/// generates a UUID v4 string otherwise.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(String);

impl ChangeId {
    /// Generate a fresh server-side change id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Use a client-supplied change id, or generate one if it is blank.
    pub fn from_client(value: Option<String>) -> Self {
        match value {
            Some(v) if !v.trim().is_empty() => Self(v),
            _ => Self::generate(),
        }
    }

    /// Get the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for ChangeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeId({})", self.0)
    }
}

/// Opaque sync credential issued to a device at registration.
///
/// 32 bytes of random data, displayed as URL-safe base64. The Debug
/// impl never prints the secret.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCredential(String);

impl SyncCredential {
    /// Issue a new random credential.
    pub fn issue() -> Self {
        let mut bytes = [0u8; 32];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wrap a credential presented by a client.
    pub fn from_presented(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SyncCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SyncCredential(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_roundtrip_bytes() {
        let original = DeviceId::new();
        let restored = DeviceId::from_bytes(original.as_bytes()).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn parse_accepts_canonical_form() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = FileId::parse("not-a-uuid").unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidIdentifier { kind: "file_id", .. }
        ));
    }

    #[test]
    fn from_bytes_invalid_length_fails() {
        assert!(ConflictId::from_bytes(&[0u8; 15]).is_none());
        assert!(ConflictId::from_bytes(&[0u8; 32]).is_none());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn change_id_keeps_client_value() {
        let id = ChangeId::from_client(Some("client-42".to_string()));
        assert_eq!(id.as_str(), "client-42");
    }

    #[test]
    fn change_id_generated_when_blank() {
        let id = ChangeId::from_client(Some("   ".to_string()));
        assert!(Uuid::parse_str(id.as_str()).is_ok());
        let id = ChangeId::from_client(None);
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn credentials_are_unique_and_base64() {
        let a = SyncCredential::issue();
        let b = SyncCredential::issue();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 43); // 32 bytes = 43 base64 chars (no padding)
    }

    #[test]
    fn credential_debug_hides_secret() {
        let c = SyncCredential::issue();
        assert!(!format!("{:?}", c).contains(c.as_str()));
    }
}
