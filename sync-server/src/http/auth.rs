//! Bearer credentials.
//!
//! Device routes present the device's sync credential. User-mode websocket
//! sessions present an HS256 JWT whose `sub` (or `user_id`) claim is the
//! user id.

use crate::server::SyncServer;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use filesync_sync_types::{Device, SyncError, UserId};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, SyncError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| SyncError::Unauthorized("missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| SyncError::Unauthorized("Authorization header is not valid UTF-8".to_string()))?;

    let (scheme, token) = header.split_once(' ').ok_or_else(|| {
        SyncError::Unauthorized("Authorization header must be `Bearer <token>`".to_string())
    })?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(SyncError::Unauthorized(
            "Authorization scheme must be `Bearer`".to_string(),
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(SyncError::Unauthorized("bearer token is empty".to_string()));
    }
    Ok(token)
}

/// Resolve the bearer sync credential to an active device.
///
/// Unknown credentials are reported as unauthorized rather than not found.
pub async fn authenticate_device(server: &SyncServer, token: &str) -> Result<Device, SyncError> {
    match server.registry().authenticate(token).await {
        Ok(device) => Ok(device),
        Err(SyncError::NotFound { .. }) => {
            Err(SyncError::Unauthorized("unknown sync credential".to_string()))
        }
        Err(e) => Err(e),
    }
}

/// Check the bearer token on an event ingest request against
/// `events.ingest_token`. Without a configured token ingest is refused.
pub fn authorize_ingest(server: &SyncServer, headers: &HeaderMap) -> Result<(), SyncError> {
    let expected = server
        .config()
        .events
        .ingest_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| SyncError::Unauthorized("event ingest is not enabled".to_string()))?;
    if extract_bearer_token(headers)? != expected {
        return Err(SyncError::Unauthorized("invalid ingest token".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct UserClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

/// Validates HS256 user tokens.
#[derive(Clone)]
pub struct UserTokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for UserTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserTokenVerifier").finish_non_exhaustive()
    }
}

impl UserTokenVerifier {
    /// Build a verifier. A base64 secret is decoded; anything else is used
    /// as raw bytes.
    pub fn new(secret: &str) -> Self {
        let bytes = STANDARD
            .decode(secret)
            .unwrap_or_else(|_| secret.as_bytes().to_vec());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        Self {
            key: DecodingKey::from_secret(&bytes),
            validation,
        }
    }

    /// Validate `token` and return the user it names.
    pub fn verify(&self, token: &str) -> Result<UserId, SyncError> {
        let decoded = decode::<UserClaims>(token, &self.key, &self.validation)
            .map_err(|e| SyncError::Unauthorized(format!("token validation failed: {e}")))?;
        let subject = decoded
            .claims
            .sub
            .or(decoded.claims.user_id)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| SyncError::Unauthorized("token has no user claim".to_string()))?;
        UserId::parse(&subject)
            .map_err(|_| SyncError::Unauthorized("token user claim is not a valid id".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token(secret: &[u8], claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    #[test]
    fn bearer_header_is_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc123");

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Bearer   "));
        assert!(extract_bearer_token(&headers).is_err());

        assert!(matches!(
            extract_bearer_token(&HeaderMap::new()),
            Err(SyncError::Unauthorized(_))
        ));
    }

    #[test]
    fn raw_secret_token_with_sub_claim() {
        let user = UserId::new();
        let verifier = UserTokenVerifier::new("not base64!");
        let token = token(b"not base64!", json!({ "sub": user.to_string() }));
        assert_eq!(verifier.verify(&token).unwrap(), user);
    }

    #[test]
    fn base64_secret_is_decoded() {
        let user = UserId::new();
        let raw = b"0123456789abcdef0123456789abcdef";
        let verifier = UserTokenVerifier::new(&STANDARD.encode(raw));
        let token = token(raw, json!({ "user_id": user.to_string() }));
        assert_eq!(verifier.verify(&token).unwrap(), user);
    }

    #[test]
    fn wrong_secret_or_claim_is_unauthorized() {
        let verifier = UserTokenVerifier::new("not base64!");
        let forged = token(b"other secret", json!({ "sub": UserId::new().to_string() }));
        assert!(matches!(
            verifier.verify(&forged),
            Err(SyncError::Unauthorized(_))
        ));

        let no_claim = token(b"not base64!", json!({ "role": "user" }));
        assert!(verifier.verify(&no_claim).is_err());

        let bad_id = token(b"not base64!", json!({ "sub": "alice" }));
        assert!(verifier.verify(&bad_id).is_err());
    }
}
