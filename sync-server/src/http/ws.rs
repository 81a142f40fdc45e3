//! `GET /ws/sync`: real-time session attached to the notification hub.

use super::auth::{authenticate_device, extract_bearer_token, UserTokenVerifier};
use crate::config::IdentityMode;
use crate::error::{Result, ServerError};
use crate::hub::Identity;
use crate::server::SyncServer;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Query;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Extension;
use filesync_sync_types::SyncError;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Bearer token, for clients that cannot set headers.
    #[serde(default)]
    pub token: Option<String>,
}

/// Authenticate and upgrade. The hub session is opened once the socket is
/// live.
pub async fn ws_handler(
    Extension(server): Extension<Arc<SyncServer>>,
    headers: HeaderMap,
    Query(params): Query<WsParams>,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response> {
    let token = match params.token.filter(|t| !t.trim().is_empty()) {
        Some(token) => token,
        None => extract_bearer_token(&headers)?.to_string(),
    };
    let identity = resolve_identity(&server, &token).await?;

    server.rate_limits().check_connect(&identity).map_err(|e| {
        server.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        ServerError::from(SyncError::from(e))
    })?;

    let ws = ws.ok_or_else(|| ServerError::BadRequest("websocket upgrade required".to_string()))?;
    Ok(ws.on_upgrade(move |socket| run_session(socket, server, identity)))
}

async fn resolve_identity(server: &SyncServer, token: &str) -> Result<Identity> {
    match server.config().hub.identity_mode {
        IdentityMode::User => {
            let secret = server.config().auth.jwt_secret.as_deref().ok_or_else(|| {
                SyncError::Unauthorized("user tokens are not configured".to_string())
            })?;
            let user_id = UserTokenVerifier::new(secret).verify(token)?;
            Ok(Identity::User(user_id))
        }
        IdentityMode::Device => {
            let device = authenticate_device(server, token).await?;
            Ok(Identity::Device(device.id))
        }
    }
}

/// Register with the hub and pump its payloads to the socket until either
/// side closes.
async fn run_session(mut socket: WebSocket, server: Arc<SyncServer>, identity: Identity) {
    let mut session = match server.hub().connect(identity).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(identity = %identity, error = %e, "hub unavailable, closing websocket");
            let _ = socket.close().await;
            return;
        }
    };
    let id = session.id();
    tracing::info!(identity = %identity, session_id = %id, "websocket session opened");
    let (mut sender, mut receiver) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(payload) = session.recv().await {
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let mut reader = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    server.hub().disconnect(id, identity).await;
    tracing::info!(identity = %identity, session_id = %id, "websocket session closed");
}
