//! `/v1` JSON endpoints.

use super::auth::{authenticate_device, authorize_ingest, extract_bearer_token};
use crate::error::{Result, ServerError};
use crate::server::SyncServer;
use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use filesync_sync_types::api::{
    CommitCursorRequest, ConflictQuery, PullResponse, PushRequest, PushResponse,
    RegisterConflictRequest, RegisterDeviceRequest, RegisterDeviceResponse,
    ResolveConflictRequest,
};
use filesync_sync_types::{
    ConflictId, Device, DeviceId, SyncConflict, SyncError, SyncState, UserId,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn check_global(server: &SyncServer) -> Result<()> {
    server.rate_limits().check_global().map_err(|e| {
        server.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        ServerError::from(SyncError::from(e))
    })
}

/// Authenticate the bearer device and apply its rate limits.
async fn sync_device(server: &SyncServer, headers: &HeaderMap) -> Result<Device> {
    check_global(server)?;
    let token = extract_bearer_token(headers)?;
    let device = authenticate_device(server, token).await?;
    server.rate_limits().check_device(&device.id).map_err(|e| {
        server.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(device_id = %device.id, "device rate limited");
        ServerError::from(SyncError::from(e))
    })?;
    Ok(device)
}

/// `POST /v1/devices`
pub async fn register_device(
    Extension(server): Extension<Arc<SyncServer>>,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<(StatusCode, Json<RegisterDeviceResponse>)> {
    check_global(&server)?;
    if req.device_name.trim().is_empty() {
        return Err(ServerError::BadRequest("device_name is required".to_string()));
    }
    let device = server.registry().register(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterDeviceResponse {
            device_id: device.id,
            sync_token: device.sync_token.as_str().to_string(),
            registered_at: device.registered_at,
        }),
    ))
}

/// `DELETE /v1/devices/{id}`: a device may deactivate itself or another
/// device of the same user.
pub async fn deactivate_device(
    Extension(server): Extension<Arc<SyncServer>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let caller = sync_device(&server, &headers).await?;
    let target = server.registry().get(&DeviceId::parse(&id)?).await?;
    if target.user_id != caller.user_id {
        return Err(SyncError::not_found("device", target.id).into());
    }
    server.registry().deactivate(&target.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /v1/users/{id}/devices`
pub async fn list_devices(
    Extension(server): Extension<Arc<SyncServer>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Device>>> {
    check_global(&server)?;
    let user_id = UserId::parse(&user_id)?;
    Ok(Json(server.registry().list_for_user(&user_id).await?))
}

/// `POST /v1/sync/push`
pub async fn push(
    Extension(server): Extension<Arc<SyncServer>>,
    headers: HeaderMap,
    Json(req): Json<PushRequest>,
) -> Result<Json<PushResponse>> {
    let device = sync_device(&server, &headers).await?;
    Ok(Json(server.changes().push(&device.id, req.changes).await?))
}

/// `GET /v1/sync/pull`
pub async fn pull(
    Extension(server): Extension<Arc<SyncServer>>,
    headers: HeaderMap,
) -> Result<Json<PullResponse>> {
    let device = sync_device(&server, &headers).await?;
    Ok(Json(server.changes().pull(&device.id).await?))
}

/// `POST /v1/sync/cursor`
pub async fn commit_cursor(
    Extension(server): Extension<Arc<SyncServer>>,
    headers: HeaderMap,
    Json(req): Json<CommitCursorRequest>,
) -> Result<Json<SyncState>> {
    let device = sync_device(&server, &headers).await?;
    Ok(Json(server.changes().commit_cursor(&device.id, req).await?))
}

/// `GET /v1/sync/state`
pub async fn sync_state(
    Extension(server): Extension<Arc<SyncServer>>,
    headers: HeaderMap,
) -> Result<Json<SyncState>> {
    let device = sync_device(&server, &headers).await?;
    Ok(Json(server.changes().sync_state(&device.id).await?))
}

/// `POST /v1/conflicts`
pub async fn register_conflict(
    Extension(server): Extension<Arc<SyncServer>>,
    Json(req): Json<RegisterConflictRequest>,
) -> Result<(StatusCode, Json<SyncConflict>)> {
    check_global(&server)?;
    let conflict = server.conflicts().register(req).await?;
    Ok((StatusCode::CREATED, Json(conflict)))
}

/// `GET /v1/conflicts/{id}`
pub async fn get_conflict(
    Extension(server): Extension<Arc<SyncServer>>,
    Path(id): Path<String>,
) -> Result<Json<SyncConflict>> {
    check_global(&server)?;
    let id = ConflictId::parse(&id)?;
    Ok(Json(server.conflicts().get(&id).await?))
}

/// `GET /v1/users/{id}/conflicts?unresolved=true`
pub async fn list_conflicts(
    Extension(server): Extension<Arc<SyncServer>>,
    Path(user_id): Path<String>,
    Query(query): Query<ConflictQuery>,
) -> Result<Json<Vec<SyncConflict>>> {
    check_global(&server)?;
    let user_id = UserId::parse(&user_id)?;
    Ok(Json(
        server.conflicts().list(&user_id, query.unresolved).await?,
    ))
}

/// `POST /v1/conflicts/{id}/resolve`
pub async fn resolve_conflict(
    Extension(server): Extension<Arc<SyncServer>>,
    Path(id): Path<String>,
    Json(req): Json<ResolveConflictRequest>,
) -> Result<Json<SyncConflict>> {
    check_global(&server)?;
    let id = ConflictId::parse(&id)?;
    let conflict = server
        .conflicts()
        .resolve(&id, req.resolution_type, req.conflict_file_id)
        .await?;
    Ok(Json(conflict))
}

/// `POST /v1/events/{topic}`: queue a raw upstream event for the bridge.
///
/// Requires the configured `events.ingest_token` as a bearer token.
pub async fn ingest_event(
    Extension(server): Extension<Arc<SyncServer>>,
    Path(topic): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    check_global(&server)?;
    authorize_ingest(&server, &headers)?;
    server
        .ingest(&topic, body.to_vec())
        .await
        .map_err(|e| ServerError::Unavailable(e.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}
