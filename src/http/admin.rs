// src/http/admin.rs
// Operator surfaces over HTTP: sync status,
// conflict review/resolution, and DLQ inspection/replay. Gated by a static
// API key header compared against config, a plain header-auth style without
// the session/JWT machinery this
// crate has no use for.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use crate::domain::{ModuleKind, ResolutionStrategy};
use crate::error::StoreError;

use super::state::AppState;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/sync-status", get(sync_status))
        .route("/conflicts", get(list_conflicts))
        .route("/conflicts/{id}/resolve", post(resolve_conflict))
        .route("/dlq", get(list_dlq))
        .route("/dlq/{id}/replay", post(replay_dlq))
        .route("/dlq/{id}", axum::routing::delete(purge_dlq))
        .route_layer(axum::middleware::from_fn_with_state(state, require_admin_key))
}

async fn require_admin_key(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let provided = headers
        .get("X-Admin-Api-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided != state.config.server.admin_api_key {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "invalid admin api key"}))).into_response();
    }
    next.run(request).await
}

#[derive(Serialize)]
struct AdminError {
    error: String,
}

fn store_error_response(e: StoreError) -> Response {
    tracing::error!(error = %e, "admin endpoint store error");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(AdminError { error: "internal error".into() })).into_response()
}

async fn sync_status(State(state): State<AppState>) -> Response {
    match state.store.sync_metadata.list_all().await {
        Ok(rows) => Json(rows.into_iter().map(sync_status_view).collect::<Vec<_>>()).into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Serialize)]
struct SyncStatusView {
    module: &'static str,
    last_sync_time: Option<String>,
    next_sweep_time: Option<String>,
    sync_status: String,
    webhooks_received_24h: i64,
    conflicts_detected_24h: i64,
    dedup_hits_24h: i64,
    last_error: Option<String>,
}

fn sync_status_view(m: crate::store::sync_metadata::SyncMetadata) -> SyncStatusView {
    SyncStatusView {
        module: m.module.as_str(),
        last_sync_time: m.last_sync_time.map(|t| t.to_rfc3339()),
        next_sweep_time: m.next_sweep_time.map(|t| t.to_rfc3339()),
        sync_status: m.sync_status,
        webhooks_received_24h: m.webhooks_received_24h,
        conflicts_detected_24h: m.conflicts_detected_24h,
        dedup_hits_24h: m.dedup_hits_24h,
        last_error: m.last_error,
    }
}

#[derive(Deserialize)]
struct ConflictQuery {
    module: Option<String>,
    unresolved: Option<bool>,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_conflicts(State(state): State<AppState>, Query(q): Query<ConflictQuery>) -> Response {
    let module: Option<ModuleKind> = match q.module.as_deref().map(str::parse) {
        Some(Ok(m)) => Some(m),
        Some(Err(_)) => {
            return (StatusCode::BAD_REQUEST, Json(AdminError { error: "unknown module".into() })).into_response()
        }
        None => None,
    };
    match state
        .store
        .conflicts
        .list(module, q.unresolved.unwrap_or(false), q.limit.unwrap_or(50), q.offset.unwrap_or(0))
        .await
    {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Deserialize)]
struct ResolveBody {
    strategy: ResolutionStrategy,
    notes: Option<String>,
}

async fn resolve_conflict(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> Response {
    match state
        .store
        .conflicts
        .resolve(&id, body.strategy, "admin-api", body.notes.as_deref())
        .await
    {
        Ok(Some(conflict)) => Json(conflict).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(AdminError { error: "conflict not found".into() })).into_response(),
        Err(e) => store_error_response(e),
    }
}

#[derive(Deserialize)]
struct PageQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_dlq(State(state): State<AppState>, Query(q): Query<PageQuery>) -> Response {
    match state.bus.list_dlq(q.limit.unwrap_or(50), q.offset.unwrap_or(0)).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn replay_dlq(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.bus.replay_from_dlq(&id).await {
        Ok(Some(msg)) => Json(msg).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(AdminError { error: "dlq entry not found".into() })).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn purge_dlq(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.bus.purge_dlq(&id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, Json(AdminError { error: "dlq entry not found".into() })).into_response(),
        Err(e) => store_error_response(e),
    }
}
