// src/http/health.rs
// Liveness/readiness probes: liveness never touches the database, readiness
// does a cheap query.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::state::AppState;

pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn readiness(State(state): State<AppState>) -> Response {
    match sqlx::query("SELECT 1").execute(&state.store.pool).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({"error": "database unavailable"}))).into_response()
        }
    }
}
