// src/http/mod.rs
// axum surface: webhook ingestion, admin endpoints, health probes, and
// Prometheus metrics. Router composition uses a `/admin`-nested sub-router under a
// top-level router with CORS + trace layers applied once.

pub mod admin;
pub mod conversation;
pub mod health;
pub mod state;
pub mod webhook;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/webhooks/{module}", post(webhook::receive_webhook))
        .route("/internal/conversation/message", post(conversation::handle_message))
        .route("/healthz", get(health::liveness))
        .route("/readyz", get(health::readiness))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .nest("/admin", admin::router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
