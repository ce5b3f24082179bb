// src/http/webhook.rs
// POST /webhooks/{module}. Authenticates the shared
// secret, validates the module, rate-limits, and hands the raw body to
// `webhook::WebhookReceiver` for the dedup/persist/enqueue algorithm. Error
// mapping uses an `IntoResponse`-per-error-enum idiom.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use crate::domain::ModuleKind;
use crate::error::WebhookError;
use crate::sync::payload::{extract_event_kind, extract_external_id};
use crate::webhook::ReceiveOutcome;

use super::state::AppState;

pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(module_path): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<StatusCode, WebhookHttpError> {
    let provided = headers
        .get("X-Webhook-Auth")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided != state.config.webhook.shared_secret {
        return Err(WebhookHttpError::Auth);
    }

    if !state.webhook_rate_limiter.try_acquire() {
        return Err(WebhookHttpError::RateLimited);
    }

    let module: ModuleKind = module_path
        .parse()
        .map_err(|_| WebhookHttpError::Webhook(WebhookError::InvalidModule(module_path.clone())))?;

    let external_id = extract_external_id(&payload)
        .ok_or_else(|| WebhookHttpError::Webhook(WebhookError::MalformedPayload("missing id".into())))?;
    let event_kind = extract_event_kind(&payload)
        .ok_or_else(|| WebhookHttpError::Webhook(WebhookError::MalformedPayload("missing or unknown event_type".into())))?;

    let outcome = state
        .webhook_receiver
        .receive(module, &external_id, event_kind, &payload)
        .await
        .map_err(WebhookHttpError::Webhook)?;

    match outcome {
        ReceiveOutcome::Accepted | ReceiveOutcome::Dedup => Ok(StatusCode::ACCEPTED),
    }
}

#[derive(Debug)]
pub enum WebhookHttpError {
    Auth,
    RateLimited,
    Webhook(WebhookError),
}

impl IntoResponse for WebhookHttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WebhookHttpError::Auth => (StatusCode::UNAUTHORIZED, "invalid shared secret".to_string()),
            WebhookHttpError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate limited".to_string()),
            WebhookHttpError::Webhook(WebhookError::InvalidModule(m)) => {
                (StatusCode::BAD_REQUEST, format!("unknown module: {m}"))
            }
            WebhookHttpError::Webhook(WebhookError::MalformedPayload(m)) => {
                (StatusCode::BAD_REQUEST, m)
            }
            WebhookHttpError::Webhook(e) => {
                tracing::error!(error = %e, "webhook receive failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
