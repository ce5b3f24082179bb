// src/http/conversation.rs
// POST /internal/conversation/message. This is the one concrete interface
// this crate exposes at the boundary to an external bot hosting runtime:
// whatever adapter a deployment wires to Slack/Teams/etc. calls this
// endpoint per inbound user message and relays the returned text back to
// the user.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::state::AppState;

#[derive(Deserialize)]
pub struct MessageRequest {
    pub user_id: String,
    pub text: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub reply: String,
}

pub async fn handle_message(State(state): State<AppState>, Json(req): Json<MessageRequest>) -> Response {
    match state.conversation.handle_message(&req.user_id, &req.text).await {
        Ok(reply) => Json(MessageResponse { reply }).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "conversation handling failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": "temporarily unavailable"})),
            )
                .into_response()
        }
    }
}
