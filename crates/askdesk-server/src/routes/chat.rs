//! Chat route.

use std::sync::Arc;

use askdesk_chat::{ChatTurn, SourceRef};
use askdesk_core::Error;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Absent on the first message of a conversation.
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub grounded: bool,
}

/// POST /api/chat
async fn chat(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    // Reject before a session is created for an unusable message.
    if req.message.trim().is_empty() {
        return Err(Error::Validation("message must not be empty".into()).into());
    }

    let (session_id, created) = match req.session_id.filter(|s| !s.trim().is_empty()) {
        Some(id) => (id, false),
        None => (state.chat.sessions().create_session(), true),
    };

    let turn = match state.chat.chat(&session_id, &req.message).await {
        Ok(turn) => turn,
        Err(e) => {
            // A session opened for this request is not kept when the turn fails.
            if created {
                state.chat.sessions().delete_session(&session_id);
                state.chat.limiter().clear(&session_id);
            }
            return Err(e.into());
        }
    };

    match turn {
        ChatTurn::Answered(reply) => Ok(Json(ChatResponse {
            session_id,
            response: reply.message,
            sources: reply.sources,
            grounded: reply.grounded,
        })),
        ChatTurn::RateLimited { retry_after_secs } => {
            Err(ApiError::RateLimited { retry_after_secs })
        }
    }
}
