//! Session lifecycle route.

use std::sync::Arc;

use askdesk_core::Error;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::extract::ApiJson;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/session", post(session))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub action: String,
    pub session_id: Option<String>,
}

fn required_id(req: &SessionRequest) -> Result<&str, Error> {
    req.session_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation("sessionId is required".into()))
}

/// POST /api/session — `start`, `end`, or `status`.
async fn session(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SessionRequest>,
) -> ApiResult<Json<Value>> {
    let sessions = state.chat.sessions();
    match req.action.as_str() {
        "start" => {
            let id = sessions.create_session();
            Ok(Json(serde_json::to_value(sessions.status(&id).await).map_err(Error::from)?))
        }
        "end" => {
            let id = required_id(&req)?;
            if !sessions.delete_session(id) {
                return Err(Error::NotFound(format!("session {}", id)).into());
            }
            state.chat.limiter().clear(id);
            Ok(Json(json!({ "sessionId": id, "ended": true })))
        }
        "status" => {
            let id = required_id(&req)?;
            let status = sessions.status(id).await;
            if !status.active {
                return Err(Error::NotFound(format!("session {}", id)).into());
            }
            Ok(Json(serde_json::to_value(status).map_err(Error::from)?))
        }
        other => Err(Error::Validation(format!(
            "unknown action '{}' (expected start, end, or status)",
            other
        ))
        .into()),
    }
}
