//! Sync trigger route.

use std::sync::Arc;

use askdesk_core::Error;
use askdesk_store::DocType;
use askdesk_sync::SyncScope;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::routes::stats::store_summary;
use crate::state::AppState;

pub const SYNC_SECRET_HEADER: &str = "x-sync-secret";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/sync", post(trigger_sync))
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub id: Option<String>,
}

fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let expected = match state.config.sync.secret.as_deref() {
        Some(s) if !s.is_empty() => s,
        _ => return Err(ApiError::Disabled("sync secret")),
    };
    let provided = headers.get(SYNC_SECRET_HEADER).and_then(|v| v.to_str().ok());
    if provided != Some(expected) {
        warn!("Rejected sync trigger with missing or wrong secret");
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// POST /api/sync — full, type-scoped (`type`), or single-document (`id`) run.
async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;

    // An empty body means a full run.
    let req: SyncRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SyncRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::Validation(format!("invalid sync request: {}", e)))?
    };

    let _running = state.sync_lock.lock().await;
    let report = match (req.id.as_deref(), req.doc_type.as_deref()) {
        (Some(id), _) if !id.is_empty() => state.synchronizer.sync_document(id).await?,
        (_, Some(t)) if !t.is_empty() => {
            let doc_type: DocType = t.parse()?;
            state.synchronizer.sync(SyncScope::Type(doc_type)).await?
        }
        _ => state.synchronizer.sync(SyncScope::All).await?,
    };
    info!(
        "Sync trigger finished: {} embedded, {} failures",
        report.embedded,
        report.failures.len()
    );

    let stats = store_summary(&state)?;
    Ok(Json(json!({
        "success": !report.is_partial_failure(),
        "report": report,
        "stats": stats,
    })))
}
