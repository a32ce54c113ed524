//! Stats and health routes.

use std::sync::Arc;

use askdesk_core::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/health", get(health))
}

fn iso_millis(ms: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(ms).map(|t| t.to_rfc3339())
}

/// `{ totalDocuments, sources, lastUpdate }` as returned by the sync trigger.
pub fn store_summary(state: &AppState) -> Result<Value> {
    let stats = state.store.get_stats()?;
    Ok(json!({
        "totalDocuments": stats.total_documents,
        "sources": stats.by_type,
        "lastUpdate": stats.last_update.and_then(iso_millis),
    }))
}

/// GET /api/stats — store and session statistics.
async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let stats = state.store.get_stats()?;
    let llm = state
        .chat
        .llm_info()
        .map(|(provider, model)| json!({ "provider": provider, "model": model }));

    Ok(Json(json!({
        "totalDocuments": stats.total_documents,
        "sources": stats.by_type,
        "lastUpdate": stats.last_update.and_then(iso_millis),
        "embeddingDimension": stats.embedding_dimension,
        "embeddingModel": state.embedder_model,
        "dbSizeMb": stats.db_size_mb,
        "matrixRows": stats.matrix_rows,
        "activeSessions": state.chat.sessions().len(),
        "source": state.synchronizer.source_name(),
        "llm": llm,
    })))
}

/// GET /api/health — liveness.
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let store_ok = state.store.count().is_ok();
    Json(json!({
        "status": if store_ok { "ok" } else { "degraded" },
        "store": store_ok,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
