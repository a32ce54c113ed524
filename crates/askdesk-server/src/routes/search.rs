//! Search debug route: ranked hits with their score breakdown.

use std::sync::Arc;

use askdesk_resolve::SearchOptions;
use askdesk_store::DocType;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::extract::ApiJson;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/search/debug", post(search_debug))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    pub top_k: Option<usize>,
    pub threshold: Option<f64>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
    pub vector_weight: Option<f64>,
    pub text_weight: Option<f64>,
}

impl SearchRequest {
    /// Overlay request fields on the configured defaults.
    fn options(&self, defaults: SearchOptions) -> askdesk_core::Result<SearchOptions> {
        let doc_type = match self.doc_type.as_deref() {
            Some(t) if !t.is_empty() => Some(t.parse::<DocType>()?),
            _ => None,
        };
        let vector_weight = self.vector_weight.unwrap_or(defaults.vector_weight);
        // A lone vector weight implies the complementary text weight.
        let text_weight = match (self.text_weight, self.vector_weight) {
            (Some(tw), _) => tw,
            (None, Some(vw)) => (1.0 - vw).max(0.0),
            (None, None) => defaults.text_weight,
        };
        Ok(SearchOptions {
            top_k: self.top_k.unwrap_or(defaults.top_k),
            threshold: self.threshold.unwrap_or(defaults.threshold),
            doc_type,
            allowed_types: None,
            vector_weight,
            text_weight,
        })
    }
}

/// POST /api/search/debug
async fn search_debug(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SearchRequest>,
) -> ApiResult<Json<Value>> {
    let opts = req.options(SearchOptions::from(state.config.search))?;
    let hits = state.search.search(&req.query, &opts).await?;
    Ok(Json(json!({
        "query": req.query,
        "options": opts,
        "count": hits.len(),
        "hits": hits,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: Value) -> SearchRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_options_overlay_defaults() {
        let opts = request(json!({"query": "q", "topK": 3, "type": "faq"}))
            .options(SearchOptions::default())
            .unwrap();
        assert_eq!(opts.top_k, 3);
        assert_eq!(opts.doc_type, Some(DocType::Faq));
        assert_eq!(opts.threshold, SearchOptions::default().threshold);
    }

    #[test]
    fn test_vector_weight_implies_text_weight() {
        let opts = request(json!({"query": "q", "vectorWeight": 0.4}))
            .options(SearchOptions::default())
            .unwrap();
        assert!((opts.text_weight - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_type_is_not_found() {
        let err = request(json!({"query": "q", "type": "podcast"}))
            .options(SearchOptions::default())
            .unwrap_err();
        assert!(matches!(err, askdesk_core::Error::NotFound(_)));
    }
}
