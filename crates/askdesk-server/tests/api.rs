//! Router-level tests: handlers driven through `oneshot` with in-memory
//! content, the local hash embedder, and a scripted LLM.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use askdesk_chat::{CompletionProvider, PromptMessage};
use askdesk_core::{AskDeskConfig, Error, Result};
use askdesk_infer::HashEmbedder;
use askdesk_server::{build_router, AppState};
use askdesk_store::{DocType, SqliteStore};
use askdesk_sync::{Body, MemorySource, SourceDocument};
use async_trait::async_trait;
use axum::body::{to_bytes, Body as HttpBody};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "s3cret";

#[derive(Default)]
struct ScriptedLlm {
    calls: AtomicUsize,
    down: AtomicBool,
}

#[async_trait]
impl CompletionProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn complete(&self, messages: &[PromptMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::Provider("upstream 503".into()));
        }
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(format!("You asked: {}", last))
    }
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    source: Arc<MemorySource>,
    llm: Arc<ScriptedLlm>,
    _dir: TempDir,
}

fn app_with(env: &[(&str, &str)]) -> TestApp {
    let dir = TempDir::new().unwrap();
    let env: Vec<(String, String)> = env
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let config = AskDeskConfig::from_lookup(dir.path(), |key| {
        env.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    })
    .unwrap();

    let dim = config.embedding.dimension;
    let store = Arc::new(SqliteStore::open(&config.data_paths.vectordb, dim).unwrap());
    let source = Arc::new(MemorySource::with_documents([
        SourceDocument::new("faq-1", DocType::Faq, "Pricing", Body::Text("料金は5000円です".into())),
        SourceDocument::new("faq-2", DocType::Faq, "Trial", Body::Text("無料体験あります".into())),
        SourceDocument::new(
            "evt-1",
            DocType::Event,
            "Pottery workshop",
            Body::Text("Pottery workshop every Saturday morning".into()),
        ),
    ]));
    let llm = Arc::new(ScriptedLlm::default());
    let state = Arc::new(AppState::new(
        config,
        store,
        Arc::new(HashEmbedder::new(dim)),
        source.clone(),
        Some(llm.clone() as Arc<dyn CompletionProvider>),
    ));
    TestApp {
        router: build_router(state.clone()),
        state,
        source,
        llm,
        _dir: dir,
    }
}

fn app() -> TestApp {
    app_with(&[("ASKDESK_SYNC_SECRET", SECRET)])
}

async fn send(app: &TestApp, req: Request<HttpBody>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<HttpBody> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(HttpBody::from(body.to_string()))
        .unwrap()
}

fn sync_request(secret: Option<&str>, body: Value) -> Request<HttpBody> {
    let mut builder = Request::post("/api/sync").header("content-type", "application/json");
    if let Some(s) = secret {
        builder = builder.header("x-sync-secret", s);
    }
    builder.body(HttpBody::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let request = Request::get("/api/health").body(HttpBody::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_sync_requires_secret() {
    let app = app();
    let (status, body) = send(&app, sync_request(None, json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, sync_request(Some("wrong"), json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.state.store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_sync_disabled_without_secret() {
    let app = app_with(&[]);
    let (status, body) = send(&app, sync_request(Some(SECRET), json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "NOT_CONFIGURED");
}

#[tokio::test]
async fn test_sync_reports_stats_and_propagates_deletes() {
    let app = app();
    let (status, body) = send(&app, sync_request(Some(SECRET), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["report"]["embedded"], 3);
    assert_eq!(body["stats"]["totalDocuments"], 3);
    assert_eq!(body["stats"]["sources"]["faq"], 2);
    assert!(body["stats"]["lastUpdate"].is_string());

    // Second run is a no-op
    let (_, body) = send(&app, sync_request(Some(SECRET), json!({}))).await;
    assert_eq!(body["report"]["embedded"], 0);
    assert_eq!(body["report"]["unchanged"], 3);

    // Deactivated event disappears on a type-scoped run
    app.source.update("evt-1", |d| d.is_active = false);
    let (status, body) = send(&app, sync_request(Some(SECRET), json!({"type": "event"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["deleted"], 1);
    assert!(app.state.store.get("evt-1").unwrap().is_none());

    let (status, body) = send(&app, sync_request(Some(SECRET), json!({"type": "podcast"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_single_document_sync() {
    let app = app();
    let (status, body) = send(&app, sync_request(Some(SECRET), json!({"id": "faq-1"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["embedded"], 1);
    assert_eq!(app.state.store.count().unwrap(), 1);
}

#[tokio::test]
async fn test_search_debug_breakdown() {
    let app = app();
    send(&app, sync_request(Some(SECRET), json!({}))).await;

    let (status, body) = send(&app, post("/api/search/debug", json!({"query": "料金はいくらですか"}))).await;
    assert_eq!(status, StatusCode::OK);
    let hits = body["hits"].as_array().unwrap();
    assert_eq!(hits[0]["id"], "faq-1");
    for key in ["vector_score", "text_score", "combined_score"] {
        assert!(hits[0][key].is_number());
    }

    let (status, body) = send(&app, post("/api/search/debug", json!({"query": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_chat_creates_session_and_cites_sources() {
    let app = app();
    send(&app, sync_request(Some(SECRET), json!({}))).await;

    let (status, body) = send(&app, post("/api/chat", json!({"message": "料金はいくらですか"}))).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["sessionId"].as_str().unwrap().to_string();
    assert_eq!(body["response"], "You asked: 料金はいくらですか");
    assert_eq!(body["grounded"], true);
    assert_eq!(body["sources"][0]["id"], "faq-1");
    assert_eq!(body["sources"][0]["type"], "faq");

    let (status, body) = send(
        &app,
        post("/api/session", json!({"action": "status", "sessionId": session_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messageCount"], 2);
}

#[tokio::test]
async fn test_chat_unknown_session_and_empty_message() {
    let app = app();
    let request = post("/api/chat", json!({"sessionId": "missing", "message": "hi"}));
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, post("/api/chat", json!({"message": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.state.chat.sessions().len(), 0);
}

#[tokio::test]
async fn test_chat_rate_limit_returns_429() {
    let app = app_with(&[("ASKDESK_RATE_LIMIT", "2")]);
    let (_, body) = send(&app, post("/api/session", json!({"action": "start"}))).await;
    let session_id = body["sessionId"].as_str().unwrap().to_string();

    for msg in ["one", "two"] {
        let request = post("/api/chat", json!({"sessionId": session_id, "message": msg}));
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
    }
    let response = app
        .router
        .clone()
        .oneshot(post("/api/chat", json!({"sessionId": session_id, "message": "three"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    assert!(body["retryAfter"].as_u64().unwrap() >= 1);
    assert_eq!(app.llm.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let app = app();
    let (status, body) = send(&app, post("/api/session", json!({"action": "start"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], true);
    let id = body["sessionId"].as_str().unwrap().to_string();

    let end = json!({"action": "end", "sessionId": id});
    let (status, _) = send(&app, post("/api/session", end)).await;
    assert_eq!(status, StatusCode::OK);

    let end = json!({"action": "end", "sessionId": id});
    let (status, _) = send(&app, post("/api/session", end)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let request = post("/api/session", json!({"action": "status", "sessionId": id}));
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, post("/api/session", json!({"action": "restart"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_stats_reports_sessions_and_llm() {
    let app = app();
    app.state.chat.sessions().create_session();
    let request = Request::get("/api/stats").body(HttpBody::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["activeSessions"], 1);
    assert_eq!(body["llm"]["provider"], "scripted");
    assert_eq!(body["embeddingModel"], "hash");
    assert_eq!(body["totalDocuments"], 0);
}

fn raw_post(uri: &str, body: &str) -> Request<HttpBody> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(HttpBody::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_malformed_bodies_are_validation_errors() {
    let app = app();
    let cases = [
        ("/api/session", "{}"),
        ("/api/chat", r#"{"message": 5}"#),
        ("/api/search/debug", "not json"),
    ];
    for (uri, body) in cases {
        let (status, body) = send(&app, raw_post(uri, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR", "{}", uri);
        assert!(body["error"]["message"].is_string());
    }
    assert_eq!(app.state.chat.sessions().len(), 0);
}

#[tokio::test]
async fn test_failed_first_turn_does_not_leave_a_session() {
    let app = app();
    app.llm.down.store(true, Ordering::SeqCst);

    let (status, body) = send(&app, post("/api/chat", json!({"message": "hello"}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "PROVIDER_ERROR");
    assert_eq!(app.state.chat.sessions().len(), 0);

    // An existing session survives a failed turn
    let id = app.state.chat.sessions().create_session();
    let request = post("/api/chat", json!({"sessionId": id, "message": "hello"}));
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(app.state.chat.sessions().exists(&id));
}
