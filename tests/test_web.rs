//! Router tests: requests go straight into the axum `Router` with
//! `tower::ServiceExt::oneshot`, no socket involved.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::Router;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use chatrag::comms::{WebState, build_router};
use chatrag::config::{Config, load_from};
use chatrag::session::ModelManager;

// ── helpers ──────────────────────────────────────────────────────────────────

fn test_config(dir: &Path) -> Config {
    let toml = format!(
        r#"
[app]
prompts_dir = "{prompts}"

[server]
enabled = false

[generation]
provider = "Dummy"
model = "Echo"

[embedding]
provider = "none"
"#,
        prompts = dir.join("prompts").display()
    );
    let path = dir.join("chatrag.toml");
    fs::write(&path, toml).expect("write config");
    let work_dir = dir.display().to_string();
    load_from(&path, Some(work_dir.as_str()), Some("warn")).expect("load config")
}

async fn router(dir: &TempDir) -> (Router, Arc<ModelManager>) {
    let manager = Arc::new(
        ModelManager::new(test_config(dir.path()), CancellationToken::new())
            .await
            .expect("manager"),
    );
    (build_router(WebState::new("web-test", Arc::clone(&manager))), manager)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

// ── status & catalog ─────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_provider_and_index() {
    let tmp = TempDir::new().unwrap();
    let (app, _mgr) = router(&tmp).await;

    let (status, body) = send(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "dummy");
    assert_eq!(body["model"], "echo");
    assert_eq!(body["reachable"], true);
    assert_eq!(body["index"]["documents"], 0);
}

#[tokio::test]
async fn catalog_routes() {
    let tmp = TempDir::new().unwrap();
    let (app, _mgr) = router(&tmp).await;

    let (status, body) = send(&app, Method::GET, "/api/providers", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["providers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"NVIDIA NIM"));
    assert!(names.contains(&"Ollama"));

    let (status, body) = send(&app, Method::GET, "/api/models?provider=huggingface", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["models"][0], "Choose a Model");
    assert_eq!(body["default"], "Codestral 22B");

    let (status, body) = send(&app, Method::GET, "/api/models?provider=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn root_and_favicon() {
    let tmp = TempDir::new().unwrap();
    let (app, _mgr) = router(&tmp).await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&html).contains("<title>chatrag</title>"));

    let response = app
        .oneshot(Request::builder().uri("/favicon.ico").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

// ── settings ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn settings_round_trip() {
    let tmp = TempDir::new().unwrap();
    let (app, _mgr) = router(&tmp).await;

    let (status, body) = send(&app, Method::GET, "/api/settings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["provider"], "Dummy");
    assert_eq!(body["settings"]["quantization"], "None");

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/settings",
        Some(json!({ "max_tokens": 1024, "quantization": "4-bit" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["max_tokens"], 1024);
    assert_eq!(body["settings"]["quantization"], "4-bit");
    assert_eq!(body["notices"][0]["level"], "warning");

    let (_, body) = send(&app, Method::GET, "/api/settings", None).await;
    assert_eq!(body["settings"]["max_tokens"], 1024);
}

#[tokio::test]
async fn placeholder_model_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let (app, mgr) = router(&tmp).await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/settings",
        Some(json!({ "provider": "HuggingFace", "model": "Choose a Model" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
    assert_eq!(mgr.settings().await.model, "Echo");
}

// ── chat ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_and_history() {
    let tmp = TempDir::new().unwrap();
    let (app, _mgr) = router(&tmp).await;

    let (status, body) = send(&app, Method::POST, "/api/chat", Some(json!({ "message": "ping" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "[echo] ping");
    assert_eq!(body["history"], json!([["ping", "[echo] ping"]]));

    let (_, body) = send(&app, Method::GET, "/api/history", None).await;
    assert_eq!(body["history"].as_array().unwrap().len(), 1);

    let (status, body) = send(&app, Method::DELETE, "/api/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["history"], json!([]));

    let (_, body) = send(&app, Method::GET, "/api/history", None).await;
    assert_eq!(body["history"], json!([]));
}

#[tokio::test]
async fn empty_message_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let (app, _mgr) = router(&tmp).await;
    let (status, body) = send(&app, Method::POST, "/api/chat", Some(json!({ "message": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "message is empty");
}

#[tokio::test]
async fn memory_clear_resets_engine_memory() {
    let tmp = TempDir::new().unwrap();
    let (app, mgr) = router(&tmp).await;
    send(&app, Method::POST, "/api/chat", Some(json!({ "message": "hello" }))).await;
    assert_eq!(mgr.engine().await.memory_snapshot().await.len(), 2);

    let (status, _) = send(&app, Method::POST, "/api/memory/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(mgr.engine().await.memory_snapshot().await.is_empty());
    assert!(mgr.chat_history().is_empty());
}

#[tokio::test]
async fn chat_stream_emits_deltas_then_done() {
    let tmp = TempDir::new().unwrap();
    let (app, mgr) = router(&tmp).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/chat/stream")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "message": "stream me" }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("event: delta"));
    let done = text.find("event: done").expect("done event");
    assert!(text.rfind("event: delta").unwrap() < done);
    assert!(text.contains(r#""reply":"[echo] stream me""#));

    assert_eq!(
        mgr.chat_history(),
        vec![("stream me".to_string(), "[echo] stream me".to_string())]
    );
}

// ── documents & index ────────────────────────────────────────────────────────

#[tokio::test]
async fn upload_rebuild_and_delete() {
    let tmp = TempDir::new().unwrap();
    let (app, _mgr) = router(&tmp).await;

    let boundary = "chatrag-boundary";
    let multipart = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"files\"; filename=\"notes.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         lifetimes and borrowing\r\n\
         --{boundary}--\r\n"
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/files")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(multipart))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value =
        serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
    assert_eq!(body["files"], json!(["notes.txt"]));
    assert_eq!(
        body["notices"][0]["message"],
        "Make sure you hit the upload button or the model wont see your files!"
    );

    let (_, body) = send(&app, Method::GET, "/api/files", None).await;
    assert_eq!(body["files"], json!(["notes.txt"]));

    let (status, body) = send(&app, Method::POST, "/api/index/rebuild", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["index"]["documents"], 1);

    let (status, body) = send(&app, Method::DELETE, "/api/index", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["index"]["documents"], 0);
    assert_eq!(body["notices"][0]["level"], "info");

    let (_, body) = send(&app, Method::GET, "/api/files", None).await;
    assert_eq!(body["files"], json!([]));
}

#[tokio::test]
async fn github_update_accepts_partial_coordinates() {
    let tmp = TempDir::new().unwrap();
    let (app, _mgr) = router(&tmp).await;
    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/github",
        Some(json!({ "owner": "tokio-rs", "repo": "axum" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["github"]["owner"], "tokio-rs");
    assert_eq!(body["github"]["branch"], "");
    assert_eq!(body["index"]["documents"], 0);
}
