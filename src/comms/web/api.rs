//! Axum handlers for `/api/*` routes.
//!
//! Every handler takes [`WebState`] and returns an axum [`Response`].
//! Failures become `{error, message}` JSON bodies via [`json_error`].

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use super::WebState;
use crate::catalog::{self, ModelProvider};
use crate::error::AppError;
use crate::session::SettingsPatch;

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct ChatRequest {
    message: String,
}

#[derive(Deserialize)]
pub(super) struct ModelsQuery {
    provider: String,
}

#[derive(Deserialize)]
pub(super) struct GithubRequest {
    #[serde(default)]
    owner: String,
    #[serde(default)]
    repo: String,
    #[serde(default)]
    branch: String,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

/// Map an application error onto a status code and JSON body.
fn app_error(channel_id: &str, e: AppError) -> Response {
    let (status, code) = match &e {
        AppError::Settings(_) | AppError::Config(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        AppError::Documents(_) => (StatusCode::BAD_REQUEST, "documents"),
        AppError::Provider(_) | AppError::Github(_) | AppError::Embedding(_) => {
            (StatusCode::BAD_GATEWAY, "upstream")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    warn!(channel_id, status = status.as_u16(), "request failed: {e}");
    (status, json_error(code, e)).into_response()
}

fn non_empty(message: &str) -> Option<&str> {
    let trimmed = message.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

// ── Status & catalog ──────────────────────────────────────────────────────────

/// GET /api/health
///
/// `reachable` is the provider's probe result; the echo provider always is.
pub(super) async fn health(State(state): State<WebState>) -> Response {
    let engine = state.manager.engine().await;
    let index = match engine.index_stats().await {
        Ok(stats) => json!(stats),
        Err(e) => {
            warn!(channel_id = %state.channel_id, "index stats failed: {e}");
            Value::Null
        }
    };
    let reachable = match engine.provider().ping().await {
        Ok(()) => true,
        Err(e) => {
            debug!(channel_id = %state.channel_id, "provider probe failed: {e}");
            false
        }
    };
    let body = json!({
        "status": "ok",
        "provider": engine.provider().name(),
        "model": engine.provider().model(),
        "reachable": reachable,
        "index": index,
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// GET /api/providers
pub(super) async fn providers() -> Response {
    let list: Vec<Value> = ModelProvider::ALL
        .iter()
        .map(|p| json!({ "name": p.display_name(), "default_model": catalog::default_model(*p) }))
        .collect();
    (StatusCode::OK, Json(json!({ "providers": list }))).into_response()
}

/// GET /api/models?provider=
pub(super) async fn models(Query(q): Query<ModelsQuery>) -> Response {
    match q.provider.parse::<ModelProvider>() {
        Ok(provider) => {
            let body = json!({
                "provider": provider.display_name(),
                "models": catalog::display_names(provider),
                "default": catalog::default_model(provider),
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, json_error("bad_request", e)).into_response(),
    }
}

// ── Settings ──────────────────────────────────────────────────────────────────

/// GET /api/settings
pub(super) async fn get_settings(State(state): State<WebState>) -> Response {
    let body = json!({
        "settings": state.manager.settings().await,
        "github": state.manager.github_repo().await,
    });
    (StatusCode::OK, Json(body)).into_response()
}

/// PUT /api/settings — partial update; the engine is rebuilt once.
pub(super) async fn put_settings(
    State(state): State<WebState>,
    Json(patch): Json<SettingsPatch>,
) -> Response {
    match state.manager.update_settings(patch).await {
        Ok(notices) => {
            let body = json!({
                "settings": state.manager.settings().await,
                "history": state.manager.chat_history(),
                "notices": notices,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => app_error(&state.channel_id, e),
    }
}

/// PUT /api/github
pub(super) async fn put_github(
    State(state): State<WebState>,
    Json(req): Json<GithubRequest>,
) -> Response {
    match state.manager.update_github_repo(&req.owner, &req.repo, &req.branch).await {
        Ok(stats) => {
            let body = json!({ "github": state.manager.github_repo().await, "index": stats });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => app_error(&state.channel_id, e),
    }
}

// ── Chat ──────────────────────────────────────────────────────────────────────

/// POST /api/chat — answered by the worker; never exceeds the reply timeout.
pub(super) async fn chat(State(state): State<WebState>, Json(req): Json<ChatRequest>) -> Response {
    let Some(message) = non_empty(&req.message) else {
        return (StatusCode::BAD_REQUEST, json_error("bad_request", "message is empty")).into_response();
    };
    let reply = state.manager.process_input(message).await;
    let body = json!({ "reply": reply, "history": state.manager.chat_history() });
    (StatusCode::OK, Json(body)).into_response()
}

/// POST /api/chat/stream — SSE `delta` events carrying JSON strings, then a
/// `done` event with `{reply, history}`, or an `error` event.
pub(super) async fn chat_stream(
    State(state): State<WebState>,
    Json(req): Json<ChatRequest>,
) -> Response {
    let Some(message) = non_empty(&req.message) else {
        return (StatusCode::BAD_REQUEST, json_error("bad_request", "message is empty")).into_response();
    };
    let mut turn = match state.manager.stream_response(message).await {
        Ok(turn) => turn,
        Err(e) => return app_error(&state.channel_id, e),
    };

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);
    tokio::spawn(async move {
        while let Some(item) = turn.next().await {
            let event = match item {
                Ok(delta) => Event::default().event("delta").data(Value::String(delta).to_string()),
                Err(e) => {
                    let _ = tx.send(Ok(Event::default().event("error").data(e.to_string()))).await;
                    return;
                }
            };
            if tx.send(Ok(event)).await.is_err() {
                debug!("sse client went away");
                return;
            }
        }
        let done = json!({ "reply": turn.partial(), "history": turn.history_view() });
        let _ = tx.send(Ok(Event::default().event("done").data(done.to_string()))).await;
    });

    Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// GET /api/history
pub(super) async fn history(State(state): State<WebState>) -> Response {
    (StatusCode::OK, Json(json!({ "history": state.manager.chat_history() }))).into_response()
}

/// DELETE /api/history — clears the window only; memory is kept.
pub(super) async fn clear_history(State(state): State<WebState>) -> Response {
    state.manager.clear_chat_history();
    (StatusCode::OK, Json(json!({ "history": [] }))).into_response()
}

/// POST /api/memory/clear — clears the window and the model's memory.
pub(super) async fn clear_memory(State(state): State<WebState>) -> Response {
    state.manager.clear_history_and_memory().await;
    (StatusCode::OK, Json(json!({ "history": [] }))).into_response()
}

// ── Documents & index ─────────────────────────────────────────────────────────

/// GET /api/files
pub(super) async fn list_files(State(state): State<WebState>) -> Response {
    let uploads = state.manager.uploads().clone();
    match tokio::task::spawn_blocking(move || uploads.list()).await {
        Ok(Ok(files)) => (StatusCode::OK, Json(json!({ "files": files }))).into_response(),
        Ok(Err(e)) => app_error(&state.channel_id, e),
        Err(e) => app_error(&state.channel_id, AppError::Documents(format!("list task failed: {e}"))),
    }
}

/// POST /api/files — multipart; every part with a file name is saved.
pub(super) async fn upload_files(State(state): State<WebState>, mut multipart: Multipart) -> Response {
    let mut files = Vec::new();
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let Some(name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                match field.bytes().await {
                    Ok(bytes) => files.push((name, bytes.to_vec())),
                    Err(e) => {
                        return (StatusCode::BAD_REQUEST, json_error("bad_request", e)).into_response();
                    }
                }
            }
            Ok(None) => break,
            Err(e) => return (StatusCode::BAD_REQUEST, json_error("bad_request", e)).into_response(),
        }
    }
    if files.is_empty() {
        return (StatusCode::BAD_REQUEST, json_error("bad_request", "no files in upload")).into_response();
    }

    match state.manager.handle_doc_upload(files).await {
        Ok((saved, notice)) => {
            (StatusCode::OK, Json(json!({ "files": saved, "notices": [notice] }))).into_response()
        }
        Err(e) => app_error(&state.channel_id, e),
    }
}

/// POST /api/index/rebuild — the upload button.
pub(super) async fn rebuild_index(State(state): State<WebState>) -> Response {
    match state.manager.reset_chat_engine().await {
        Ok(stats) => (StatusCode::OK, Json(json!({ "index": stats }))).into_response(),
        Err(e) => app_error(&state.channel_id, e),
    }
}

/// DELETE /api/index — empty the data directory, then rebuild.
pub(super) async fn delete_index(State(state): State<WebState>) -> Response {
    match state.manager.delete_db().await {
        Ok(notice) => {
            let index = state.manager.index_stats().await.ok();
            (StatusCode::OK, Json(json!({ "index": index, "notices": [notice] }))).into_response()
        }
        Err(e) => app_error(&state.channel_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_trims() {
        assert_eq!(non_empty("  hi \n"), Some("hi"));
        assert_eq!(non_empty(" \t"), None);
    }

    #[test]
    fn error_status_by_kind() {
        let resp = app_error("web0", AppError::Settings("no model".into()));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = app_error("web0", AppError::Provider("down".into()));
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let resp = app_error("web0", AppError::Index("locked".into()));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
