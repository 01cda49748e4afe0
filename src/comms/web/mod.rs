//! Axum web channel: the JSON API under `/api/` and the embedded chat UI.
//!
//! ```text
//! GET    /                       → chat UI
//! GET    /api/health             → provider, model, reachability, index stats
//! GET    /api/providers
//! GET    /api/models?provider=
//! GET    /api/settings
//! PUT    /api/settings           → partial update, returns notices
//! POST   /api/chat               → {reply, history} via the worker queue
//! POST   /api/chat/stream        → SSE `delta`… then `done`
//! GET    /api/history
//! DELETE /api/history
//! POST   /api/memory/clear
//! GET    /api/files
//! POST   /api/files              → multipart upload
//! POST   /api/index/rebuild
//! DELETE /api/index              → empty the data dir and rebuild
//! PUT    /api/github
//! GET    /favicon.ico            → 204
//! ```
//!
//! The shutdown token is wired to axum's graceful shutdown.

mod api;
mod ui;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post, put},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};
use crate::session::ModelManager;

const UPLOAD_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// Router state injected into every handler. Cheap to clone.
#[derive(Clone)]
pub struct WebState {
    pub channel_id: Arc<str>,
    pub manager: Arc<ModelManager>,
}

impl WebState {
    pub fn new(channel_id: &str, manager: Arc<ModelManager>) -> Self {
        Self { channel_id: Arc::from(channel_id), manager }
    }
}

pub struct WebChannel {
    channel_id: String,
    bind_addr: String,
    manager: Arc<ModelManager>,
}

impl WebChannel {
    pub fn new(channel_id: impl Into<String>, bind_addr: impl Into<String>, manager: Arc<ModelManager>) -> Self {
        Self {
            channel_id: channel_id.into(),
            bind_addr: bind_addr.into(),
            manager,
        }
    }
}

impl Component for WebChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_web(self.channel_id, self.bind_addr, self.manager, shutdown))
    }
}

async fn run_web(
    channel_id: String,
    bind_addr: String,
    manager: Arc<ModelManager>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(WebState::new(&channel_id, manager));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("web bind failed on {bind_addr}: {e}")))?;

    info!(%channel_id, %bind_addr, "web channel listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("web server error: {e}")))?;

    info!(%channel_id, "web channel shut down");
    Ok(())
}

pub fn build_router(state: WebState) -> Router {
    Router::new()
        .route("/api/health",         get(api::health))
        .route("/api/providers",      get(api::providers))
        .route("/api/models",         get(api::models))
        .route("/api/settings",       get(api::get_settings).put(api::put_settings))
        .route("/api/chat",           post(api::chat))
        .route("/api/chat/stream",    post(api::chat_stream))
        .route("/api/history",        get(api::history).delete(api::clear_history))
        .route("/api/memory/clear",   post(api::clear_memory))
        .route("/api/files",          get(api::list_files).post(api::upload_files))
        .route("/api/index/rebuild",  post(api::rebuild_index))
        .route("/api/index",          axum::routing::delete(api::delete_index))
        .route("/api/github",         put(api::put_github))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .route("/",            get(ui::root))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .with_state(state)
}
