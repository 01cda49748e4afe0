//! Model manager: the state machine behind the chat UI.
//!
//! Owns the current generation settings, the GitHub coordinates, the UI
//! transcript, the upload directory and the chat worker. Every settings
//! change rebuilds the engine from scratch (documents, index, provider and
//! memory) and swaps it into the slot the worker reads from. A failed
//! rebuild leaves the previous engine and settings in place.
//!
//! Rebuilds are serialised by their own lock. The settings lock is only held
//! to snapshot and to commit, so readers never wait on a rebuild.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::worker::{ChatWorker, EngineSlot, WorkerHandle, engine_responder};
use crate::catalog::{self, ModelProvider};
use crate::chat::{ChatEngine, ChatTranscript, StreamingResponse};
use crate::config::Config;
use crate::documents::UploadStore;
use crate::error::AppError;
use crate::index::{DocIndex, IndexStats};
use crate::llm::ProviderError;
use crate::settings::{GenerationSettings, GithubRepo, Quantization};

const NOTICE_SECS: u64 = 10;

pub const UPLOAD_NOTICE: &str = "Make sure you hit the upload button or the model wont see your files!";
pub const MAX_TOKENS_NOTICE: &str =
    "WARNING: This may cut the output of the model short if your response requires more tokens for the answer!!!";
pub const CUSTOM_PROMPT_NOTICE: &str =
    "WARNING: Changing the custom prompt may affect the model's responses. Use this feature with caution.";
pub const DELETE_DB_NOTICE: &str =
    "Wait about 5-10 seconds for the files to clear. After this message disappears you should be in the clear.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// A transient message for the UI, shown for `duration_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub duration_secs: u64,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into(), duration_secs: NOTICE_SECS }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, message: message.into(), duration_secs: NOTICE_SECS }
    }
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub provider: Option<ModelProvider>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub context_window: Option<u32>,
    pub quantization: Option<Quantization>,
    pub custom_prompt: Option<String>,
}

#[derive(Clone)]
struct ManagerState {
    settings: GenerationSettings,
    github: GithubRepo,
}

pub struct ModelManager {
    config: Config,
    state: Mutex<ManagerState>,
    rebuild: Mutex<()>,
    transcript: Arc<StdMutex<ChatTranscript>>,
    engine: EngineSlot,
    uploads: UploadStore,
    worker: WorkerHandle,
    worker_task: StdMutex<Option<JoinHandle<()>>>,
}

impl ModelManager {
    /// Build the first engine from `config` and start the chat worker.
    pub async fn new(config: Config, shutdown: CancellationToken) -> Result<Self, AppError> {
        let uploads = UploadStore::new(&config.data_dir);
        uploads.ensure()?;
        DocIndex::remove_stale_generations(&config.index_dir)?;

        let settings = config.generation.clone();
        let github = config.github.repo.clone();
        let engine = ChatEngine::build(&config, &settings, &github).await?;
        let slot: EngineSlot = Arc::new(RwLock::new(Arc::new(engine)));

        let (worker, task) = ChatWorker::spawn(
            engine_responder(Arc::clone(&slot)),
            config.worker.queue_capacity,
            Duration::from_secs(config.worker.reply_timeout_seconds),
            shutdown,
        );

        Ok(Self {
            config,
            state: Mutex::new(ManagerState { settings, github }),
            rebuild: Mutex::new(()),
            transcript: Arc::new(StdMutex::new(ChatTranscript::new())),
            engine: slot,
            uploads,
            worker,
            worker_task: StdMutex::new(Some(task)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    /// The engine the worker is currently answering with.
    pub async fn engine(&self) -> Arc<ChatEngine> {
        Arc::clone(&*self.engine.read().await)
    }

    // ── Chat ──────────────────────────────────────────────────────────────────

    /// One turn through the worker queue. The pair is always recorded, even
    /// when the reply is an error or the timeout apology.
    pub async fn process_input(&self, message: &str) -> String {
        let reply = self.worker.ask(message).await;
        self.transcript().push(message, reply.clone());
        reply
    }

    /// Stream one turn directly from the current engine.
    pub async fn stream_response(&self, message: &str) -> Result<TurnStream, AppError> {
        let engine = self.engine().await;
        let inner = engine.stream_chat(message).await?;
        Ok(TurnStream {
            message: message.to_string(),
            reply: String::new(),
            inner,
            transcript: Arc::clone(&self.transcript),
            done: false,
        })
    }

    pub fn chat_history(&self) -> Vec<(String, String)> {
        self.transcript().pairs().to_vec()
    }

    pub fn clear_chat_history(&self) {
        self.transcript().clear();
        debug!("chat history cleared");
    }

    /// Clear the window and the model's memory of the conversation.
    pub async fn clear_history_and_memory(&self) {
        self.clear_chat_history();
        self.engine().await.reset_memory().await;
    }

    // ── Settings ──────────────────────────────────────────────────────────────

    pub async fn settings(&self) -> GenerationSettings {
        self.state.lock().await.settings.clone()
    }

    pub async fn github_repo(&self) -> GithubRepo {
        self.state.lock().await.github.clone()
    }

    /// Apply `patch`, then rebuild the engine once if anything changed.
    ///
    /// Changing the provider selects its default model unless the patch
    /// names one. A provider or model change clears the chat history.
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<Vec<Notice>, AppError> {
        let _rebuild = self.rebuild.lock().await;
        let current = self.snapshot().await;
        let mut next = current.settings.clone();
        let mut notices = Vec::new();
        let mut model_changed = false;

        if let Some(provider) = patch.provider {
            if provider != next.provider {
                next.provider = provider;
                next.model = catalog::default_model(provider).to_string();
                model_changed = true;
            }
        }
        if let Some(model) = patch.model {
            let id = catalog::resolve_model(next.provider, &model)?;
            next.model = catalog::display_name_for(next.provider, &id);
            model_changed = true;
        }
        if model_changed {
            notices.push(model_notice(next.provider, &next.model));
        }

        if let Some(t) = patch.temperature {
            if next.set_temperature(t) {
                notices.push(clamp_notice("temperature", t, next.temperature));
            }
        }
        if let Some(m) = patch.max_tokens {
            if next.set_max_tokens(m) {
                notices.push(clamp_notice("max tokens", m, next.max_tokens));
            }
            notices.push(Notice::warning(MAX_TOKENS_NOTICE));
        }
        if let Some(p) = patch.top_p {
            if next.set_top_p(p) {
                notices.push(clamp_notice("top-p", p, next.top_p));
            }
        }
        if let Some(c) = patch.context_window {
            if next.set_context_window(c) {
                notices.push(clamp_notice("context window", c, next.context_window));
            }
        }
        if let Some(q) = patch.quantization {
            next.quantization = q;
        }
        if let Some(prompt) = patch.custom_prompt {
            next.custom_prompt = prompt.trim().to_string();
            notices.push(Notice::warning(CUSTOM_PROMPT_NOTICE));
        }

        if next == current.settings && !model_changed {
            debug!("settings unchanged, engine kept");
            return Ok(notices);
        }

        let engine = ChatEngine::build(&self.config, &next, &current.github).await?;
        self.install(engine).await;
        info!(
            provider = %next.provider,
            model = %next.model,
            temperature = next.temperature,
            max_tokens = next.max_tokens,
            "settings applied"
        );
        self.state.lock().await.settings = next;
        if model_changed {
            self.clear_chat_history();
        }
        Ok(notices)
    }

    pub async fn update_model(&self, display_name: &str) -> Result<Vec<Notice>, AppError> {
        self.update_settings(SettingsPatch { model: Some(display_name.to_string()), ..Default::default() })
            .await
    }

    pub async fn update_model_provider(&self, provider: ModelProvider) -> Result<Vec<Notice>, AppError> {
        self.update_settings(SettingsPatch { provider: Some(provider), ..Default::default() })
            .await
    }

    pub async fn update_temperature(&self, temperature: f32) -> Result<Vec<Notice>, AppError> {
        self.update_settings(SettingsPatch { temperature: Some(temperature), ..Default::default() })
            .await
    }

    pub async fn update_max_tokens(&self, max_tokens: u32) -> Result<Vec<Notice>, AppError> {
        self.update_settings(SettingsPatch { max_tokens: Some(max_tokens), ..Default::default() })
            .await
    }

    pub async fn update_top_p(&self, top_p: f32) -> Result<Vec<Notice>, AppError> {
        self.update_settings(SettingsPatch { top_p: Some(top_p), ..Default::default() })
            .await
    }

    pub async fn update_context_window(&self, context_window: u32) -> Result<Vec<Notice>, AppError> {
        self.update_settings(SettingsPatch { context_window: Some(context_window), ..Default::default() })
            .await
    }

    pub async fn update_quantization(&self, quantization: Quantization) -> Result<Vec<Notice>, AppError> {
        self.update_settings(SettingsPatch { quantization: Some(quantization), ..Default::default() })
            .await
    }

    pub async fn update_chat_prompt(&self, custom_prompt: &str) -> Result<Vec<Notice>, AppError> {
        self.update_settings(SettingsPatch {
            custom_prompt: Some(custom_prompt.to_string()),
            ..Default::default()
        })
        .await
    }

    /// Point the engine at a GitHub repository. An incomplete triple clears
    /// the GitHub source.
    pub async fn update_github_repo(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<IndexStats, AppError> {
        let _rebuild = self.rebuild.lock().await;
        let current = self.snapshot().await;
        let next = GithubRepo::new(owner, repo, branch);
        if !next.is_complete() {
            debug!(repo = %next, "github repository incomplete, not fetched");
        }
        let engine = ChatEngine::build(&self.config, &current.settings, &next).await?;
        let stats = engine.index_stats().await?;
        self.install(engine).await;
        self.state.lock().await.github = next;
        Ok(stats)
    }

    // ── Documents ─────────────────────────────────────────────────────────────

    /// Save uploaded files into the data directory. They are not indexed
    /// until [`reset_chat_engine`](Self::reset_chat_engine) runs.
    pub async fn handle_doc_upload(
        &self,
        files: Vec<(String, Vec<u8>)>,
    ) -> Result<(Vec<String>, Notice), AppError> {
        let uploads = self.uploads.clone();
        let saved = tokio::task::spawn_blocking(move || {
            files
                .iter()
                .map(|(name, bytes)| {
                    let path = uploads.save(name, bytes)?;
                    Ok(path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default())
                })
                .collect::<Result<Vec<String>, AppError>>()
        })
        .await
        .map_err(|e| AppError::Documents(format!("upload task failed: {e}")))??;
        Ok((saved, Notice::warning(UPLOAD_NOTICE)))
    }

    /// Rebuild documents, index, provider and memory from current settings.
    pub async fn reset_chat_engine(&self) -> Result<IndexStats, AppError> {
        let _rebuild = self.rebuild.lock().await;
        let current = self.snapshot().await;
        let engine = ChatEngine::build(&self.config, &current.settings, &current.github).await?;
        let stats = engine.index_stats().await?;
        self.install(engine).await;
        info!(documents = stats.documents, chunks = stats.chunks, "chat engine reset");
        Ok(stats)
    }

    /// Empty the data directory and rebuild.
    pub async fn delete_db(&self) -> Result<Notice, AppError> {
        let uploads = self.uploads.clone();
        tokio::task::spawn_blocking(move || uploads.clear())
            .await
            .map_err(|e| AppError::Documents(format!("clear task failed: {e}")))??;
        self.reset_chat_engine().await?;
        Ok(Notice::info(DELETE_DB_NOTICE))
    }

    pub async fn index_stats(&self) -> Result<IndexStats, AppError> {
        self.engine().await.index_stats().await
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    pub fn worker(&self) -> &WorkerHandle {
        &self.worker
    }

    /// Stop the worker and wait for it to exit. Idempotent.
    pub async fn shutdown(&self) {
        self.worker.stop().await;
        let task = match self.worker_task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("chat worker task failed: {e}");
            }
        }
    }

    async fn snapshot(&self) -> ManagerState {
        self.state.lock().await.clone()
    }

    /// Swap `engine` in. The previous engine is released off the runtime
    /// threads since dropping its last handle deletes its index generation.
    async fn install(&self, engine: ChatEngine) {
        let previous = std::mem::replace(&mut *self.engine.write().await, Arc::new(engine));
        tokio::task::spawn_blocking(move || drop(previous));
    }

    fn transcript(&self) -> MutexGuard<'_, ChatTranscript> {
        lock(&self.transcript)
    }
}

fn lock(transcript: &StdMutex<ChatTranscript>) -> MutexGuard<'_, ChatTranscript> {
    transcript.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn model_notice(provider: ModelProvider, display: &str) -> Notice {
    match provider {
        ModelProvider::Ollama => Notice::warning(format!(
            "Model updated to {display}. Please make sure you have this model installed through Ollama!"
        )),
        _ => Notice::info(format!("Model updated to {display}.")),
    }
}

fn clamp_notice<T: std::fmt::Display, U: std::fmt::Display>(what: &str, requested: T, applied: U) -> Notice {
    Notice::warning(format!("{what} {requested} is out of range; using {applied}"))
}

/// A streamed turn. The `(user, assistant)` pair is added to the transcript
/// when the stream ends; a failed stream records `"Error: <e>"` instead.
/// Dropping the stream early records nothing.
pub struct TurnStream {
    message: String,
    reply: String,
    inner: StreamingResponse,
    transcript: Arc<StdMutex<ChatTranscript>>,
    done: bool,
}

impl TurnStream {
    pub async fn next(&mut self) -> Option<Result<String, ProviderError>> {
        if self.done {
            return None;
        }
        match self.inner.next().await {
            Some(Ok(delta)) => {
                self.reply.push_str(&delta);
                Some(Ok(delta))
            }
            Some(Err(e)) => {
                self.finish(format!("Error: {e}"));
                Some(Err(e))
            }
            None => {
                let reply = self.reply.clone();
                self.finish(reply);
                None
            }
        }
    }

    /// Drain the stream and return the full reply.
    pub async fn collect(mut self) -> Result<String, ProviderError> {
        while let Some(delta) = self.next().await {
            delta?;
        }
        Ok(self.reply)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Text received so far.
    pub fn partial(&self) -> &str {
        &self.reply
    }

    /// Transcript including the in-progress turn.
    pub fn history_view(&self) -> Vec<(String, String)> {
        if self.done {
            return lock(&self.transcript).pairs().to_vec();
        }
        lock(&self.transcript).with_pending(&self.message, &self.reply)
    }

    fn finish(&mut self, reply: String) {
        self.done = true;
        lock(&self.transcript).push(self.message.clone(), reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_model_notice_warns_about_install() {
        let n = model_notice(ModelProvider::Ollama, "Gemma2 9B");
        assert_eq!(n.level, NoticeLevel::Warning);
        assert_eq!(
            n.message,
            "Model updated to Gemma2 9B. Please make sure you have this model installed through Ollama!"
        );
        assert_eq!(model_notice(ModelProvider::OpenAi, "GPT-4o").level, NoticeLevel::Info);
    }

    #[test]
    fn notice_serializes_lowercase_level() {
        let json = serde_json::to_value(Notice::warning("x")).unwrap();
        assert_eq!(json, serde_json::json!({"level": "warning", "message": "x", "duration_secs": 10}));
    }

    #[test]
    fn patch_accepts_ui_labels() {
        let patch: SettingsPatch =
            serde_json::from_str(r#"{"provider": "NVIDIA NIM", "quantization": "4-bit", "top_p": 0.5}"#).unwrap();
        assert_eq!(patch.provider, Some(ModelProvider::NvidiaNim));
        assert_eq!(patch.quantization, Some(Quantization::FourBit));
        assert_eq!(patch.top_p, Some(0.5));
        assert!(patch.model.is_none());
    }
}
