//! Context-mode chat engine.
//!
//! Each turn retrieves the top-k chunks for the query, renders them into the
//! context template and sends
//! `[system(persona + context)] + memory window + [user(query)]` to the
//! provider. The user and assistant messages are recorded in memory only
//! after the provider call succeeds.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::memory::{self, ChatMemory};
use super::prompt;
use crate::config::Config;
use crate::documents::{self, GithubLoader};
use crate::error::AppError;
use crate::index::{ChunkConfig, DocIndex, Embedder, IndexStats, RetrievedChunk};
use crate::llm::stream::DELTA_CHANNEL_CAPACITY;
use crate::llm::{ChatMessage, DeltaReceiver, GenerationParams, LlmProvider, ProviderError, providers};
use crate::settings::{GenerationSettings, GithubRepo, Quantization};

/// Everything a [`ChatEngine`] is assembled from.
pub struct EngineParts {
    pub provider: LlmProvider,
    pub params: GenerationParams,
    pub index: DocIndex,
    pub embedder: Embedder,
    pub memory_limit: usize,
    pub system_prompt: String,
    pub context_template: String,
    pub top_k: usize,
}

pub struct ChatEngine {
    provider: LlmProvider,
    params: GenerationParams,
    index: DocIndex,
    embedder: Embedder,
    memory: Arc<Mutex<ChatMemory>>,
    system_prompt: String,
    context_template: String,
    top_k: usize,
}

/// A turn in progress. Deltas arrive on [`deltas`](Self::deltas); the turn
/// is recorded in memory once the provider stream ends cleanly.
pub struct StreamingResponse {
    pub deltas: DeltaReceiver,
}

impl StreamingResponse {
    pub async fn next(&mut self) -> Option<Result<String, ProviderError>> {
        self.deltas.recv().await
    }

    /// Drain every delta into the full reply. The first error wins.
    pub async fn collect(mut self) -> Result<String, ProviderError> {
        let mut text = String::new();
        while let Some(delta) = self.deltas.recv().await {
            text.push_str(&delta?);
        }
        Ok(text)
    }
}

impl ChatEngine {
    pub fn from_parts(parts: EngineParts) -> Self {
        Self {
            provider: parts.provider,
            params: parts.params,
            index: parts.index,
            embedder: parts.embedder,
            memory: Arc::new(Mutex::new(ChatMemory::new(parts.memory_limit))),
            system_prompt: parts.system_prompt,
            context_template: parts.context_template,
            top_k: parts.top_k.max(1),
        }
    }

    /// Load documents, index them into a new generation and attach the
    /// selected provider.
    ///
    /// The provider is resolved first so a missing API key fails before any
    /// documents are fetched or embedded. On error the new generation is
    /// dropped and no other engine's index is touched.
    pub async fn build(
        config: &Config,
        settings: &GenerationSettings,
        github: &GithubRepo,
    ) -> Result<Self, AppError> {
        let model_id = settings.model_id()?;
        let provider = providers::build(settings.provider, &model_id, &config.providers, &config.keys)?;
        if settings.quantization != Quantization::None {
            info!(
                quantization = settings.quantization.label(),
                "quantization is recorded only; the inference server decides the weights"
            );
        }

        let data_dir = config.data_dir.clone();
        let mut docs = tokio::task::spawn_blocking(move || documents::load_dir(&data_dir))
            .await
            .map_err(|e| AppError::Documents(format!("loader task failed: {e}")))??;
        debug!(count = docs.len(), "local documents loaded");

        if github.is_complete() {
            let loader = GithubLoader::new(&config.github, config.keys.github.clone())?;
            let repo_docs = loader.load(github).await?;
            info!(repo = %github, count = repo_docs.len(), "github documents loaded");
            docs.extend(repo_docs);
        }

        let index_dir = config.index_dir.clone();
        let index = tokio::task::spawn_blocking(move || DocIndex::create_generation(&index_dir))
            .await
            .map_err(|e| AppError::Index(format!("open task failed: {e}")))??;

        let embedding_key = config.keys.embedding.clone().or_else(|| {
            match config.embedding.provider {
                crate::config::EmbeddingProviderKind::OpenAi => config.keys.openai.clone(),
                _ => None,
            }
        });
        let embedder = Embedder::from_config(&config.embedding, embedding_key)?;
        index
            .rebuild(docs, &embedder, &ChunkConfig::from(&config.retrieval))
            .await?;

        let engine = Self::from_parts(EngineParts {
            provider,
            params: settings.params(),
            index,
            embedder,
            memory_limit: memory::token_limit_for(settings, config.memory.token_limit),
            system_prompt: prompt::system_prompt(&config.prompts_dir, &settings.custom_prompt),
            context_template: prompt::context_template(&config.prompts_dir),
            top_k: config.retrieval.top_k,
        });
        let memory_limit = engine.memory_limit().await;
        info!(
            provider = engine.provider.name(),
            model = engine.provider.model(),
            memory_limit,
            "chat engine ready"
        );
        Ok(engine)
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn index(&self) -> &DocIndex {
        &self.index
    }

    pub async fn index_stats(&self) -> Result<IndexStats, AppError> {
        let index = self.index.clone();
        tokio::task::spawn_blocking(move || index.stats())
            .await
            .map_err(|e| AppError::Index(format!("stats task failed: {e}")))?
    }

    /// One complete, non-streaming turn.
    pub async fn chat(&self, query: &str) -> Result<String, AppError> {
        let messages = self.prepare(query).await?;
        let response = self.provider.complete(&messages, &self.params).await?;
        if let Some(usage) = &response.usage {
            debug!(input = usage.input_tokens, output = usage.output_tokens, "token usage");
        }

        let mut memory = self.memory.lock().await;
        memory.put(ChatMessage::user(query));
        memory.put(ChatMessage::assistant(response.text.clone()));
        Ok(response.text)
    }

    /// Start a streaming turn. Memory is updated by the forwarding task after
    /// the last delta, and only if the stream ended without an error.
    pub async fn stream_chat(&self, query: &str) -> Result<StreamingResponse, AppError> {
        let messages = self.prepare(query).await?;
        let mut upstream = self.provider.stream(&messages, &self.params).await?;

        let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
        let memory = Arc::clone(&self.memory);
        let query = query.to_string();
        tokio::spawn(async move {
            let mut full = String::new();
            while let Some(item) = upstream.recv().await {
                match item {
                    Ok(delta) => {
                        full.push_str(&delta);
                        if tx.send(Ok(delta)).await.is_err() {
                            debug!("stream receiver dropped; turn not recorded");
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("stream failed: {e}");
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
            let mut memory = memory.lock().await;
            memory.put(ChatMessage::user(query));
            memory.put(ChatMessage::assistant(full));
        });

        Ok(StreamingResponse { deltas: rx })
    }

    pub async fn reset_memory(&self) {
        self.memory.lock().await.reset();
        debug!("chat memory reset");
    }

    pub async fn memory_snapshot(&self) -> Vec<ChatMessage> {
        self.memory.lock().await.all().to_vec()
    }

    pub async fn memory_limit(&self) -> usize {
        self.memory.lock().await.token_limit()
    }

    /// Top-k chunks for `query`. A failing embedder degrades to keyword search.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, AppError> {
        let query_vec = match self.embedder.embed_query(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!("query embedding failed, using keyword search: {e}");
                None
            }
        };
        let index = self.index.clone();
        let query = query.to_string();
        let top_k = self.top_k;
        tokio::task::spawn_blocking(move || index.search(&query, query_vec.as_deref(), top_k))
            .await
            .map_err(|e| AppError::Index(format!("search task failed: {e}")))?
    }

    async fn prepare(&self, query: &str) -> Result<Vec<ChatMessage>, AppError> {
        let chunks = self.retrieve(query).await?;
        debug!(retrieved = chunks.len(), "context retrieved");
        let context = prompt::render_context(
            &self.context_template,
            &prompt::format_context(&chunks),
            query,
        );

        let mut messages = vec![ChatMessage::system(format!("{}\n\n{}", self.system_prompt, context))];
        messages.extend(self.memory.lock().await.get());
        messages.push(ChatMessage::user(query));
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelProvider;
    use crate::documents::Document;
    use crate::llm::Role;
    use crate::llm::providers::dummy::DummyProvider;
    use tempfile::TempDir;

    async fn engine_with(provider: LlmProvider, dir: &TempDir) -> ChatEngine {
        let index = DocIndex::open(&dir.path().join("index")).unwrap();
        let docs = vec![
            Document::new("tokio.md", "tokio.md", "Tokio is an asynchronous runtime for Rust."),
            Document::new("serde.md", "serde.md", "Serde serializes and deserializes data."),
        ];
        index
            .rebuild(docs, &Embedder::None, &ChunkConfig { chunk_size: 256, chunk_overlap: 0 })
            .await
            .unwrap();
        ChatEngine::from_parts(EngineParts {
            provider,
            params: GenerationParams::default(),
            index,
            embedder: Embedder::None,
            memory_limit: 1000,
            system_prompt: "You help.".into(),
            context_template: prompt::DEFAULT_CONTEXT_TEMPLATE.into(),
            top_k: 2,
        })
    }

    fn dummy() -> LlmProvider {
        LlmProvider::Dummy(DummyProvider::new("echo"))
    }

    #[tokio::test]
    async fn chat_records_turn_in_memory() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(dummy(), &dir).await;

        let reply = engine.chat("what is tokio").await.unwrap();
        assert_eq!(reply, "[echo] what is tokio");

        let mem = engine.memory_snapshot().await;
        assert_eq!(mem.len(), 2);
        assert_eq!(mem[0], ChatMessage::user("what is tokio"));
        assert_eq!(mem[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn prepare_injects_context_and_history() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(dummy(), &dir).await;
        engine.chat("first").await.unwrap();

        let messages = engine.prepare("tokio runtime").await.unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("You help."));
        assert!(messages[0].content.contains("file_path: tokio.md"));
        assert!(messages[0].content.contains("Query: tokio runtime"));
        assert_eq!(messages[1], ChatMessage::user("first"));
        assert_eq!(messages[3], ChatMessage::user("tokio runtime"));
    }

    #[tokio::test]
    async fn stream_collects_and_records() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(dummy(), &dir).await;

        let stream = engine.stream_chat("hello there").await.unwrap();
        assert_eq!(stream.collect().await.unwrap(), "[echo] hello there");

        // The recording task runs after the last delta is sent.
        let mut mem = Vec::new();
        for _ in 0..50 {
            mem = engine.memory_snapshot().await;
            if !mem.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(mem.len(), 2);
        assert_eq!(mem[1].content, "[echo] hello there");
    }

    #[tokio::test]
    async fn failed_call_records_nothing() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::test_default(dir.path());
        cfg.providers.ollama.api_base_url = "http://127.0.0.1:9".into();
        cfg.providers.ollama.timeout_seconds = 2;
        let provider =
            providers::build(ModelProvider::Ollama, "codestral:latest", &cfg.providers, &cfg.keys).unwrap();
        let engine = engine_with(provider, &dir).await;

        assert!(engine.chat("hi").await.is_err());
        assert!(engine.memory_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn reset_memory_empties_buffer() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(dummy(), &dir).await;
        engine.chat("one").await.unwrap();
        engine.reset_memory().await;
        assert!(engine.memory_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn build_from_config_indexes_data_dir() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::test_default(dir.path());
        std::fs::create_dir_all(&cfg.data_dir).unwrap();
        std::fs::write(cfg.data_dir.join("notes.txt"), "axum routes requests").unwrap();

        let engine = ChatEngine::build(&cfg, &cfg.generation, &GithubRepo::default())
            .await
            .unwrap();
        assert_eq!(engine.provider().name(), "dummy");
        let stats = engine.index_stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert!(stats.chunks >= 1);

        let hits = engine.retrieve("axum").await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    fn require_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn build_future_is_send() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::test_default(dir.path());
        let repo = GithubRepo::default();
        let build = ChatEngine::build(&cfg, &cfg.generation, &repo);
        require_send(&build);
        build.await.unwrap();
    }

    #[tokio::test]
    async fn rebuild_leaves_older_engine_index_intact() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::test_default(dir.path());
        std::fs::create_dir_all(&cfg.data_dir).unwrap();
        std::fs::write(cfg.data_dir.join("notes.txt"), "axum routes requests").unwrap();
        let first = ChatEngine::build(&cfg, &cfg.generation, &GithubRepo::default())
            .await
            .unwrap();

        std::fs::remove_file(cfg.data_dir.join("notes.txt")).unwrap();
        let second = ChatEngine::build(&cfg, &cfg.generation, &GithubRepo::default())
            .await
            .unwrap();
        assert_ne!(first.index().dir(), second.index().dir());
        assert_eq!(second.index_stats().await.unwrap().documents, 0);
        assert_eq!(first.retrieve("axum").await.unwrap().len(), 1);

        let first_dir = first.index().dir().to_path_buf();
        drop(first);
        assert!(!first_dir.exists());
    }

    #[tokio::test]
    async fn build_fails_fast_without_api_key() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::test_default(dir.path());
        let mut settings = cfg.generation.clone();
        settings.provider = ModelProvider::OpenAi;
        settings.model = "GPT-4o".into();
        let err = ChatEngine::build(&cfg, &settings, &GithubRepo::default()).await;
        assert!(matches!(err, Err(AppError::Provider(_))));
    }
}
