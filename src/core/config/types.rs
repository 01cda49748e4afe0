//! Public configuration types.
//!
//! These are the resolved, ready-to-use structs the rest of the crate
//! consumes. Raw TOML deserialization types live in `raw.rs`.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::settings::{GenerationSettings, GithubRepo};

// ── Server ───────────────────────────────────────────────────────────────────

/// Axum web channel configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub enabled: bool,
    /// Socket address to bind the listener to.
    pub bind: String,
}

// ── Providers ────────────────────────────────────────────────────────────────

/// One HTTP inference endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Full chat endpoint URL (Ollama: server root).
    pub api_base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_base_url: String,
    pub timeout_seconds: u64,
    /// Value of the `anthropic-version` header.
    pub version: String,
}

/// Populated from `[providers.*]`.
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub ollama: EndpointConfig,
    pub openai: EndpointConfig,
    pub nvidia: EndpointConfig,
    pub huggingface: EndpointConfig,
    pub anthropic: AnthropicConfig,
}

/// Secrets read from the environment. Never part of the TOML.
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub nvidia: Option<String>,
    pub huggingface: Option<String>,
    pub github: Option<String>,
    pub embedding: Option<String>,
}

impl ApiKeys {
    pub const OPENAI: &'static str = "OPENAI_API_KEY";
    pub const ANTHROPIC: &'static str = "ANTHROPIC_API_KEY";
    pub const NVIDIA: &'static str = "NVIDIA_API_KEY";
    pub const HUGGINGFACE: &'static str = "HF_TOKEN";
    pub const GITHUB: &'static str = "GITHUB_PAT";
    pub const EMBEDDING: &'static str = "EMBEDDING_API_KEY";

    pub fn from_env() -> Self {
        let read = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            openai: read(Self::OPENAI),
            anthropic: read(Self::ANTHROPIC),
            nvidia: read(Self::NVIDIA),
            huggingface: read(Self::HUGGINGFACE),
            github: read(Self::GITHUB),
            embedding: read(Self::EMBEDDING),
        }
    }
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = |k: &Option<String>| if k.is_some() { "set" } else { "unset" };
        f.debug_struct("ApiKeys")
            .field("openai", &mark(&self.openai))
            .field("anthropic", &mark(&self.anthropic))
            .field("nvidia", &mark(&self.nvidia))
            .field("huggingface", &mark(&self.huggingface))
            .field("github", &mark(&self.github))
            .field("embedding", &mark(&self.embedding))
            .finish()
    }
}

// ── Retrieval ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    /// No embedding service; retrieval falls back to BM25.
    None,
    Ollama,
    OpenAi,
}

impl FromStr for EmbeddingProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" => Ok(EmbeddingProviderKind::None),
            "ollama" => Ok(EmbeddingProviderKind::Ollama),
            "openai" => Ok(EmbeddingProviderKind::OpenAi),
            other => Err(format!("unknown embedding provider '{other}'")),
        }
    }
}

/// Populated from `[embedding]`.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    /// Ollama: server root. OpenAI-compatible: full `/v1/embeddings` URL.
    pub api_base_url: String,
    pub batch_size: usize,
    pub timeout_seconds: u64,
}

/// Populated from `[retrieval]`.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Estimated tokens of chat history replayed to the model.
    pub token_limit: usize,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub reply_timeout_seconds: u64,
    pub queue_capacity: usize,
}

/// Populated from `[github]`.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// Initial repository; the UI can change it at runtime.
    pub repo: GithubRepo,
    pub api_base_url: String,
    /// Lowercase path suffixes never fetched.
    pub exclude_extensions: Vec<String>,
    pub max_file_bytes: u64,
    pub timeout_seconds: u64,
}

// ── Top-level ────────────────────────────────────────────────────────────────

/// Resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub work_dir: PathBuf,
    pub log_level: String,
    /// Append-mode log file; stderr when unset.
    pub log_file: Option<PathBuf>,
    pub prompts_dir: PathBuf,
    /// Uploaded and local documents.
    pub data_dir: PathBuf,
    /// Holds `chunks.db`.
    pub index_dir: PathBuf,
    pub server: ServerConfig,
    /// Initial generation settings shown in the UI.
    pub generation: GenerationSettings,
    pub providers: ProvidersConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub memory: MemoryConfig,
    pub worker: WorkerConfig,
    pub github: GithubConfig,
    pub keys: ApiKeys,
}
