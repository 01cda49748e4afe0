//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults, so a
//! missing section or a missing file resolves to the same values.
//! The `load` module converts them into the public `types` structs.

use serde::Deserialize;

use crate::settings::GenerationSettings;

// ── Top-level ────────────────────────────────────────────────────────────────

/// Raw TOML shape — serde target before resolution.
#[derive(Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub app: RawApp,
    #[serde(default)]
    pub server: RawServer,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub providers: RawProviders,
    #[serde(default)]
    pub embedding: RawEmbedding,
    #[serde(default)]
    pub retrieval: RawRetrieval,
    #[serde(default)]
    pub memory: RawMemory,
    #[serde(default)]
    pub worker: RawWorker,
    #[serde(default)]
    pub github: RawGithub,
}

#[derive(Deserialize)]
pub(super) struct RawApp {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_index_dir")]
    pub index_dir: String,
}

impl Default for RawApp {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            work_dir: default_work_dir(),
            log_level: default_log_level(),
            log_file: None,
            prompts_dir: default_prompts_dir(),
            data_dir: default_data_dir(),
            index_dir: default_index_dir(),
        }
    }
}

fn default_app_name() -> String {
    "chatrag".to_string()
}

fn default_work_dir() -> String {
    "~/.chatrag".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prompts_dir() -> String {
    "config/prompts".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_index_dir() -> String {
    "index".to_string()
}

// ── Server ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawServer {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
        }
    }
}

pub(super) fn default_bind() -> String {
    "127.0.0.1:7860".to_string()
}

fn default_true() -> bool {
    true
}

// ── Providers ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawEndpoint {
    pub api_base_url: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl RawEndpoint {
    fn new(url: &str) -> Self {
        Self {
            api_base_url: url.to_string(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

fn default_llm_timeout() -> u64 {
    120
}

#[derive(Deserialize)]
pub(super) struct RawAnthropic {
    #[serde(default = "default_anthropic_url")]
    pub api_base_url: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_anthropic_version")]
    pub version: String,
}

impl Default for RawAnthropic {
    fn default() -> Self {
        Self {
            api_base_url: default_anthropic_url(),
            timeout_seconds: default_llm_timeout(),
            version: default_anthropic_version(),
        }
    }
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_anthropic_version() -> String {
    "2023-06-01".to_string()
}

#[derive(Deserialize)]
pub(super) struct RawProviders {
    #[serde(default = "default_ollama")]
    pub ollama: RawEndpoint,
    #[serde(default = "default_openai")]
    pub openai: RawEndpoint,
    #[serde(default = "default_nvidia")]
    pub nvidia: RawEndpoint,
    #[serde(default = "default_huggingface")]
    pub huggingface: RawEndpoint,
    #[serde(default)]
    pub anthropic: RawAnthropic,
}

impl Default for RawProviders {
    fn default() -> Self {
        Self {
            ollama: default_ollama(),
            openai: default_openai(),
            nvidia: default_nvidia(),
            huggingface: default_huggingface(),
            anthropic: RawAnthropic::default(),
        }
    }
}

fn default_ollama() -> RawEndpoint {
    RawEndpoint::new("http://localhost:11434")
}

fn default_openai() -> RawEndpoint {
    RawEndpoint::new("https://api.openai.com/v1/chat/completions")
}

fn default_nvidia() -> RawEndpoint {
    RawEndpoint::new("https://integrate.api.nvidia.com/v1/chat/completions")
}

fn default_huggingface() -> RawEndpoint {
    RawEndpoint::new("https://router.huggingface.co/v1/chat/completions")
}

// ── Retrieval ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawEmbedding {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_url")]
    pub api_base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_seconds: u64,
}

impl Default for RawEmbedding {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_base_url: default_embedding_url(),
            batch_size: default_batch_size(),
            timeout_seconds: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_embedding_timeout() -> u64 {
    60
}

#[derive(Deserialize)]
pub(super) struct RawRetrieval {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RawRetrieval {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
        }
    }
}

fn default_chunk_size() -> usize {
    1024
}

fn default_chunk_overlap() -> usize {
    128
}

fn default_top_k() -> usize {
    4
}

#[derive(Deserialize)]
pub(super) struct RawMemory {
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,
}

impl Default for RawMemory {
    fn default() -> Self {
        Self {
            token_limit: default_token_limit(),
        }
    }
}

fn default_token_limit() -> usize {
    6000
}

// ── Worker ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawWorker {
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_seconds: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RawWorker {
    fn default() -> Self {
        Self {
            reply_timeout_seconds: default_reply_timeout(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_reply_timeout() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    16
}

// ── GitHub ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawGithub {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default = "default_github_api")]
    pub api_base_url: String,
    #[serde(default = "default_exclude_extensions")]
    pub exclude_extensions: Vec<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_github_timeout")]
    pub timeout_seconds: u64,
}

impl Default for RawGithub {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: String::new(),
            api_base_url: default_github_api(),
            exclude_extensions: default_exclude_extensions(),
            max_file_bytes: default_max_file_bytes(),
            timeout_seconds: default_github_timeout(),
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

pub(super) fn default_exclude_extensions() -> Vec<String> {
    [".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_file_bytes() -> u64 {
    512 * 1024
}

fn default_github_timeout() -> u64 {
    30
}
