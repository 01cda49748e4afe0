//! Embedding service clients.
//!
//! Vectors come from an external service: Ollama's native `/api/embed` or
//! any OpenAI-compatible `/v1/embeddings`. With `Embedder::None` retrieval
//! falls back to BM25 keyword search.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub enum Embedder {
    None,
    Ollama(HttpEmbedder),
    OpenAiCompatible(HttpEmbedder),
}

#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    batch_size: usize,
}

impl Embedder {
    pub fn from_config(cfg: &EmbeddingConfig, api_key: Option<String>) -> Result<Self, AppError> {
        let base = cfg.api_base_url.trim_end_matches('/');
        let http = |url: String| -> Result<HttpEmbedder, AppError> {
            let client = Client::builder()
                .timeout(Duration::from_secs(cfg.timeout_seconds))
                .build()
                .map_err(|e| AppError::Embedding(format!("failed to build HTTP client: {e}")))?;
            Ok(HttpEmbedder {
                client,
                url,
                model: cfg.model.clone(),
                api_key: api_key.clone(),
                batch_size: cfg.batch_size.max(1),
            })
        };
        Ok(match cfg.provider {
            EmbeddingProviderKind::None => Embedder::None,
            EmbeddingProviderKind::Ollama => Embedder::Ollama(http(format!("{base}/api/embed"))?),
            EmbeddingProviderKind::OpenAi => {
                let url = if base.ends_with("/embeddings") {
                    base.to_string()
                } else {
                    format!("{base}/v1/embeddings")
                };
                Embedder::OpenAiCompatible(http(url)?)
            }
        })
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Embedder::None)
    }

    /// Short label for logs and the health endpoint.
    pub fn describe(&self) -> String {
        match self {
            Embedder::None => "none (bm25)".to_string(),
            Embedder::Ollama(h) => format!("ollama:{}", h.model),
            Embedder::OpenAiCompatible(h) => format!("openai:{}", h.model),
        }
    }

    /// One vector per input, in input order. Empty when disabled.
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let (http, ollama) = match self {
            Embedder::None => return Ok(Vec::new()),
            Embedder::Ollama(h) => (h, true),
            Embedder::OpenAiCompatible(h) => (h, false),
        };

        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(http.batch_size) {
            let mut got = if ollama {
                http.post::<OllamaResponse>(batch).await?.embeddings
            } else {
                http.post::<OpenAiResponse>(batch).await?.into_vectors()
            };
            if got.len() != batch.len() {
                return Err(AppError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    got.len()
                )));
            }
            vectors.append(&mut got);
        }
        debug!(count = vectors.len(), embedder = %self.describe(), "embedded inputs");
        Ok(vectors)
    }

    /// `None` when no embedder is configured.
    pub async fn embed_query(&self, query: &str) -> Result<Option<Vec<f32>>, AppError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        Ok(self.embed(&[query.to_string()]).await?.into_iter().next())
    }
}

impl HttpEmbedder {
    async fn post<T: for<'de> Deserialize<'de>>(&self, batch: &[String]) -> Result<T, AppError> {
        let body = EmbedRequest { model: &self.model, input: batch };
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req.send().await.map_err(|e| {
            error!(url = %self.url, error = %e, "embedding request failed (transport)");
            AppError::Embedding(format!("request to {} failed: {e}", self.url))
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!("HTTP {status}: {text}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Embedding(format!("failed to parse embedding response: {e}")))
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl OpenAiResponse {
    /// `data` is not guaranteed to be in input order; `index` is.
    fn into_vectors(mut self) -> Vec<Vec<f32>> {
        self.data.sort_by_key(|d| d.index);
        self.data.into_iter().map(|d| d.embedding).collect()
    }
}
