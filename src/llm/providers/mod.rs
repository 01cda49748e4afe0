//! Concrete provider backends and the factory that picks one.

pub mod anthropic;
pub mod dummy;
pub mod ollama;
pub mod openai_compatible;

use std::time::Duration;

use reqwest::Client;
use tracing::error;

use crate::catalog::ModelProvider;
use crate::config::{ApiKeys, ProvidersConfig};
use crate::llm::{LlmProvider, ProviderError};

use anthropic::AnthropicProvider;
use dummy::DummyProvider;
use ollama::OllamaProvider;
use openai_compatible::OpenAiCompatibleProvider;

/// Build the backend for `provider`, serving `model_id`.
///
/// Hosted providers that need a key fail here with
/// [`ProviderError::MissingApiKey`] rather than on the first request.
pub fn build(
    provider: ModelProvider,
    model_id: &str,
    cfg: &ProvidersConfig,
    keys: &ApiKeys,
) -> Result<LlmProvider, ProviderError> {
    let model = model_id.to_string();
    match provider {
        ModelProvider::Dummy => Ok(LlmProvider::Dummy(DummyProvider::new(model))),
        ModelProvider::Ollama => Ok(LlmProvider::Ollama(OllamaProvider::new(
            cfg.ollama.api_base_url.clone(),
            model,
            cfg.ollama.timeout_seconds,
        )?)),
        ModelProvider::OpenAi => {
            let key = require_key(&keys.openai, ApiKeys::OPENAI)?;
            Ok(LlmProvider::OpenAiCompatible(OpenAiCompatibleProvider::new(
                "openai",
                cfg.openai.api_base_url.clone(),
                model,
                cfg.openai.timeout_seconds,
                Some(key),
            )?))
        }
        ModelProvider::NvidiaNim => {
            let key = require_key(&keys.nvidia, ApiKeys::NVIDIA)?;
            Ok(LlmProvider::OpenAiCompatible(OpenAiCompatibleProvider::new(
                "nvidia-nim",
                cfg.nvidia.api_base_url.clone(),
                model,
                cfg.nvidia.timeout_seconds,
                Some(key),
            )?))
        }
        // Public models work without a token; gated ones need HF_TOKEN.
        ModelProvider::HuggingFace => Ok(LlmProvider::OpenAiCompatible(OpenAiCompatibleProvider::new(
            "huggingface",
            cfg.huggingface.api_base_url.clone(),
            model,
            cfg.huggingface.timeout_seconds,
            keys.huggingface.clone(),
        )?)),
        ModelProvider::Anthropic => {
            let key = require_key(&keys.anthropic, ApiKeys::ANTHROPIC)?;
            Ok(LlmProvider::Anthropic(AnthropicProvider::new(
                cfg.anthropic.api_base_url.clone(),
                cfg.anthropic.version.clone(),
                model,
                cfg.anthropic.timeout_seconds,
                key,
            )?))
        }
    }
}

fn require_key(key: &Option<String>, env_var: &str) -> Result<String, ProviderError> {
    key.clone().ok_or_else(|| ProviderError::MissingApiKey(env_var.to_string()))
}

pub(crate) fn http_client(timeout_seconds: u64) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))
}

/// Client for reachability probes; hard 5-second timeout regardless of config.
pub(crate) fn probe_client() -> Result<Client, ProviderError> {
    http_client(5)
}

/// Consume the response and return it if successful, or a structured error.
///
/// Understands the OpenAI/Anthropic envelope (`{"error": {"message": ...}}`)
/// and Ollama's flat `{"error": "..."}`.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = match error_message(&body) {
        Some(detail) => format!("HTTP {status}: {detail}"),
        None => format!("HTTP {status}: {body}"),
    };

    error!(%status, %message, "LLM request returned HTTP error");
    Err(ProviderError::Request(message))
}

fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let err = value.get("error")?;
    if let Some(s) = err.as_str() {
        return Some(s.to_string());
    }
    let message = err.get("message")?.as_str()?;
    let code = err
        .get("code")
        .or_else(|| err.get("type"))
        .map(|v| match v {
            serde_json::Value::String(s) => format!(" [code={s}]"),
            other => format!(" [code={other}]"),
        })
        .unwrap_or_default();
    Some(format!("{message}{code}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn providers_config() -> ProvidersConfig {
        let dir = tempfile::TempDir::new().unwrap();
        crate::config::Config::test_default(dir.path()).providers
    }

    #[test]
    fn dummy_needs_no_key() {
        let p = build(ModelProvider::Dummy, "echo", &providers_config(), &ApiKeys::default()).unwrap();
        assert_eq!(p.name(), "dummy");
        assert_eq!(p.model(), "echo");
    }

    #[test]
    fn hosted_providers_require_keys() {
        let cfg = providers_config();
        let keys = ApiKeys::default();
        for (provider, var) in [
            (ModelProvider::OpenAi, "OPENAI_API_KEY"),
            (ModelProvider::NvidiaNim, "NVIDIA_API_KEY"),
            (ModelProvider::Anthropic, "ANTHROPIC_API_KEY"),
        ] {
            match build(provider, "m", &cfg, &keys) {
                Err(ProviderError::MissingApiKey(name)) => assert_eq!(name, var),
                other => panic!("expected missing key for {provider}, got {other:?}"),
            }
        }
    }

    #[test]
    fn huggingface_token_is_optional() {
        let p = build(
            ModelProvider::HuggingFace,
            "google/gemma-2-9b-it",
            &providers_config(),
            &ApiKeys::default(),
        )
        .unwrap();
        assert_eq!(p.name(), "huggingface");
    }

    #[test]
    fn ollama_builds_offline() {
        let p = build(ModelProvider::Ollama, "codestral:latest", &providers_config(), &ApiKeys::default())
            .unwrap();
        assert_eq!(p.name(), "ollama");
    }

    #[tokio::test]
    async fn ping_separates_offline_from_reachable() {
        let mut cfg = providers_config();
        cfg.ollama.api_base_url = "http://127.0.0.1:9".into();
        let ollama = build(ModelProvider::Ollama, "codestral:latest", &cfg, &ApiKeys::default()).unwrap();
        assert!(matches!(ollama.ping().await, Err(ProviderError::Request(_))));

        let dummy = build(ModelProvider::Dummy, "echo", &cfg, &ApiKeys::default()).unwrap();
        assert!(dummy.ping().await.is_ok());
    }

    #[test]
    fn error_message_reads_both_envelopes() {
        assert_eq!(
            error_message(r#"{"error":{"message":"bad key","code":"invalid_api_key"}}"#).as_deref(),
            Some("bad key [code=invalid_api_key]")
        );
        assert_eq!(
            error_message(r#"{"error":"model 'x' not found"}"#).as_deref(),
            Some("model 'x' not found")
        );
        assert_eq!(
            error_message(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
                .as_deref(),
            Some("Overloaded [code=overloaded_error]")
        );
        assert_eq!(error_message("<html>"), None);
    }
}
