//! LLM provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! Async is delegated to the underlying provider. `complete` and `stream` are
//! `async fn` on the enum so callers need no trait-object machinery.

pub mod providers;
pub mod stream;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use stream::DeltaReceiver;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("missing API key: set {0}")]
    MissingApiKey(String),
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider stream failed: {0}")]
    Stream(String),
}

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One chat turn. Serializes to the `{role, content}` shape shared by the
/// OpenAI and Ollama chat APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Sampling knobs forwarded to every backend that understands them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub context_window: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { temperature: 0.75, max_tokens: 2048, top_p: 0.9, context_window: 4096 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Option<LlmUsage>,
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
/// Adding a backend = new module + new variant + new match arms.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    Ollama(providers::ollama::OllamaProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
    Anthropic(providers::anthropic::AnthropicProvider),
}

impl LlmProvider {
    /// One non-streaming round-trip over the full message list.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<LlmResponse, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.complete(messages, params).await,
            LlmProvider::Ollama(p) => p.complete(messages, params).await,
            LlmProvider::OpenAiCompatible(p) => p.complete(messages, params).await,
            LlmProvider::Anthropic(p) => p.complete(messages, params).await,
        }
    }

    /// Start a streaming completion. The receiver yields text deltas and
    /// closes when the model finishes; a transport failure arrives as `Err`.
    pub async fn stream(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<DeltaReceiver, ProviderError> {
        match self {
            LlmProvider::Dummy(p) => p.stream(messages, params).await,
            LlmProvider::Ollama(p) => p.stream(messages, params).await,
            LlmProvider::OpenAiCompatible(p) => p.stream(messages, params).await,
            LlmProvider::Anthropic(p) => p.stream(messages, params).await,
        }
    }

    /// Reachability probe; any HTTP answer counts as reachable.
    pub async fn ping(&self) -> Result<(), ProviderError> {
        match self {
            LlmProvider::Dummy(_) => Ok(()),
            LlmProvider::Ollama(p) => p.ping().await,
            LlmProvider::OpenAiCompatible(p) => p.ping().await,
            LlmProvider::Anthropic(p) => p.ping().await,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            LlmProvider::Dummy(p) => p.model(),
            LlmProvider::Ollama(p) => p.model(),
            LlmProvider::OpenAiCompatible(p) => p.model(),
            LlmProvider::Anthropic(p) => p.model(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::Ollama(_) => "ollama",
            LlmProvider::OpenAiCompatible(p) => p.label(),
            LlmProvider::Anthropic(_) => "anthropic",
        }
    }
}

/// Text of the most recent user message, or `""`.
pub fn last_user_content(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_to_wire_shape() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn last_user_content_skips_assistant_turns() {
        let msgs = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
        ];
        assert_eq!(last_user_content(&msgs), "first");
        assert_eq!(last_user_content(&[]), "");
    }

    #[test]
    fn missing_key_names_the_variable() {
        let e = ProviderError::MissingApiKey("NVIDIA_API_KEY".into());
        assert_eq!(e.to_string(), "missing API key: set NVIDIA_API_KEY");
    }
}
