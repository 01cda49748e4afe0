//! Dummy LLM provider — echoes the last user message prefixed with `[echo]`.
//! Used for testing the full chat round-trip without a model server.

use tokio::sync::mpsc;

use crate::llm::stream::DELTA_CHANNEL_CAPACITY;
use crate::llm::{ChatMessage, DeltaReceiver, GenerationParams, LlmResponse, ProviderError, last_user_content};

#[derive(Debug, Clone)]
pub struct DummyProvider {
    model: String,
}

impl DummyProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<LlmResponse, ProviderError> {
        Ok(LlmResponse {
            text: echo(messages),
            usage: None,
        })
    }

    /// Emits the echo word by word; concatenating the deltas gives the
    /// same text as [`complete`](Self::complete).
    pub async fn stream(
        &self,
        messages: &[ChatMessage],
        _params: &GenerationParams,
    ) -> Result<DeltaReceiver, ProviderError> {
        let text = echo(messages);
        let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            for word in text.split_inclusive(' ') {
                if tx.send(Ok(word.to_string())).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

fn echo(messages: &[ChatMessage]) -> String {
    format!("[echo] {}", last_user_content(messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GenerationParams {
        GenerationParams::default()
    }

    #[tokio::test]
    async fn complete_prefixes_echo() {
        let p = DummyProvider::new("echo");
        let msgs = [ChatMessage::system("ignored"), ChatMessage::user("hello")];
        assert_eq!(p.complete(&msgs, &params()).await.unwrap().text, "[echo] hello");
    }

    #[tokio::test]
    async fn complete_without_user_message() {
        let p = DummyProvider::new("echo");
        assert_eq!(p.complete(&[], &params()).await.unwrap().text, "[echo] ");
    }

    #[tokio::test]
    async fn stream_concatenates_to_complete_text() {
        let p = DummyProvider::new("echo");
        let msgs = [ChatMessage::user("two words")];
        let mut rx = p.stream(&msgs, &params()).await.unwrap();
        let mut out = String::new();
        let mut parts = 0;
        while let Some(delta) = rx.recv().await {
            out.push_str(&delta.unwrap());
            parts += 1;
        }
        assert_eq!(out, "[echo] two words");
        assert_eq!(parts, 3);
    }
}
