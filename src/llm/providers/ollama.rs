//! Native Ollama chat provider (`POST /api/chat`).
//!
//! Uses the native API rather than Ollama's OpenAI shim so that `num_ctx`
//! (context window) and `num_predict` (max tokens) reach the model runner.
//! Streaming responses are NDJSON, one JSON object per line.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use super::{check_status, http_client, probe_client};
use crate::llm::stream::{self, LineEvent};
use crate::llm::{ChatMessage, DeltaReceiver, GenerationParams, LlmResponse, LlmUsage, ProviderError};

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    /// `base_url` is the server root, e.g. `http://localhost:11434`.
    pub fn new(base_url: String, model: String, timeout_seconds: u64) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout_seconds)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// `GET /api/tags`; any HTTP answer means the server is up.
    pub async fn ping(&self) -> Result<(), ProviderError> {
        probe_client()?
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| ProviderError::Request(format!("ollama unreachable at {}: {e}", self.base_url)))
    }

    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<LlmResponse, ProviderError> {
        let response = self.send(messages, params, false).await?;

        let parsed = response.json::<ChatResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize ollama response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        let text = parsed
            .message
            .map(|m| m.content.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Request("empty or missing content in response".into()))?;

        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (None, None) => None,
            (input, output) => Some(LlmUsage {
                input_tokens: input.unwrap_or(0),
                output_tokens: output.unwrap_or(0),
            }),
        };
        debug!(?usage, "received ollama response");

        Ok(LlmResponse { text, usage })
    }

    pub async fn stream(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<DeltaReceiver, ProviderError> {
        let response = self.send(messages, params, true).await?;
        Ok(stream::pump(response, parse_stream_line))
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let payload = request_body(&self.model, messages, params, stream);
        let url = format!("{}/api/chat", self.base_url);

        debug!(model = %self.model, messages = messages.len(), stream, "sending ollama request");
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full ollama request payload");
        }

        let response = self.client.post(&url).json(&payload).send().await.map_err(|e| {
            error!(%url, error = %e, "ollama HTTP request failed (transport)");
            ProviderError::Request(e.to_string())
        })?;
        check_status(response).await
    }
}

fn request_body<'a>(
    model: &'a str,
    messages: &'a [ChatMessage],
    params: &GenerationParams,
    stream: bool,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages,
        stream,
        options: Options {
            temperature: params.temperature,
            num_predict: params.max_tokens,
            top_p: params.top_p,
            num_ctx: params.context_window,
        },
    }
}

fn parse_stream_line(line: &str) -> LineEvent {
    let chunk: StreamChunk = match serde_json::from_str(line) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!(error = %e, "skipping unparseable ollama stream line");
            return LineEvent::Skip;
        }
    };
    if let Some(err) = chunk.error {
        return LineEvent::Fail(err);
    }
    match chunk.message.map(|m| m.content).filter(|c| !c.is_empty()) {
        Some(content) => LineEvent::Delta(content),
        None if chunk.done => LineEvent::Done,
        None => LineEvent::Skip,
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
    num_ctx: u32,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_maps_params_to_ollama_options() {
        let msgs = [ChatMessage::system("s"), ChatMessage::user("q")];
        let params = GenerationParams {
            temperature: 0.5,
            max_tokens: 300,
            top_p: 0.8,
            context_window: 8192,
        };
        let body = serde_json::to_value(request_body("codestral:latest", &msgs, &params, true)).unwrap();
        assert_eq!(body["model"], "codestral:latest");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["options"]["num_predict"], 300);
        assert_eq!(body["options"]["num_ctx"], 8192);
        assert_eq!(body["options"]["temperature"], 0.5);
    }

    #[test]
    fn stream_lines_yield_deltas_then_done() {
        assert_eq!(
            parse_stream_line(r#"{"message":{"role":"assistant","content":"fn"},"done":false}"#),
            LineEvent::Delta("fn".into())
        );
        assert_eq!(
            parse_stream_line(r#"{"message":{"role":"assistant","content":""},"done":true,"eval_count":9}"#),
            LineEvent::Done
        );
        assert_eq!(parse_stream_line("not json"), LineEvent::Skip);
    }

    #[test]
    fn stream_error_line_fails() {
        assert_eq!(
            parse_stream_line(r#"{"error":"model not found"}"#),
            LineEvent::Fail("model not found".into())
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let p = OllamaProvider::new("http://localhost:11434/".into(), "m".into(), 5).unwrap();
        assert_eq!(p.base_url, "http://localhost:11434");
    }
}
