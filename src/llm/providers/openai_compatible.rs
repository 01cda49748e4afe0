//! OpenAI-compatible chat completion provider (`/v1/chat/completions`).
//!
//! Serves OpenAI itself, NVIDIA NIM and the Hugging Face router: all three
//! speak the same wire format and differ only in URL and key. All OpenAI wire
//! types are private to this module.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use super::{check_status, http_client, probe_client};
use crate::llm::stream::{self, LineEvent, sse_data};
use crate::llm::{ChatMessage, DeltaReceiver, GenerationParams, LlmResponse, LlmUsage, ProviderError};

/// Adapter for any HTTP endpoint implementing `/v1/chat/completions`.
///
/// Constructed per engine reset, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    label: &'static str,
    api_base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// `label` names the backend in logs and health output.
    ///
    /// `api_key` is `None` for keyless endpoints. When present it is sent
    /// as `Authorization: Bearer <key>` on every request.
    pub fn new(
        label: &'static str,
        api_base_url: String,
        model: String,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout_seconds)?,
            label,
            api_base_url,
            model,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// HEAD request to the endpoint. Any HTTP response (including 4xx) means
    /// the server is reachable; only transport failures count as down.
    pub async fn ping(&self) -> Result<(), ProviderError> {
        let mut req = probe_client()?.head(&self.api_base_url);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()
            .await
            .map(|_| ())
            .map_err(|e| ProviderError::Request(format!("unreachable: {e}")))
    }

    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<LlmResponse, ProviderError> {
        let response = self.send(messages, params, false).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        debug!(provider = self.label, choices = parsed.choices.len(), "received LLM response");

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProviderError::Request("empty or missing content in response".into()))?;

        let usage = parsed.usage.map(|u| LlmUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

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

        debug!(
            provider = self.label,
            model = %payload.model,
            temperature = ?payload.temperature,
            messages = messages.len(),
            stream,
            "sending LLM request"
        );
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full LLM request payload");
        }

        let mut req = self.client.post(&self.api_base_url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.api_base_url, error = %e, "LLM HTTP request failed (transport)");
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
) -> ChatCompletionRequest<'a> {
    // Some models (gpt-5 family) do not accept a temperature parameter.
    let temperature = if model.starts_with("gpt-5") {
        None
    } else {
        Some(params.temperature)
    };
    ChatCompletionRequest {
        model,
        messages,
        temperature,
        max_tokens: params.max_tokens,
        top_p: params.top_p,
        stream,
    }
}

fn parse_stream_line(line: &str) -> LineEvent {
    let Some(data) = sse_data(line) else {
        return LineEvent::Skip;
    };
    if data.trim() == "[DONE]" {
        return LineEvent::Done;
    }
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!(error = %e, "skipping unparseable SSE payload");
            return LineEvent::Skip;
        }
    };
    if let Some(err) = chunk.error {
        return LineEvent::Fail(err.message);
    }
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
        .map_or(LineEvent::Skip, LineEvent::Delta)
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_sampling_params() {
        let msgs = [ChatMessage::user("hi")];
        let params = GenerationParams { max_tokens: 512, ..GenerationParams::default() };
        let body = serde_json::to_value(request_body("gpt-4o", &msgs, &params, false)).unwrap();
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["stream"], false);
        assert!(body.get("temperature").is_some());
        assert!(body.get("top_p").is_some());
    }

    #[test]
    fn gpt5_omits_temperature() {
        let msgs = [ChatMessage::user("hi")];
        let body =
            serde_json::to_value(request_body("gpt-5-mini", &msgs, &GenerationParams::default(), false))
                .unwrap();
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn sse_lines_parse_to_events() {
        assert_eq!(
            parse_stream_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            LineEvent::Delta("Hel".into())
        );
        assert_eq!(
            parse_stream_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            LineEvent::Skip
        );
        assert_eq!(parse_stream_line("data: [DONE]"), LineEvent::Done);
        assert_eq!(parse_stream_line(": keep-alive"), LineEvent::Skip);
    }

    #[test]
    fn sse_error_payload_fails_stream() {
        assert_eq!(
            parse_stream_line(r#"data: {"error":{"message":"rate limited"}}"#),
            LineEvent::Fail("rate limited".into())
        );
    }
}
