//! Anthropic Messages API provider (`POST /v1/messages`).
//!
//! The Messages API takes the system prompt as a top-level field and requires
//! strictly alternating user/assistant turns starting with a user turn;
//! [`split_messages`] reshapes the generic message list accordingly.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use super::{check_status, http_client, probe_client};
use crate::llm::stream::{self, LineEvent, sse_data};
use crate::llm::{ChatMessage, DeltaReceiver, GenerationParams, LlmResponse, LlmUsage, ProviderError, Role};

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_base_url: String,
    version: String,
    model: String,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(
        api_base_url: String,
        version: String,
        model: String,
        timeout_seconds: u64,
        api_key: String,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(timeout_seconds)?,
            api_base_url,
            version,
            model,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn ping(&self) -> Result<(), ProviderError> {
        probe_client()?
            .head(&self.api_base_url)
            .send()
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

        let parsed = response.json::<MessagesResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize anthropic response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<String>()
            .trim()
            .to_string();
        if text.is_empty() {
            return Err(ProviderError::Request("empty or missing content in response".into()));
        }

        let usage = parsed.usage.map(|u| LlmUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
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

        debug!(model = %self.model, turns = payload.messages.len(), stream, "sending anthropic request");
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string_pretty(&payload)
                .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(payload = %json, "full anthropic request payload");
        }

        let response = self
            .client
            .post(&self.api_base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.api_base_url, error = %e, "anthropic HTTP request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;
        check_status(response).await
    }
}

/// Lift system messages into a single system string and merge consecutive
/// same-role turns. Leading assistant turns are dropped.
fn split_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<WireMessage>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let system = (!system.is_empty()).then(|| system.join("\n\n"));

    let mut turns: Vec<WireMessage> = Vec::new();
    for m in messages.iter().filter(|m| m.role != Role::System) {
        if turns.is_empty() && m.role == Role::Assistant {
            continue;
        }
        match turns.last_mut() {
            Some(last) if last.role == m.role.as_str() => {
                last.content.push_str("\n\n");
                last.content.push_str(&m.content);
            }
            _ => turns.push(WireMessage {
                role: m.role.as_str(),
                content: m.content.clone(),
            }),
        }
    }
    (system, turns)
}

fn request_body<'a>(
    model: &'a str,
    messages: &[ChatMessage],
    params: &GenerationParams,
    stream: bool,
) -> MessagesRequest<'a> {
    let (system, messages) = split_messages(messages);
    MessagesRequest {
        model,
        system,
        messages,
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        stream,
    }
}

fn parse_stream_line(line: &str) -> LineEvent {
    // `event:` lines repeat the `type` field of the following data line.
    let Some(data) = sse_data(line) else {
        return LineEvent::Skip;
    };
    let event: StreamEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            debug!(error = %e, "skipping unparseable anthropic event");
            return LineEvent::Skip;
        }
    };
    match event.kind.as_str() {
        "content_block_delta" => event
            .delta
            .and_then(|d| d.text)
            .filter(|t| !t.is_empty())
            .map_or(LineEvent::Skip, LineEvent::Delta),
        "message_stop" => LineEvent::Done,
        "error" => LineEvent::Fail(
            event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown stream error".to_string()),
        ),
        _ => LineEvent::Skip,
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_is_lifted_out_of_messages() {
        let msgs = [
            ChatMessage::system("persona"),
            ChatMessage::user("q1"),
            ChatMessage::assistant("a1"),
            ChatMessage::user("q2"),
        ];
        let body = serde_json::to_value(request_body("claude-3-haiku-20240307", &msgs, &GenerationParams::default(), false))
            .unwrap();
        assert_eq!(body["system"], "persona");
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 2048);
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn turns_alternate_and_start_with_user() {
        let msgs = [
            ChatMessage::assistant("stray"),
            ChatMessage::user("a"),
            ChatMessage::user("b"),
            ChatMessage::assistant("c"),
        ];
        let (system, turns) = split_messages(&msgs);
        assert!(system.is_none());
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, "user");
        assert_eq!(turns[0].content, "a\n\nb");
        assert_eq!(turns[1].role, "assistant");
    }

    #[test]
    fn stream_events_map_to_line_events() {
        assert_eq!(
            parse_stream_line(
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#
            ),
            LineEvent::Delta("Hi".into())
        );
        assert_eq!(parse_stream_line("event: content_block_delta"), LineEvent::Skip);
        assert_eq!(parse_stream_line(r#"data: {"type":"ping"}"#), LineEvent::Skip);
        assert_eq!(parse_stream_line(r#"data: {"type":"message_stop"}"#), LineEvent::Done);
        assert_eq!(
            parse_stream_line(r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#),
            LineEvent::Fail("Overloaded".into())
        );
    }
}
