//! Incremental line framing for streaming chat responses.
//!
//! Both SSE (`data: {...}`) and NDJSON bodies arrive in arbitrary network
//! chunks; a line can be split anywhere, including inside a UTF-8 sequence.
//! [`LineBuffer`] reassembles complete lines and [`pump`] drives a response
//! body into a delta channel.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use super::ProviderError;

/// Receiving end of a streaming completion.
pub type DeltaReceiver = mpsc::Receiver<Result<String, ProviderError>>;

pub(crate) const DELTA_CHANNEL_CAPACITY: usize = 64;

/// Byte buffer that yields only complete `\n`-terminated lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append `chunk` and drain every complete line (without `\r\n`/`\n`).
    /// Blank lines are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.trim_end_matches('\r');
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Whatever is left once the body ends without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// Payload of an SSE `data:` line; other SSE fields yield `None`.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
}

/// Outcome of parsing one framed line.
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    Delta(String),
    Done,
    Skip,
    Fail(String),
}

/// Spawn a task that frames `response` into lines, parses each with `parse`,
/// and forwards deltas. The channel closes on `Done`, on end of body, on
/// failure, or when the receiver is dropped.
pub(crate) fn pump<F>(response: reqwest::Response, mut parse: F) -> DeltaReceiver
where
    F: FnMut(&str) -> LineEvent + Send + 'static,
{
    let (tx, rx) = mpsc::channel(DELTA_CHANNEL_CAPACITY);
    let mut body = response.bytes_stream();

    tokio::spawn(async move {
        let mut lines = LineBuffer::default();
        while let Some(item) = body.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = tx.send(Err(ProviderError::Stream(e.to_string()))).await;
                    return;
                }
            };
            for line in lines.push(&chunk) {
                if !forward(&tx, parse(&line)).await {
                    return;
                }
            }
        }
        if let Some(line) = lines.finish() {
            forward(&tx, parse(&line)).await;
        }
    });

    rx
}

/// Returns `false` once the stream should stop.
async fn forward(tx: &mpsc::Sender<Result<String, ProviderError>>, event: LineEvent) -> bool {
    match event {
        LineEvent::Delta(text) => tx.send(Ok(text)).await.is_ok(),
        LineEvent::Skip => true,
        LineEvent::Done => false,
        LineEvent::Fail(message) => {
            debug!(%message, "stream reported an error");
            let _ = tx.send(Err(ProviderError::Stream(message))).await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"data: {\"a\":").is_empty());
        let lines = buf.push(b"1}\n\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"a\":1}"]);
        assert_eq!(buf.push(b"NE]\r\n"), vec!["data: [DONE]"]);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn keeps_multibyte_characters_split_between_chunks() {
        let text = "{\"content\":\"héllo\"}\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut buf = LineBuffer::default();
        assert!(buf.push(&text[..split]).is_empty());
        assert_eq!(buf.push(&text[split..]), vec!["{\"content\":\"héllo\"}"]);
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut buf = LineBuffer::default();
        buf.push(b"{\"done\":true}");
        assert_eq!(buf.finish().as_deref(), Some("{\"done\":true}"));
    }

    #[test]
    fn sse_data_strips_prefix() {
        assert_eq!(sse_data("data: {}"), Some("{}"));
        assert_eq!(sse_data("data:{}"), Some("{}"));
        assert_eq!(sse_data("event: message_stop"), None);
    }
}
