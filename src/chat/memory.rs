//! Token-limited chat memory.
//!
//! [`ChatMemory::get`] returns the most recent suffix that fits the token
//! limit. `put` drops older messages that can no longer appear in that
//! window, so the buffer stays bounded. Token counts are estimated, not
//! tokenized: one token per four characters, rounded up.

use crate::llm::{ChatMessage, Role};
use crate::settings::GenerationSettings;

#[derive(Debug, Clone)]
pub struct ChatMemory {
    token_limit: usize,
    messages: Vec<ChatMessage>,
}

impl ChatMemory {
    pub fn new(token_limit: usize) -> Self {
        Self { token_limit, messages: Vec::new() }
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    pub fn put(&mut self, message: ChatMessage) {
        self.messages.push(message);
        let keep_from = self.window_start();
        if keep_from > 0 {
            self.messages.drain(..keep_from);
        }
    }

    /// The newest messages whose estimated tokens fit the limit.
    ///
    /// The window never starts with an assistant message: a reply whose
    /// question fell outside the limit is dropped with it.
    pub fn get(&self) -> Vec<ChatMessage> {
        self.messages[self.window_start()..].to_vec()
    }

    /// Index of the first message in the window. Messages before it are
    /// never returned again: the window only moves forward.
    fn window_start(&self) -> usize {
        let mut used = 0usize;
        let mut start = self.messages.len();
        for (i, msg) in self.messages.iter().enumerate().rev() {
            let cost = estimate_tokens(&msg.content);
            if used + cost > self.token_limit {
                break;
            }
            used += cost;
            start = i;
        }

        let skip = self.messages[start..]
            .iter()
            .take_while(|m| m.role == Role::Assistant)
            .count();
        start + skip
    }

    /// Every retained message.
    pub fn all(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// The configured limit, capped so history plus the reply fits the context
/// window when `context_window > max_tokens`.
pub fn token_limit_for(settings: &GenerationSettings, configured: usize) -> usize {
    let room = settings.context_window.saturating_sub(settings.max_tokens) as usize;
    if room > 0 { configured.min(room) } else { configured }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(tokens: usize) -> String {
        "abcd".repeat(tokens)
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("ééééé"), 2);
    }

    #[test]
    fn get_returns_everything_under_limit() {
        let mut mem = ChatMemory::new(100);
        mem.put(ChatMessage::user("hi"));
        mem.put(ChatMessage::assistant("hello"));
        assert_eq!(mem.get().len(), 2);
        assert_eq!(mem.len(), 2);
    }

    #[test]
    fn get_keeps_newest_messages() {
        let mut mem = ChatMemory::new(10);
        mem.put(ChatMessage::user(text(4)));
        mem.put(ChatMessage::assistant(text(4)));
        mem.put(ChatMessage::user(text(3)));
        mem.put(ChatMessage::assistant(text(3)));

        let window = mem.get();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role, Role::User);
        assert_eq!(window[0].content, text(3));
        assert_eq!(mem.all(), window.as_slice());
    }

    #[test]
    fn put_drops_messages_outside_the_window() {
        let mut mem = ChatMemory::new(6);
        for i in 0..100 {
            mem.put(ChatMessage::user(format!("q{i:02}")));
            mem.put(ChatMessage::assistant(format!("a{i:02}")));
        }
        // Each message is one token; six fit.
        assert_eq!(mem.len(), 6);
        assert_eq!(mem.all()[0], ChatMessage::user("q97"));
        assert_eq!(mem.get().len(), 6);
    }

    #[test]
    fn window_never_starts_with_assistant() {
        let mut mem = ChatMemory::new(8);
        mem.put(ChatMessage::user(text(5)));
        mem.put(ChatMessage::assistant(text(2)));
        mem.put(ChatMessage::user(text(2)));
        mem.put(ChatMessage::assistant(text(2)));

        // The 2-token assistant reply fits but its question does not.
        let window = mem.get();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role, Role::User);
        assert_eq!(mem.len(), 2);
    }

    #[test]
    fn oversized_latest_message_yields_empty_window() {
        let mut mem = ChatMemory::new(2);
        mem.put(ChatMessage::user(text(3)));
        assert!(mem.get().is_empty());
        assert!(mem.is_empty());
    }

    #[test]
    fn reset_clears() {
        let mut mem = ChatMemory::new(10);
        mem.put(ChatMessage::user("x"));
        mem.reset();
        assert!(mem.is_empty());
        assert!(mem.get().is_empty());
    }

    #[test]
    fn limit_capped_by_context_room() {
        let mut settings = GenerationSettings::default();
        settings.context_window = 4096;
        settings.max_tokens = 2048;
        assert_eq!(token_limit_for(&settings, 6000), 2048);
        assert_eq!(token_limit_for(&settings, 1000), 1000);

        settings.max_tokens = 5000;
        assert_eq!(token_limit_for(&settings, 6000), 6000);
    }
}
