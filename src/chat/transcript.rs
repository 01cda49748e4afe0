//! UI-facing chat transcript: ordered `(user, assistant)` pairs.
//!
//! Independent of [`ChatMemory`](super::memory::ChatMemory): clearing the
//! window leaves the model's memory intact and vice versa.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChatTranscript {
    pairs: Vec<(String, String)>,
}

impl ChatTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.pairs.push((user.into(), assistant.into()));
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// The transcript plus an in-progress turn, for rendering a stream.
    pub fn with_pending(&self, user: &str, partial: &str) -> Vec<(String, String)> {
        let mut view = self.pairs.clone();
        view.push((user.to_string(), partial.to_string()));
        view
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_clear() {
        let mut t = ChatTranscript::new();
        t.push("q1", "a1");
        t.push("q2".to_string(), "a2");
        assert_eq!(t.len(), 2);
        assert_eq!(t.pairs()[1], ("q2".to_string(), "a2".to_string()));
        t.clear();
        assert!(t.is_empty());
    }

    #[test]
    fn pending_view_does_not_mutate() {
        let mut t = ChatTranscript::new();
        t.push("q1", "a1");
        let view = t.with_pending("q2", "par");
        assert_eq!(view.len(), 2);
        assert_eq!(view[1].1, "par");
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn serializes_as_nested_arrays() {
        let mut t = ChatTranscript::new();
        t.push("hi", "hello");
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json, serde_json::json!([["hi", "hello"]]));
    }
}
