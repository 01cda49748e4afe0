//! Layered prompt templates for the chat engine.
//!
//! Prompts are assembled from plain-text fragments under `config/prompts/`.
//! Each layer is appended in order; missing files are skipped so every layer
//! is optional and the built-in defaults below take over.
//!
//! ```text
//! system.md    — assistant persona (replaced by a non-empty custom prompt)
//! context.txt  — retrieval context wrapper; {{context_str}} and {{query_str}}
//! ```
//!
//! Variable substitution uses `{{key}}` syntax and is applied in a single
//! pass at [`build()`](PromptBuilder::build) time, so substituted values are
//! never re-scanned for placeholders.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::index::RetrievedChunk;

const SEPARATOR: &str = "\n\n";

pub const SYSTEM_LAYER: &str = "system.md";
pub const CONTEXT_LAYER: &str = "context.txt";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI coding assistant powered by the Codestral model. \
Your primary function is to help users with coding-related questions and tasks. \
You have access to a knowledge base of programming documentation and best practices. \
When answering questions please follow these guidelines. \
1. Provide clear, concise, and accurate code snippets when appropriate. \
2. Explain your code and reasoning step by step. \
3. Offer suggestions for best practices and potential optimizations. \
4. If the user's question is unclear, ask for clarification dont assume or guess the answer to any question. \
5. When referencing external libraries or frameworks, briefly explain their purpose. \
6. If the question involves multiple possible approaches, outline the pros and cons of each.\n\
Response:";

pub const DEFAULT_CONTEXT_TEMPLATE: &str = "Context information is below.\n\
---------------------\n\
{{context_str}}\n\
---------------------\n\
Given the context information above I want you to think step by step to answer \n\
the query in a crisp manner, incase case you don't know the answer say 'I don't know!'.\n\
Query: {{query_str}}\n\
Answer: ";

/// Fluent builder that assembles a layered prompt from template files.
pub struct PromptBuilder {
    prompts_dir: PathBuf,
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    /// Create a builder rooted at `prompts_dir` (e.g. `"config/prompts"`).
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompts_dir: prompts_dir.into(),
            parts: Vec::new(),
            vars: HashMap::new(),
        }
    }

    /// Append a layer by loading `filename` from the prompts directory.
    /// Skips the layer when the file is missing or blank.
    pub fn layer(mut self, filename: &str) -> Self {
        if let Some(text) = self.read_layer(filename) {
            self.parts.push(text);
        }
        self
    }

    /// Like [`layer`](Self::layer), but appends `fallback` when the file
    /// is missing or blank.
    pub fn layer_or(mut self, filename: &str, fallback: &str) -> Self {
        match self.read_layer(filename) {
            Some(text) => self.parts.push(text),
            None => self = self.append(fallback),
        }
        self
    }

    /// Directly append a text fragment.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        let s = text.into();
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }

    /// Register `{{key}}` → `value` substitution pairs applied at build time.
    pub fn with_vars<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (k, v) in vars {
            self.vars.insert(k.to_string(), v.to_string());
        }
        self
    }

    /// Register a single variable.
    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Join all layers with blank lines and substitute known variables.
    /// Unknown placeholders are left as they are.
    pub fn build(self) -> String {
        let joined = self.parts.join(SEPARATOR);
        substitute(&joined, &self.vars)
    }

    fn read_layer(&self, filename: &str) -> Option<String> {
        let path = self.prompts_dir.join(filename);
        match fs::read_to_string(&path) {
            Ok(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(_) => {
                tracing::debug!("prompt: layer '{}' not found, skipped", path.display());
                None
            }
        }
    }
}

fn substitute(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = &after[..end];
                match vars.get(key.trim()) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// The persona sent as the first part of every system message.
///
/// A non-empty `custom` prompt replaces the persona entirely; otherwise the
/// `system.md` layer is used, falling back to [`DEFAULT_SYSTEM_PROMPT`].
pub fn system_prompt(prompts_dir: impl AsRef<Path>, custom: &str) -> String {
    let builder = PromptBuilder::new(prompts_dir.as_ref());
    if custom.trim().is_empty() {
        builder.layer_or(SYSTEM_LAYER, DEFAULT_SYSTEM_PROMPT).build()
    } else {
        builder.append(custom).build()
    }
}

/// The raw context template (`context.txt` or [`DEFAULT_CONTEXT_TEMPLATE`]).
pub fn context_template(prompts_dir: impl AsRef<Path>) -> String {
    let path = prompts_dir.as_ref().join(CONTEXT_LAYER);
    match fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => DEFAULT_CONTEXT_TEMPLATE.to_string(),
    }
}

/// Fill `template` with the retrieved context and the user's query.
pub fn render_context(template: &str, context_str: &str, query_str: &str) -> String {
    let vars = HashMap::from([
        ("context_str".to_string(), context_str.to_string()),
        ("query_str".to_string(), query_str.to_string()),
    ]);
    substitute(template, &vars)
}

/// Render retrieved chunks as `file_path: <source>` blocks separated by
/// blank lines.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| format!("file_path: {}\n\n{}", c.source, c.text.trim()))
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(source: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "c".into(),
            doc_id: "d".into(),
            text: text.into(),
            title: "t".into(),
            source: source.into(),
            score: 1.0,
        }
    }

    #[test]
    fn builder_skips_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = PromptBuilder::new(dir.path())
            .layer("nonexistent_file_xyz.md")
            .append("hello")
            .build();
        assert_eq!(result, "hello");
    }

    #[test]
    fn builder_assembles_layers_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "first\n").unwrap();
        fs::write(dir.path().join("b.md"), "second").unwrap();
        let result = PromptBuilder::new(dir.path()).layer("a.md").layer("b.md").build();
        assert_eq!(result, "first\n\nsecond");
    }

    #[test]
    fn builder_substitutes_variable() {
        let result = PromptBuilder::new("unused")
            .append("Items: {{items}} / {{missing}}")
            .var("items", "item1\nitem2")
            .build();
        assert_eq!(result, "Items: item1\nitem2 / {{missing}}");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let out = render_context(DEFAULT_CONTEXT_TEMPLATE, "doc says {{query_str}}", "why?");
        assert!(out.contains("doc says {{query_str}}"));
        assert!(out.contains("Query: why?"));
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        let out = PromptBuilder::new("unused").append("a {{b").var("b", "x").build();
        assert_eq!(out, "a {{b");
    }

    #[test]
    fn system_prompt_prefers_custom() {
        let dir = TempDir::new().unwrap();
        assert_eq!(system_prompt(dir.path(), ""), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(system_prompt(dir.path(), "  Be terse.  "), "Be terse.");

        fs::write(dir.path().join(SYSTEM_LAYER), "You are a pirate.").unwrap();
        assert_eq!(system_prompt(dir.path(), ""), "You are a pirate.");
        assert_eq!(system_prompt(dir.path(), "Be terse."), "Be terse.");
    }

    #[test]
    fn context_template_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        assert_eq!(context_template(dir.path()), DEFAULT_CONTEXT_TEMPLATE);
        fs::write(dir.path().join(CONTEXT_LAYER), "ctx={{context_str}}").unwrap();
        assert_eq!(context_template(dir.path()), "ctx={{context_str}}");
    }

    #[test]
    fn format_context_lists_sources() {
        let text = format_context(&[chunk("a.rs", "fn a() {}\n"), chunk("b.md", "# B")]);
        assert_eq!(text, "file_path: a.rs\n\nfn a() {}\n\nfile_path: b.md\n\n# B");
        assert_eq!(format_context(&[]), "");
    }
}
