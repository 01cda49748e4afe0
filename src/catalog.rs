//! Model catalog: which providers exist and which models each one offers.
//!
//! The UI works in display names ("Codestral 22B"); providers need model
//! identifiers ("codestral:latest"). This module owns that mapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unsupported model provider: {0}")]
    UnsupportedProvider(String),

    #[error("no model selected; choose a model from the list")]
    NoModelSelected,
}

/// A model backend family selectable from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelProvider {
    #[serde(rename = "Ollama")]
    Ollama,
    #[serde(rename = "HuggingFace")]
    HuggingFace,
    #[serde(rename = "NVIDIA NIM")]
    NvidiaNim,
    #[serde(rename = "OpenAI")]
    OpenAi,
    #[serde(rename = "Anthropic")]
    Anthropic,
    /// Offline echo backend used by tests and demos.
    #[serde(rename = "Dummy")]
    Dummy,
}

impl ModelProvider {
    pub const ALL: [ModelProvider; 6] = [
        ModelProvider::Ollama,
        ModelProvider::HuggingFace,
        ModelProvider::NvidiaNim,
        ModelProvider::OpenAi,
        ModelProvider::Anthropic,
        ModelProvider::Dummy,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            ModelProvider::Ollama => "Ollama",
            ModelProvider::HuggingFace => "HuggingFace",
            ModelProvider::NvidiaNim => "NVIDIA NIM",
            ModelProvider::OpenAi => "OpenAI",
            ModelProvider::Anthropic => "Anthropic",
            ModelProvider::Dummy => "Dummy",
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ModelProvider {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        match needle.as_str() {
            "ollama" => Ok(ModelProvider::Ollama),
            "huggingface" | "hf" => Ok(ModelProvider::HuggingFace),
            "nvidianim" | "nvidia" | "nim" => Ok(ModelProvider::NvidiaNim),
            "openai" => Ok(ModelProvider::OpenAi),
            "anthropic" => Ok(ModelProvider::Anthropic),
            "dummy" | "echo" => Ok(ModelProvider::Dummy),
            _ => Err(CatalogError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Placeholder entry shown first in the HuggingFace dropdown.
pub const HF_PLACEHOLDER: &str = "Choose a Model";

const OLLAMA_MODELS: &[(&str, &str)] = &[
    ("Codestral 22B", "codestral:latest"),
    ("Mistral-Nemo 12B", "mistral-nemo:latest"),
    ("Llama3.1 8B", "llama3.1:latest"),
    ("DeepSeek Coder V2 16B", "deepseek-coder-v2:latest"),
    ("Gemma2 9B", "gemma2:latest"),
    ("CodeGemma 7B", "codegemma:latest"),
];

const HUGGINGFACE_MODELS: &[(&str, &str)] = &[
    (HF_PLACEHOLDER, ""),
    ("Codestral 22B", "mistralai/Codestral-22B-v0.1"),
    ("Mistral-Nemo 12B-Instruct", "mistralai/Mistral-Nemo-Instruct-2407"),
    ("Llama3.1 8B-Instruct", "meta-llama/Meta-Llama-3.1-8B-Instruct"),
    ("DeepSeek Coder V2 16B", "deepseek-ai/DeepSeek-Coder-V2-Lite-Instruct"),
    ("Gemma2 9B", "google/gemma-2-9b-it"),
    ("CodeGemma 7B-Instruct", "google/codegemma-7b-it"),
];

const NVIDIA_MODELS: &[(&str, &str)] = &[
    ("Codestral 22B", "mistralai/codestral-22b-instruct-v0.1"),
    ("Mistral-Nemo 12B", "nv-mistralai/mistral-nemo-12b-instruct"),
    ("Llama 3.1 8B", "meta/llama-3.1-8b-instruct"),
    ("Gemma2 9B", "google/gemma-2-9b-it"),
    ("CodeGemma 7B", "google/codegemma-7b"),
];

const OPENAI_MODELS: &[(&str, &str)] = &[
    ("GPT-4o", "gpt-4o"),
    ("GPT-4o mini", "gpt-4o-mini"),
    ("GPT-4", "gpt-4"),
];

const ANTHROPIC_MODELS: &[(&str, &str)] = &[
    ("Claude 3.5 Sonnet", "claude-3-5-sonnet-20240620"),
    ("Claude 3 Opus", "claude-3-opus-20240229"),
    ("Claude 3 Sonnet", "claude-3-sonnet-20240229"),
    ("Claude 3 Haiku", "claude-3-haiku-20240307"),
];

const DUMMY_MODELS: &[(&str, &str)] = &[("Echo", "echo")];

/// `(display name, model id)` pairs offered for `provider`, in dropdown order.
pub fn models(provider: ModelProvider) -> &'static [(&'static str, &'static str)] {
    match provider {
        ModelProvider::Ollama => OLLAMA_MODELS,
        ModelProvider::HuggingFace => HUGGINGFACE_MODELS,
        ModelProvider::NvidiaNim => NVIDIA_MODELS,
        ModelProvider::OpenAi => OPENAI_MODELS,
        ModelProvider::Anthropic => ANTHROPIC_MODELS,
        ModelProvider::Dummy => DUMMY_MODELS,
    }
}

pub fn display_names(provider: ModelProvider) -> Vec<&'static str> {
    models(provider).iter().map(|(name, _)| *name).collect()
}

/// First display name that maps to a real model id.
pub fn default_model(provider: ModelProvider) -> &'static str {
    models(provider)
        .iter()
        .find(|(_, id)| !id.is_empty())
        .map(|(name, _)| *name)
        .unwrap_or_default()
}

/// Map a display name (or an id already in the table) to the model id.
///
/// Unknown names fall back to the provider's default model. The HuggingFace
/// placeholder has no id and yields [`CatalogError::NoModelSelected`].
pub fn resolve_model(provider: ModelProvider, display_or_id: &str) -> Result<String, CatalogError> {
    let wanted = display_or_id.trim();
    let table = models(provider);

    if let Some((_, id)) = table.iter().find(|(name, _)| *name == wanted) {
        if id.is_empty() {
            return Err(CatalogError::NoModelSelected);
        }
        return Ok((*id).to_string());
    }
    if !wanted.is_empty() && table.iter().any(|(_, id)| *id == wanted) {
        return Ok(wanted.to_string());
    }

    let fallback = default_model(provider);
    tracing::warn!(
        provider = %provider,
        requested = wanted,
        fallback,
        "unknown model name, using provider default"
    );
    table
        .iter()
        .find(|(name, _)| *name == fallback)
        .map(|(_, id)| (*id).to_string())
        .ok_or(CatalogError::NoModelSelected)
}

/// Reverse lookup used for display; unknown ids are shown as-is.
pub fn display_name_for(provider: ModelProvider, id: &str) -> String {
    models(provider)
        .iter()
        .find(|(_, model_id)| *model_id == id)
        .map(|(name, _)| (*name).to_string())
        .unwrap_or_else(|| id.to_string())
}
