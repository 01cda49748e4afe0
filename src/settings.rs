//! User-adjustable generation settings and repository coordinates.
//!
//! Every numeric setter clamps into the range the UI controls allow and
//! reports whether the requested value had to be adjusted.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::{self, CatalogError, ModelProvider};
use crate::llm::GenerationParams;

pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.1..=1.0;
pub const MAX_TOKENS_RANGE: RangeInclusive<u32> = 100..=5000;
pub const TOP_P_RANGE: RangeInclusive<f32> = 0.05..=1.0;
pub const CONTEXT_WINDOW_RANGE: RangeInclusive<u32> = 512..=131_072;

/// Weight quantization requested for locally loaded models.
///
/// Recorded and reported only: models are always served by an inference
/// endpoint, which decides its own weight format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quantization {
    #[default]
    #[serde(rename = "None")]
    None,
    #[serde(rename = "8-bit")]
    EightBit,
    #[serde(rename = "4-bit")]
    FourBit,
}

impl Quantization {
    pub fn label(self) -> &'static str {
        match self {
            Quantization::None => "None",
            Quantization::EightBit => "8-bit",
            Quantization::FourBit => "4-bit",
        }
    }
}

impl fmt::Display for Quantization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Quantization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Quantization::None),
            "8-bit" | "8bit" | "8" => Ok(Quantization::EightBit),
            "4-bit" | "4bit" | "4" => Ok(Quantization::FourBit),
            other => Err(format!("unknown quantization '{other}' (expected none, 8-bit or 4-bit)")),
        }
    }
}

/// Everything the UI lets the user tune for the chat model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub provider: ModelProvider,
    /// Model display name as shown in the dropdown.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub context_window: u32,
    pub quantization: Quantization,
    /// Replaces the default system persona when non-empty.
    pub custom_prompt: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Ollama,
            model: catalog::default_model(ModelProvider::Ollama).to_string(),
            temperature: 0.75,
            max_tokens: 2048,
            top_p: 0.9,
            context_window: 4096,
            quantization: Quantization::None,
            custom_prompt: String::new(),
        }
    }
}

impl GenerationSettings {
    /// Returns `true` when the value was clamped.
    pub fn set_temperature(&mut self, value: f32) -> bool {
        let (v, clamped) = clamp_f32(value, &TEMPERATURE_RANGE, self.temperature);
        self.temperature = v;
        clamped
    }

    pub fn set_max_tokens(&mut self, value: u32) -> bool {
        let (v, clamped) = clamp_u32(value, &MAX_TOKENS_RANGE);
        self.max_tokens = v;
        clamped
    }

    pub fn set_top_p(&mut self, value: f32) -> bool {
        let (v, clamped) = clamp_f32(value, &TOP_P_RANGE, self.top_p);
        self.top_p = v;
        clamped
    }

    pub fn set_context_window(&mut self, value: u32) -> bool {
        let (v, clamped) = clamp_u32(value, &CONTEXT_WINDOW_RANGE);
        self.context_window = v;
        clamped
    }

    /// Bring every numeric field into range. Used after loading from config.
    pub fn normalized(mut self) -> Self {
        self.set_temperature(self.temperature);
        self.set_max_tokens(self.max_tokens);
        self.set_top_p(self.top_p);
        self.set_context_window(self.context_window);
        self
    }

    pub fn model_id(&self) -> Result<String, CatalogError> {
        catalog::resolve_model(self.provider, &self.model)
    }

    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
            context_window: self.context_window,
        }
    }
}

/// Non-finite input keeps `current`.
fn clamp_f32(value: f32, range: &RangeInclusive<f32>, current: f32) -> (f32, bool) {
    if !value.is_finite() {
        return (current, true);
    }
    let v = value.clamp(*range.start(), *range.end());
    (v, v != value)
}

fn clamp_u32(value: u32, range: &RangeInclusive<u32>) -> (u32, bool) {
    let v = value.clamp(*range.start(), *range.end());
    (v, v != value)
}

/// Coordinates of a GitHub repository to index alongside local documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubRepo {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub branch: String,
}

impl GithubRepo {
    pub fn new(owner: &str, repo: &str, branch: &str) -> Self {
        Self {
            owner: owner.trim().to_string(),
            repo: repo.trim().to_string(),
            branch: branch.trim().to_string(),
        }
    }

    /// All three coordinates are required before the repository is fetched.
    pub fn is_complete(&self) -> bool {
        !self.owner.trim().is_empty() && !self.repo.trim().is_empty() && !self.branch.trim().is_empty()
    }
}

impl fmt::Display for GithubRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.repo, self.branch)
    }
}
