//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `CHATRAG_WORK_DIR` and `CHATRAG_LOG_LEVEL` env overrides.
//! API keys are read from the environment only.
//!
//! # Module layout
//!
//! - **types** — Public configuration structs (`Config`, `ProvidersConfig`,
//!   `EmbeddingConfig`, `ApiKeys`, …).
//! - **raw** — Raw TOML deserialization types (`RawConfig`, `RawProviders`, …).
//!   These mirror the file shape and use serde defaults; kept private.
//! - **load** — Loading logic: `merge_toml`, `load_raw_merged`, `load`,
//!   `load_from`, `expand_home`.

mod load;
mod raw;
mod types;

pub use load::{expand_home, load, load_from};
pub use types::*;

#[cfg(test)]
impl Config {
    /// Safe `Config` for unit tests: dummy LLM, no embeddings, no API keys,
    /// no external calls.
    pub fn test_default(work_dir: &std::path::Path) -> Self {
        let mut cfg = load::defaults_at(work_dir).expect("built-in defaults resolve");
        cfg.prompts_dir = work_dir.join("prompts");
        cfg.generation.provider = crate::catalog::ModelProvider::Dummy;
        cfg.generation.model = "Echo".into();
        cfg.embedding.provider = EmbeddingProviderKind::None;
        cfg.worker.reply_timeout_seconds = 5;
        cfg.keys = ApiKeys::default();
        cfg
    }
}
