//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains,
//! and applies `CHATRAG_WORK_DIR` and `CHATRAG_LOG_LEVEL` env overrides.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;
use crate::settings::GithubRepo;

use super::raw::RawConfig;
use super::types::*;

/// Deep-merge two TOML values.
/// Tables are merged recursively; the overlay only needs to specify keys that
/// differ from the base. For every other type (string, integer, array, …)
/// the overlay value replaces the base value wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return the
/// fully merged `toml::Value`. `visited` carries canonicalized paths already
/// seen in this chain so circular references are caught early.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Load config from the given path, or `config/default.toml`, then apply env-var overrides.
/// If no path is given and `config/default.toml` does not exist, the built-in
/// defaults are used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("CHATRAG_WORK_DIR").ok();
    let log_level_override = env::var("CHATRAG_LOG_LEVEL").ok();

    if let Some(path) = config_path {
        return load_from(
            Path::new(path),
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        );
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(
            default_path,
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        )
    } else {
        resolve(
            RawConfig::default(),
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        )
    }
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
/// Follows `[meta] base = "..."` inheritance chains before resolving.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let merged_val = load_raw_merged(path, &mut HashSet::new())?;

    let parsed: RawConfig = Deserialize::deserialize(merged_val).map_err(|e: toml::de::Error| {
        AppError::Config(format!("config error in {}: {e}", path.display()))
    })?;

    resolve(parsed, work_dir_override, log_level_override)
}

fn resolve(
    parsed: RawConfig,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let a = parsed.app;

    let work_dir = expand_home(work_dir_override.unwrap_or(&a.work_dir));
    let log_level = log_level_override.unwrap_or(&a.log_level).to_string();
    let under_work_dir = |p: &str| {
        let p = expand_home(p);
        if p.is_absolute() { p } else { work_dir.join(p) }
    };
    let data_dir = under_work_dir(&a.data_dir);
    let index_dir = under_work_dir(&a.index_dir);
    let log_file = a.log_file.as_deref().map(under_work_dir);

    let e = parsed.embedding;
    let embedding_provider = e
        .provider
        .parse::<EmbeddingProviderKind>()
        .map_err(AppError::Config)?;
    if e.batch_size == 0 {
        return Err(AppError::Config("embedding.batch_size must be at least 1".into()));
    }

    let r = parsed.retrieval;
    if r.chunk_size == 0 {
        return Err(AppError::Config("retrieval.chunk_size must be at least 1".into()));
    }
    if r.chunk_overlap >= r.chunk_size {
        return Err(AppError::Config(format!(
            "retrieval.chunk_overlap ({}) must be smaller than chunk_size ({})",
            r.chunk_overlap, r.chunk_size
        )));
    }

    let p = parsed.providers;
    let g = parsed.github;

    Ok(Config {
        app_name: a.name,
        work_dir,
        log_level,
        log_file,
        prompts_dir: expand_home(&a.prompts_dir),
        data_dir,
        index_dir,
        server: ServerConfig {
            enabled: parsed.server.enabled,
            bind: parsed.server.bind,
        },
        generation: parsed.generation.normalized(),
        providers: ProvidersConfig {
            ollama: EndpointConfig {
                api_base_url: p.ollama.api_base_url,
                timeout_seconds: p.ollama.timeout_seconds,
            },
            openai: EndpointConfig {
                api_base_url: p.openai.api_base_url,
                timeout_seconds: p.openai.timeout_seconds,
            },
            nvidia: EndpointConfig {
                api_base_url: p.nvidia.api_base_url,
                timeout_seconds: p.nvidia.timeout_seconds,
            },
            huggingface: EndpointConfig {
                api_base_url: p.huggingface.api_base_url,
                timeout_seconds: p.huggingface.timeout_seconds,
            },
            anthropic: AnthropicConfig {
                api_base_url: p.anthropic.api_base_url,
                timeout_seconds: p.anthropic.timeout_seconds,
                version: p.anthropic.version,
            },
        },
        embedding: EmbeddingConfig {
            provider: embedding_provider,
            model: e.model,
            api_base_url: e.api_base_url,
            batch_size: e.batch_size,
            timeout_seconds: e.timeout_seconds,
        },
        retrieval: RetrievalConfig {
            chunk_size: r.chunk_size,
            chunk_overlap: r.chunk_overlap,
            top_k: r.top_k.max(1),
        },
        memory: MemoryConfig {
            token_limit: parsed.memory.token_limit,
        },
        worker: WorkerConfig {
            reply_timeout_seconds: parsed.worker.reply_timeout_seconds.max(1),
            queue_capacity: parsed.worker.queue_capacity.max(1),
        },
        github: GithubConfig {
            repo: GithubRepo::new(&g.owner, &g.repo, &g.branch),
            api_base_url: g.api_base_url.trim_end_matches('/').to_string(),
            exclude_extensions: g
                .exclude_extensions
                .iter()
                .map(|ext| ext.trim().to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
            max_file_bytes: g.max_file_bytes,
            timeout_seconds: g.timeout_seconds,
        },
        keys: ApiKeys::from_env(),
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Built-in defaults rooted at `work_dir`, bypassing env overrides.
#[cfg(test)]
pub(super) fn defaults_at(work_dir: &Path) -> Result<Config, AppError> {
    resolve(RawConfig::default(), work_dir.to_str(), None)
}
