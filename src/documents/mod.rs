//! Document sources for the retrieval index.
//!
//! - [`loader`] — recursive walk of a local directory.
//! - [`upload`] — the data directory that browser uploads land in.
//! - [`github`] — files of a GitHub repository via the REST API.
//!
//! Only UTF-8 text is ingested; binary files are skipped with a warning.

pub mod github;
pub mod loader;
pub mod upload;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use github::GithubLoader;
pub use loader::load_dir;
pub use upload::UploadStore;

/// A source document before chunking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Empty until the index assigns one.
    pub id: String,
    pub title: String,
    /// Origin shown next to retrieved context (file path or URL).
    pub source: String,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(title: impl Into<String>, source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            source: source.into(),
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}
