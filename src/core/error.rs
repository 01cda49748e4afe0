//! Application-wide error types.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("documents error: {0}")]
    Documents(String),

    #[error("github error: {0}")]
    Github(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("comms error: {0}")]
    Comms(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        AppError::Provider(e.to_string())
    }
}

impl From<CatalogError> for AppError {
    fn from(e: CatalogError) -> Self {
        AppError::Settings(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().starts_with("config error"));
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn index_error_display() {
        let e = AppError::Index("fts5 unavailable".into());
        assert_eq!(e.to_string(), "index error: fts5 unavailable");
    }

    #[test]
    fn provider_error_converts() {
        let e: AppError = ProviderError::MissingApiKey("OPENAI_API_KEY".into()).into();
        assert!(matches!(e, AppError::Provider(_)));
        assert!(e.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn catalog_error_converts_to_settings() {
        let e: AppError = CatalogError::NoModelSelected.into();
        assert!(matches!(e, AppError::Settings(_)));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        // satisfies std::error::Error trait
        let _: &dyn Error = &e;
    }
}
