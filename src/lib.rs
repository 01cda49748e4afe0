//! chatrag: a retrieval-augmented coding chat assistant.
//!
//! Local uploads and, optionally, a GitHub repository are chunked, embedded
//! and indexed; each chat turn retrieves the closest chunks and sends them as
//! context to the selected model provider. The browser UI and console talk
//! to a [`session::ModelManager`], which owns the settings, the transcript
//! and a background worker that answers one message at a time.

pub mod bootstrap;
pub mod catalog;
pub mod chat;
pub mod comms;
pub mod core;
pub mod documents;
pub mod index;
pub mod llm;
pub mod runtime;
pub mod session;
pub mod settings;

pub use bootstrap::logger;
pub use self::core::{config, error};
