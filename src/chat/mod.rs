//! Retrieval-augmented chat: prompts, memory, transcript and the engine that
//! ties them to an index and a provider.

pub mod engine;
pub mod memory;
pub mod prompt;
pub mod transcript;

pub use engine::{ChatEngine, EngineParts, StreamingResponse};
pub use memory::ChatMemory;
pub use transcript::ChatTranscript;
