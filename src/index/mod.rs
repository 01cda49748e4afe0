//! Retrieval index: chunk store, embedding clients and vector math.

pub mod embed;
pub mod store;
pub mod vector;

pub use embed::Embedder;
pub use store::{ChunkConfig, DocIndex, DocMetadata, IndexStats, RetrievedChunk};
