//! Core domain types: documents, chunks, and the deterministic splitter.

pub mod chunk;
pub mod document;
pub mod split;

pub use chunk::Chunk;
pub use document::{SourceDocument, document_key};
pub use split::{DEFAULT_CHUNK_TARGET, SentenceSplitter};
