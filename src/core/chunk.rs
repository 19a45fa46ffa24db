//! Text chunks, the unit of similarity retrieval.

use serde::{Deserialize, Serialize};

/// A contiguous span of a document's text.
///
/// Immutable once produced. The `(doc_key, ordinal)` pair identifies a
/// chunk across runs as long as the splitter input is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Key of the document this chunk came from.
    pub doc_key: String,
    /// Zero-based position of this chunk within its document.
    pub ordinal: usize,
    /// The chunk text.
    pub text: String,
}

impl Chunk {
    /// Creates a new chunk.
    #[must_use]
    pub fn new(doc_key: impl Into<String>, ordinal: usize, text: impl Into<String>) -> Self {
        Self {
            doc_key: doc_key.into(),
            ordinal,
            text: text.into(),
        }
    }

    /// Stable display label, e.g. `root_pricing#3`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}#{}", self.doc_key, self.ordinal)
    }
}
