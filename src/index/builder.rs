//! Per-document index construction with cache-checked embedding.
//!
//! Splitting is deterministic, so a persisted vector blob whose stored
//! content hash matches the current document text can be re-paired with
//! freshly split chunks by ordinal. Only a miss, a hash mismatch, or a
//! malformed blob costs embedding calls. The summary index is plain data
//! and is rebuilt on every pass.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{BlobCache, content_hash, vector_index_key};
use crate::core::{Chunk, SentenceSplitter, SourceDocument};
use crate::embed::Embedder;
use crate::error::IndexError;
use crate::index::summary::SummaryIndex;
use crate::index::vector::{IndexEntry, VectorIndex};

/// Persisted form of a document's chunk vectors.
///
/// Vectors are ordinal-aligned with the deterministic splitter output;
/// chunk text itself is never persisted.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedVectors {
    doc_hash: String,
    dimensions: usize,
    vectors: Vec<Vec<f32>>,
}

/// The retrieval structures built for one document.
#[derive(Debug)]
pub struct DocumentIndexes {
    /// Ordered chunks from the deterministic splitter.
    pub chunks: Vec<Chunk>,
    /// Cosine index over the chunks.
    pub vectors: VectorIndex<Chunk>,
    /// Leaf texts for summarize-and-combine queries.
    pub summary: SummaryIndex,
    /// Whether the vectors were served from the persisted cache.
    pub from_cache: bool,
}

/// Builds per-document vector and summary indexes.
pub struct DocumentIndexer {
    embedder: Arc<dyn Embedder>,
    cache: Arc<dyn BlobCache>,
    splitter: SentenceSplitter,
}

impl fmt::Debug for DocumentIndexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentIndexer")
            .field("splitter", &self.splitter)
            .finish_non_exhaustive()
    }
}

impl DocumentIndexer {
    /// Creates an indexer over the given embedding backend and cache.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        cache: Arc<dyn BlobCache>,
        chunk_target_size: usize,
    ) -> Self {
        Self {
            embedder,
            cache,
            splitter: SentenceSplitter::new(chunk_target_size),
        }
    }

    /// Builds the indexes for one document.
    ///
    /// A valid cached vector blob short-circuits embedding entirely; a
    /// stale or malformed blob is rebuilt and overwritten. Failures leave
    /// no partial state behind.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::EmptyDocument`] when the text splits into
    /// zero chunks, [`IndexError::Embedding`] when the embedding call
    /// fails, and [`IndexError::Cache`] when the persistence layer fails.
    pub async fn index(&self, doc: &SourceDocument) -> Result<DocumentIndexes, IndexError> {
        let chunks = self.splitter.split(&doc.key, &doc.text);
        if chunks.is_empty() {
            return Err(IndexError::EmptyDocument {
                key: doc.key.clone(),
            });
        }

        let doc_hash = content_hash(&doc.text);
        let cache_key = vector_index_key(&doc.key);
        let cached = self
            .cache
            .get(&cache_key)
            .map_err(|e| IndexError::Cache {
                key: doc.key.clone(),
                message: e.to_string(),
            })?;

        if let Some(blob) = cached {
            if let Some(vectors) = self.validate_cached(&doc.key, &blob, &doc_hash, &chunks) {
                debug!(doc_key = %doc.key, chunks = chunks.len(), "vector index cache hit");
                return Ok(DocumentIndexes {
                    vectors,
                    summary: SummaryIndex::from_chunks(&doc.key, &chunks),
                    chunks,
                    from_cache: true,
                });
            }
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| IndexError::Embedding {
                key: doc.key.clone(),
                message: e.to_string(),
            })?;

        let dimensions = self.embedder.dimensions();
        let blob = serde_json::to_vec(&PersistedVectors {
            doc_hash,
            dimensions,
            vectors: vectors.clone(),
        })
        .map_err(|e| IndexError::Cache {
            key: doc.key.clone(),
            message: format!("serialize vectors: {e}"),
        })?;
        self.cache
            .put(&cache_key, &blob)
            .map_err(|e| IndexError::Cache {
                key: doc.key.clone(),
                message: e.to_string(),
            })?;
        debug!(doc_key = %doc.key, chunks = chunks.len(), dimensions, "embedded and persisted");

        let entries = chunks
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(meta, vector)| IndexEntry { meta, vector })
            .collect();

        Ok(DocumentIndexes {
            vectors: VectorIndex::from_entries(dimensions, entries),
            summary: SummaryIndex::from_chunks(&doc.key, &chunks),
            chunks,
            from_cache: false,
        })
    }

    /// Re-pairs a persisted blob with freshly split chunks, or rejects it.
    ///
    /// Rejection reasons (stale content, malformed payload, chunk or
    /// dimension drift) all downgrade to a rebuild rather than an error.
    fn validate_cached(
        &self,
        doc_key: &str,
        blob: &[u8],
        doc_hash: &str,
        chunks: &[Chunk],
    ) -> Option<VectorIndex<Chunk>> {
        let persisted: PersistedVectors = match serde_json::from_slice(blob) {
            Ok(p) => p,
            Err(e) => {
                warn!(doc_key, error = %e, "cached vectors malformed, rebuilding");
                return None;
            }
        };

        if persisted.doc_hash != doc_hash {
            debug!(doc_key, "document content changed, rebuilding vectors");
            return None;
        }
        if persisted.vectors.len() != chunks.len()
            || persisted.dimensions != self.embedder.dimensions()
            || persisted
                .vectors
                .iter()
                .any(|v| v.len() != persisted.dimensions)
        {
            warn!(
                doc_key,
                cached = persisted.vectors.len(),
                expected = chunks.len(),
                "cached vectors inconsistent, rebuilding"
            );
            return None;
        }

        let entries = chunks
            .iter()
            .cloned()
            .zip(persisted.vectors)
            .map(|(meta, vector)| IndexEntry { meta, vector })
            .collect();
        Some(VectorIndex::from_entries(persisted.dimensions, entries))
    }
}
