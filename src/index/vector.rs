//! In-memory cosine-similarity index over embedded entries.
//!
//! One generic index serves all three retrieval surfaces: per-document
//! chunk indices, the flat base-engine aggregate, and the registry's
//! object index over tool descriptions.

use serde::{Deserialize, Serialize};

/// One embedded entry with caller-supplied metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry<M> {
    /// Caller metadata resolved back from search hits.
    pub meta: M,
    /// The embedding vector.
    pub vector: Vec<f32>,
}

/// A search hit borrowed from the index.
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a, M> {
    /// Metadata of the matched entry.
    pub meta: &'a M,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// Append-only in-memory vector index with cosine search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex<M> {
    dimensions: usize,
    entries: Vec<IndexEntry<M>>,
}

impl<M> VectorIndex<M> {
    /// Creates an empty index expecting vectors of `dimensions`.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: Vec::new(),
        }
    }

    /// Builds an index from pre-paired entries.
    #[must_use]
    pub fn from_entries(dimensions: usize, entries: Vec<IndexEntry<M>>) -> Self {
        Self {
            dimensions,
            entries,
        }
    }

    /// Appends an entry.
    pub fn push(&mut self, meta: M, vector: Vec<f32>) {
        self.entries.push(IndexEntry { meta, vector });
    }

    /// Expected vector dimensionality.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry<M>] {
        &self.entries
    }

    /// Consumes the index, returning its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<IndexEntry<M>> {
        self.entries
    }

    /// Returns the `k` nearest entries to `query` by cosine similarity,
    /// best first. Ties keep insertion order. Entries whose vector length
    /// does not match the query score zero.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit<'_, M>> {
        let mut hits: Vec<SearchHit<'_, M>> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                meta: &entry.meta,
                score: cosine_similarity(query, &entry.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }
}

/// Cosine similarity between two vectors.
///
/// Accumulates in f64 so long low-magnitude vectors do not lose
/// precision. Returns 0.0 for mismatched lengths or zero-norm inputs.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    #[allow(clippy::cast_possible_truncation)]
    {
        (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
    }
}
