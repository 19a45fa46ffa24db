//! Per-document retrieval structures.
//!
//! [`builder::DocumentIndexer`] splits a document and produces a
//! [`vector::VectorIndex`] over its chunks (cache-checked) plus a
//! [`summary::SummaryIndex`] for summarize-and-combine queries.

pub mod builder;
pub mod summary;
pub mod vector;

pub use builder::{DocumentIndexer, DocumentIndexes};
pub use summary::{SummaryIndex, SummaryOutput, TreeSummarizer};
pub use vector::{IndexEntry, SearchHit, VectorIndex, cosine_similarity};
