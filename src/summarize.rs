//! Document descriptions derived by summarization.
//!
//! Each document agent is advertised under a short summary of its
//! document. The summary is extracted once per content hash through the
//! tree summarizer and persisted; a failed extraction falls back to a
//! generic description at the call site rather than dropping the
//! document.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::AgentRuntime;
use crate::cache::{BlobCache, summary_key};
use crate::error::SummaryError;
use crate::index::{SummaryIndex, TreeSummarizer};

/// Query answered by the tree summarizer to derive a description.
pub const SUMMARY_QUERY: &str = "Extract a concise 1-2 line summary of this document";

/// Description used when summarization failed for a document.
#[must_use]
pub fn placeholder_description(doc_key: &str) -> String {
    format!("Useful for answering queries about the `{doc_key}` part of the documentation.")
}

/// Cached summary payload, validated by content hash.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedSummary {
    doc_hash: String,
    summary: String,
}

/// Derives and caches one summary per document.
pub struct DocumentSummarizer {
    cache: Arc<dyn BlobCache>,
    summarizer: TreeSummarizer,
}

impl fmt::Debug for DocumentSummarizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSummarizer").finish_non_exhaustive()
    }
}

impl DocumentSummarizer {
    /// Creates the summarizer with the runtime's summary token budget.
    #[must_use]
    pub fn new(cache: Arc<dyn BlobCache>, runtime: &AgentRuntime) -> Self {
        let summarizer = TreeSummarizer::new(
            Arc::clone(&runtime.provider),
            &runtime.config,
            runtime.prompts.summarize.clone(),
            Arc::clone(&runtime.semaphore),
        )
        .max_tokens(runtime.config.summary_max_tokens);

        Self { cache, summarizer }
    }

    /// Returns the document's summary, extracting it on first sight.
    ///
    /// A cached summary is returned verbatim when its content hash
    /// matches; a stale or unreadable blob triggers one re-extraction.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::Cache`] when the store fails and
    /// [`SummaryError::Completion`] when extraction fails. Callers keep
    /// the document alive by substituting [`placeholder_description`].
    pub async fn summarize(
        &self,
        index: &SummaryIndex,
        doc_hash: &str,
    ) -> Result<String, SummaryError> {
        let doc_key = index.doc_key();
        let key = summary_key(doc_key);

        let cached = self.cache.get(&key).map_err(|e| SummaryError::Cache {
            key: doc_key.to_string(),
            message: e.to_string(),
        })?;
        if let Some(blob) = cached {
            if let Some(summary) = validate_cached(doc_key, &blob, doc_hash) {
                debug!(doc_key, "summary cache hit");
                return Ok(summary);
            }
        }

        let output = self.summarizer.query(index, SUMMARY_QUERY).await?;
        let summary = output.text.trim().to_string();

        let record = PersistedSummary {
            doc_hash: doc_hash.to_string(),
            summary: summary.clone(),
        };
        let blob = serde_json::to_vec(&record).map_err(|e| SummaryError::Cache {
            key: doc_key.to_string(),
            message: e.to_string(),
        })?;
        self.cache.put(&key, &blob).map_err(|e| SummaryError::Cache {
            key: doc_key.to_string(),
            message: e.to_string(),
        })?;

        debug!(doc_key, calls = output.calls, "summary extracted");
        Ok(summary)
    }
}

/// Returns the cached summary when the blob parses and its hash matches.
fn validate_cached(doc_key: &str, blob: &[u8], doc_hash: &str) -> Option<String> {
    let record: PersistedSummary = match serde_json::from_slice(blob) {
        Ok(record) => record,
        Err(e) => {
            warn!(doc_key, error = %e, "discarding unreadable cached summary");
            return None;
        }
    };

    if record.doc_hash != doc_hash {
        debug!(doc_key, "cached summary is stale");
        return None;
    }
    Some(record.summary)
}
