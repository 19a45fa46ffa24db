//! Flat retrieval over the aggregate chunk index.
//!
//! The low-cost alternative to the agent path: one similarity search
//! across every chunk of every document, answered with a single grounded
//! completion. Nothing is reranked, decomposed, or selected.

use std::fmt;
use std::time::Instant;

use tracing::debug;

use crate::agent::prompt::render_grounded;
use crate::agent::{AgentRuntime, QueryMode, QueryOutcome};
use crate::core::Chunk;
use crate::error::AgentError;
use crate::index::VectorIndex;
use crate::llm::{ChatRequest, user_message};

/// Answers queries from one similarity search over every chunk.
pub struct BaseEngine {
    runtime: AgentRuntime,
    index: VectorIndex<Chunk>,
}

impl fmt::Debug for BaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseEngine")
            .field("chunks", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl BaseEngine {
    /// Creates the engine over a pre-built aggregate index.
    #[must_use]
    pub const fn new(runtime: AgentRuntime, index: VectorIndex<Chunk>) -> Self {
        Self { runtime, index }
    }

    /// Number of chunks in the aggregate index.
    #[must_use]
    pub const fn chunk_count(&self) -> usize {
        self.index.len()
    }

    /// Answers `query` from the nearest chunks, no agents involved.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::EmptyQuery`] for blank input,
    /// [`AgentError::Retrieval`] when the index holds no chunks, and
    /// other [`AgentError`] values when a capability call fails.
    pub async fn query(&self, query: &str) -> Result<QueryOutcome, AgentError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AgentError::EmptyQuery);
        }
        if self.index.is_empty() {
            return Err(AgentError::Retrieval {
                message: "no indexed content available".to_string(),
            });
        }

        let start = Instant::now();
        let vector = self.runtime.embedder.embed(query).await?;
        let hits = self.index.search(&vector, self.runtime.config.base_top_k);
        debug!(hits = hits.len(), "base engine retrieval");

        let context = hits
            .iter()
            .map(|hit| hit.meta.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = render_grounded(&self.runtime.prompts.qa, &context, query);
        let request = ChatRequest::completion(
            &self.runtime.config.answer_model,
            vec![user_message(&prompt)],
            Some(self.runtime.config.answer_max_tokens),
        );
        let response = self.runtime.provider.chat(&request).await?;

        Ok(QueryOutcome {
            answer: response.content.trim().to_string(),
            mode: QueryMode::Base,
            candidates: Vec::new(),
            invocations: Vec::new(),
            selection_retries: 0,
            usage: response.usage,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}
