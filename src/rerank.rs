//! Two-stage tool retrieval: similarity search, then relevance rerank.
//!
//! Embedding similarity over short tool descriptions is noisy, so the
//! raw candidates are re-scored against the query by a dedicated rerank
//! capability before the expensive agent invocation happens. The rerank
//! stage is a pure filter over the initial candidates; it never
//! introduces tools of its own.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::agent::prompt::{ToolBrief, build_rerank_prompt};
use crate::agent::{AgentRuntime, QueryTool};
use crate::error::AgentError;
use crate::llm::{ChatRequest, LlmProvider, TokenUsage, system_message, user_message};
use crate::registry::ToolRegistry;

/// One candidate's relevance, by position in the scored list.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RerankScore {
    /// Zero-based index into the candidate list.
    pub index: usize,
    /// Relevance to the query; higher is better.
    pub score: f32,
}

/// A completed rerank call.
#[derive(Debug, Clone, Default)]
pub struct RerankOutput {
    /// Scores keyed by candidate position; order and length are free.
    pub scores: Vec<RerankScore>,
    /// Token usage of the call, zero for non-LLM implementations.
    pub usage: TokenUsage,
}

/// Capability that re-scores retrieval candidates against a query.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Scores the candidates; `index` values refer to positions in
    /// `candidates`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] when the capability call fails or its
    /// output is unusable.
    async fn score(
        &self,
        query: &str,
        candidates: &[ToolBrief<'_>],
    ) -> Result<RerankOutput, AgentError>;
}

/// [`Reranker`] backed by a JSON-mode completion call.
pub struct LlmReranker {
    provider: Arc<dyn LlmProvider>,
    model: String,
    template: String,
    max_tokens: u32,
}

impl fmt::Debug for LlmReranker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmReranker")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl LlmReranker {
    /// Creates the reranker from the runtime's rerank model and prompt.
    #[must_use]
    pub fn new(runtime: &AgentRuntime) -> Self {
        Self {
            provider: Arc::clone(&runtime.provider),
            model: runtime.config.rerank_model.clone(),
            template: runtime.prompts.rerank.clone(),
            max_tokens: runtime.config.answer_max_tokens,
        }
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn score(
        &self,
        query: &str,
        candidates: &[ToolBrief<'_>],
    ) -> Result<RerankOutput, AgentError> {
        let request = ChatRequest::json_completion(
            &self.model,
            vec![
                system_message(&self.template),
                user_message(&build_rerank_prompt(query, candidates)),
            ],
            Some(self.max_tokens),
        );

        let response = self.provider.chat(&request).await?;
        let scores = parse_scores(&response.content)?;

        Ok(RerankOutput {
            scores,
            usage: response.usage,
        })
    }
}

/// Parses the rerank response into scores.
fn parse_scores(content: &str) -> Result<Vec<RerankScore>, AgentError> {
    let trimmed = content.trim();

    // Handle markdown code blocks
    let json_str = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    // Try as array first
    let array_err = match serde_json::from_str::<Vec<RerankScore>>(json_str) {
        Ok(scores) => return Ok(scores),
        Err(e) => e,
    };

    // Try as wrapper object: {"scores": [...]}
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(json_str) {
        if let Some(arr) = value.get("scores").and_then(|v| v.as_array()) {
            let json_arr = serde_json::Value::Array(arr.clone());
            if let Ok(scores) = serde_json::from_value::<Vec<RerankScore>>(json_arr) {
                return Ok(scores);
            }
        }
    }

    let preview: String = json_str.chars().take(200).collect();
    Err(AgentError::Rerank {
        message: format!("failed to parse scores: {array_err}; preview: {preview:?}"),
    })
}

/// Two-stage retriever over a [`ToolRegistry`].
///
/// Fetches `initial_k` candidates by similarity, then keeps the
/// `final_n` best according to the reranker. Scores naming unknown or
/// already-seen positions are discarded, so the result is always a
/// subset of the initial candidates.
pub struct RerankingRetriever {
    reranker: Box<dyn Reranker>,
    initial_k: usize,
    final_n: usize,
}

impl fmt::Debug for RerankingRetriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RerankingRetriever")
            .field("initial_k", &self.initial_k)
            .field("final_n", &self.final_n)
            .finish_non_exhaustive()
    }
}

impl RerankingRetriever {
    /// Wraps `reranker` with the search width and the kept top-n.
    #[must_use]
    pub fn new(reranker: Box<dyn Reranker>, initial_k: usize, final_n: usize) -> Self {
        Self {
            reranker,
            initial_k,
            final_n,
        }
    }

    /// LLM-backed retriever using the runtime's rerank model and widths.
    #[must_use]
    pub fn llm(runtime: &AgentRuntime) -> Self {
        Self::new(
            Box::new(LlmReranker::new(runtime)),
            runtime.config.retrieve_top_k,
            runtime.config.rerank_top_n,
        )
    }

    /// Retrieves and filters candidate tools for `query`.
    ///
    /// With one or zero raw candidates the rerank call is skipped; there
    /// is nothing to reorder.
    ///
    /// # Errors
    ///
    /// Propagates registry and reranker failures; returns
    /// [`AgentError::Rerank`] when no score survives validation.
    pub async fn retrieve(
        &self,
        registry: &ToolRegistry,
        query: &str,
        usage: &mut TokenUsage,
    ) -> Result<Vec<QueryTool>, AgentError> {
        let initial = registry.retrieve(query, self.initial_k).await?;
        if initial.len() <= 1 {
            return Ok(initial);
        }

        let briefs: Vec<ToolBrief<'_>> = initial
            .iter()
            .map(|tool| ToolBrief {
                name: tool.name(),
                description: tool.description(),
            })
            .collect();

        let output = self.reranker.score(query, &briefs).await?;
        usage.absorb(output.usage);

        let mut seen = vec![false; initial.len()];
        let mut scored = Vec::with_capacity(output.scores.len());
        for entry in output.scores {
            if entry.index >= initial.len() {
                warn!(index = entry.index, "rerank scored an unknown candidate");
                continue;
            }
            if seen[entry.index] {
                warn!(index = entry.index, "duplicate rerank score");
                continue;
            }
            seen[entry.index] = true;
            scored.push(entry);
        }

        if scored.is_empty() {
            return Err(AgentError::Rerank {
                message: "no usable scores returned".to_string(),
            });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(self.final_n);

        debug!(initial = initial.len(), kept = scored.len(), "rerank filter");
        Ok(scored.iter().map(|s| initial[s.index].clone()).collect())
    }
}
