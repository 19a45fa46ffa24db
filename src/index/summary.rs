//! Summarize-and-combine querying over a document's chunks.
//!
//! A [`SummaryIndex`] is the ordered chunk text of one document. Queries
//! run bottom-up: chunk texts are packed into context groups, each group
//! is answered concurrently, and the partial answers are combined in
//! further rounds until a single response remains.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::DocentConfig;
use crate::core::Chunk;
use crate::error::{AgentError, SummaryError};
use crate::llm::{ChatRequest, LlmProvider, TokenUsage, user_message};

/// Upper bound in bytes for one packed context group.
const GROUP_TARGET: usize = 8192;

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Ordered leaf texts of one document.
#[derive(Debug, Clone)]
pub struct SummaryIndex {
    doc_key: String,
    leaves: Vec<String>,
}

impl SummaryIndex {
    /// Builds the index from a document's chunks, in chunk order.
    #[must_use]
    pub fn from_chunks(doc_key: impl Into<String>, chunks: &[Chunk]) -> Self {
        Self {
            doc_key: doc_key.into(),
            leaves: chunks.iter().map(|c| c.text.clone()).collect(),
        }
    }

    /// Key of the document this index covers.
    #[must_use]
    pub fn doc_key(&self) -> &str {
        &self.doc_key
    }

    /// Number of leaf texts.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether the index holds no leaves.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Leaf texts in document order.
    #[must_use]
    pub fn leaves(&self) -> &[String] {
        &self.leaves
    }
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

/// A completed summarize-and-combine run.
#[derive(Debug, Clone)]
pub struct SummaryOutput {
    /// Final response text.
    pub text: String,
    /// Token usage aggregated over every round.
    pub usage: TokenUsage,
    /// Completion calls issued across all rounds.
    pub calls: usize,
}

/// Answers queries over a [`SummaryIndex`] by recursive combination.
pub struct TreeSummarizer {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    template: String,
    semaphore: Arc<Semaphore>,
    request_delay: Duration,
}

impl fmt::Debug for TreeSummarizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeSummarizer")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl TreeSummarizer {
    /// Creates a summarizer using the sub-answer model from `config`.
    ///
    /// `template` must contain `{context}` and `{query}` placeholders.
    /// The semaphore bounds concurrent completion calls and is shared
    /// with the caller's other fan-out work.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: &DocentConfig,
        template: impl Into<String>,
        semaphore: Arc<Semaphore>,
    ) -> Self {
        Self {
            provider,
            model: config.answer_model.clone(),
            max_tokens: config.answer_max_tokens,
            template: template.into(),
            semaphore,
            request_delay: config.request_delay,
        }
    }

    /// Overrides the response token budget.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    /// Answers `query` from the indexed document.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::Completion`] if the index is empty or any
    /// completion call fails; no partial output is returned.
    pub async fn query(
        &self,
        index: &SummaryIndex,
        query: &str,
    ) -> Result<SummaryOutput, SummaryError> {
        if index.is_empty() {
            return Err(SummaryError::Completion {
                key: index.doc_key().to_string(),
                message: "no chunks to summarize".to_string(),
            });
        }

        let mut layer: Vec<String> = index.leaves().to_vec();
        let mut usage = TokenUsage::default();
        let mut calls = 0usize;
        let mut round = 0usize;

        loop {
            round += 1;
            let groups = pack_groups(&layer);
            debug!(
                doc_key = index.doc_key(),
                round,
                inputs = layer.len(),
                groups = groups.len(),
                "summarize round"
            );

            let mut answers = self
                .answer_groups(index.doc_key(), query, groups, &mut usage, &mut calls)
                .await?;

            if answers.len() == 1 {
                let text = answers.pop().unwrap_or_default();
                debug!(doc_key = index.doc_key(), rounds = round, calls, "summarize complete");
                return Ok(SummaryOutput { text, usage, calls });
            }
            layer = answers;
        }
    }

    /// Answers each context group concurrently, preserving group order.
    async fn answer_groups(
        &self,
        doc_key: &str,
        query: &str,
        groups: Vec<String>,
        usage: &mut TokenUsage,
        calls: &mut usize,
    ) -> Result<Vec<String>, SummaryError> {
        let mut handles = Vec::with_capacity(groups.len());

        for group in groups {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&self.semaphore);
            let model = self.model.clone();
            let max_tokens = self.max_tokens;
            let delay = self.request_delay;
            let prompt = self
                .template
                .replace("{context}", &group)
                .replace("{query}", query);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| {
                    AgentError::Orchestration {
                        message: format!("semaphore closed: {e}"),
                    }
                })?;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let request =
                    ChatRequest::completion(&model, vec![user_message(&prompt)], Some(max_tokens));
                provider.chat(&request).await
            }));
        }

        let mut answers = Vec::with_capacity(handles.len());
        for handle in handles {
            let response = handle
                .await
                .map_err(|e| SummaryError::Completion {
                    key: doc_key.to_string(),
                    message: format!("summarize task failed: {e}"),
                })?
                .map_err(|e| SummaryError::Completion {
                    key: doc_key.to_string(),
                    message: e.to_string(),
                })?;
            usage.absorb(response.usage);
            *calls += 1;
            answers.push(response.content);
        }
        Ok(answers)
    }
}

/// Packs consecutive texts into groups of at most [`GROUP_TARGET`] bytes.
///
/// When size packing cannot reduce a multi-text layer (every text is
/// oversize on its own), texts are paired instead so each round strictly
/// shrinks the layer.
fn pack_groups(texts: &[String]) -> Vec<String> {
    let packed = pack_by_size(texts, GROUP_TARGET);
    if packed.len() == texts.len() && texts.len() > 1 {
        return texts.chunks(2).map(|pair| pair.join("\n\n")).collect();
    }
    packed
}

fn pack_by_size(texts: &[String], target: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current = String::new();

    for text in texts {
        if !current.is_empty() && current.len() + 2 + text.len() > target {
            groups.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(text);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}
