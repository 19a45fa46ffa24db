//! Corpus ingestion and the assembled engine.
//!
//! Each document is indexed, summarized, and wrapped as a specialist
//! agent concurrently under the runtime's concurrency bound. A document
//! that fails is recorded in the report and dropped from the run; the
//! rest of the corpus still comes up. The surviving chunks are also
//! aggregated into one flat index for the base path.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::agent::{
    AgentRuntime, DocumentAgent, QueryMode, QueryOutcome, QueryTool, TopAgent,
};
use crate::base::BaseEngine;
use crate::cache::{BlobCache, content_hash};
use crate::core::{Chunk, SourceDocument};
use crate::error::AgentError;
use crate::index::{DocumentIndexer, IndexEntry, VectorIndex};
use crate::registry::ToolRegistry;
use crate::summarize::{DocumentSummarizer, placeholder_description};

/// One document that could not be ingested.
#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    /// Key of the dropped document.
    pub doc_key: String,
    /// What went wrong.
    pub error: String,
}

/// What happened while ingesting a corpus.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Documents presented to the pipeline.
    pub documents: usize,
    /// Documents that came up as query tools.
    pub indexed: usize,
    /// Documents restored from cache without new embedding calls.
    pub cache_hits: usize,
    /// Documents advertised under a placeholder description.
    pub summary_fallbacks: usize,
    /// Documents dropped from this run.
    pub failures: Vec<IngestFailure>,
    /// Wall-clock ingestion time.
    pub elapsed_ms: u64,
}

/// Per-document build product, collected by [`DocentEngine::build`].
struct DocOutcome {
    agent: DocumentAgent,
    entries: Vec<IndexEntry<Chunk>>,
    from_cache: bool,
    summary_fallback: bool,
}

/// Indexes and summarizes one document, producing its agent.
///
/// Stage errors are flattened to their display form; per-document
/// failures are reported, not propagated. The semaphore permit covers
/// only the indexing phase: summarization fans out through the same
/// semaphore internally, and holding a permit across it would deadlock
/// at a concurrency bound of one.
async fn build_document(
    doc: SourceDocument,
    indexer: Arc<DocumentIndexer>,
    summarizer: Arc<DocumentSummarizer>,
    runtime: AgentRuntime,
) -> Result<DocOutcome, String> {
    let permit = Arc::clone(&runtime.semaphore)
        .acquire_owned()
        .await
        .map_err(|e| format!("semaphore closed: {e}"))?;
    let delay = runtime.config.request_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let doc_hash = content_hash(&doc.text);
    let indexes = indexer.index(&doc).await.map_err(|e| e.to_string())?;
    drop(permit);

    let entries = indexes.vectors.entries().to_vec();
    let (description, summary_fallback) =
        match summarizer.summarize(&indexes.summary, &doc_hash).await {
            Ok(summary) => (summary, false),
            Err(error) => {
                warn!(doc_key = %doc.key, %error, "summary failed; using placeholder description");
                (placeholder_description(&doc.key), true)
            }
        };

    let agent = DocumentAgent::build(
        &doc.key,
        &description,
        indexes.vectors,
        indexes.summary,
        &runtime,
    );
    Ok(DocOutcome {
        agent,
        entries,
        from_cache: indexes.from_cache,
        summary_fallback,
    })
}

/// The assembled query engine over one ingested corpus.
///
/// Holds both query paths: the two-tier agent system and the flat base
/// path, exposed behind one query boundary.
#[derive(Debug)]
pub struct DocentEngine {
    registry: ToolRegistry,
    top: TopAgent,
    base: BaseEngine,
    report: IngestReport,
}

impl DocentEngine {
    /// Ingests `corpus` and assembles both query paths.
    ///
    /// Documents are processed concurrently under the runtime's
    /// concurrency bound. A corpus where every document fails still
    /// produces an engine; its report carries the failures and agent
    /// queries fail at retrieval until a re-ingest succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] when the tool registry cannot be built
    /// from the surviving agents (duplicate tool name, or the
    /// description embedding failed).
    pub async fn build(
        corpus: Vec<SourceDocument>,
        runtime: AgentRuntime,
        cache: Arc<dyn BlobCache>,
    ) -> Result<Self, AgentError> {
        let start = Instant::now();
        let documents = corpus.len();

        let indexer = Arc::new(DocumentIndexer::new(
            Arc::clone(&runtime.embedder),
            Arc::clone(&cache),
            runtime.config.chunk_target_size,
        ));
        let summarizer = Arc::new(DocumentSummarizer::new(Arc::clone(&cache), &runtime));

        let mut handles = Vec::with_capacity(documents);
        for doc in corpus {
            let doc_key = doc.key.clone();
            let task = build_document(
                doc,
                Arc::clone(&indexer),
                Arc::clone(&summarizer),
                runtime.clone(),
            );
            handles.push((doc_key, tokio::spawn(task)));
        }

        let mut report = IngestReport {
            documents,
            ..IngestReport::default()
        };
        let mut tools = Vec::with_capacity(documents);
        let mut entries = Vec::new();
        for (doc_key, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(error)) => {
                    warn!(%doc_key, %error, "document dropped from this run");
                    report.failures.push(IngestFailure { doc_key, error });
                    continue;
                }
                Err(error) => {
                    warn!(%doc_key, %error, "ingestion task aborted");
                    report.failures.push(IngestFailure {
                        doc_key,
                        error: error.to_string(),
                    });
                    continue;
                }
            };

            report.indexed += 1;
            if outcome.from_cache {
                report.cache_hits += 1;
            }
            if outcome.summary_fallback {
                report.summary_fallbacks += 1;
            }
            entries.extend(outcome.entries);
            tools.push(QueryTool::Document(Arc::new(outcome.agent)));
        }

        if report.indexed == 0 && documents > 0 {
            warn!("no documents survived ingestion; queries will fail until a re-ingest");
        }

        let registry = ToolRegistry::build(tools, Arc::clone(&runtime.embedder)).await?;
        let aggregate = VectorIndex::from_entries(runtime.embedder.dimensions(), entries);
        report.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            documents,
            indexed = report.indexed,
            cache_hits = report.cache_hits,
            summary_fallbacks = report.summary_fallbacks,
            failures = report.failures.len(),
            elapsed_ms = report.elapsed_ms,
            "corpus ingested"
        );

        let top = TopAgent::new(runtime.clone());
        let base = BaseEngine::new(runtime, aggregate);
        Ok(Self {
            registry,
            top,
            base,
            report,
        })
    }

    /// Answers `query` on the requested path.
    ///
    /// # Errors
    ///
    /// Propagates the selected path's query-cycle failure.
    pub async fn query(&self, query: &str, mode: QueryMode) -> Result<QueryOutcome, AgentError> {
        match mode {
            QueryMode::Agent => self.top.answer(&self.registry, query).await,
            QueryMode::Base => self.base.query(query).await,
        }
    }

    /// Report from the ingestion that built this engine.
    #[must_use]
    pub const fn report(&self) -> &IngestReport {
        &self.report
    }

    /// The registered document tools.
    #[must_use]
    pub const fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Number of chunks on the flat base path.
    #[must_use]
    pub const fn chunk_count(&self) -> usize {
        self.base.chunk_count()
    }
}
