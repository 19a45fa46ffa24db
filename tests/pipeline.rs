//! End-to-end tests over the public engine boundary.
//!
//! A small HTML corpus on disk is loaded, ingested into document agents,
//! and queried through both paths:
//! 1. Agent mode: tool retrieval, rerank filtering, model-driven
//!    selection, and per-document reasoning loops
//! 2. Base mode: one grounded completion over the flat chunk index
//!
//! The language model and the embedder are deterministic in-memory
//! doubles; the provider answers each request the way the real backend
//! would for this corpus.

#![allow(clippy::panic, clippy::unwrap_used)]

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use futures_util::Stream;

use docent_rs::agent::{AgentRuntime, COMPARE_TOOL_NAME, PromptSet, QueryMode};
use docent_rs::cache::{BlobCache, MemoryCache, SqliteCache};
use docent_rs::config::DocentConfig;
use docent_rs::embed::Embedder;
use docent_rs::error::AgentError;
use docent_rs::ingest::DocentEngine;
use docent_rs::llm::{ChatRequest, ChatResponse, LlmProvider, Role, TokenUsage, ToolCall};
use docent_rs::source::CorpusLoader;

// =====================================================================
// Test infrastructure
// =====================================================================

/// Projects text onto a topic axis so retrieval is deterministic.
fn topic_axis(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    if lower.contains("pric") || lower.contains("widget") || lower.contains("$10") {
        vec![1.0, 0.0, 0.0]
    } else if lower.contains("refund") || lower.contains("faq") {
        vec![0.0, 1.0, 0.0]
    } else {
        vec![0.0, 0.0, 1.0]
    }
}

struct TopicEmbedder;

#[async_trait]
impl Embedder for TopicEmbedder {
    fn name(&self) -> &'static str {
        "topic"
    }

    fn dimensions(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        Ok(topic_axis(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError> {
        Ok(texts.iter().map(|t| topic_axis(t)).collect())
    }
}

/// Embedder that rejects any batch containing the tripwire marker.
struct TrippingEmbedder;

#[async_trait]
impl Embedder for TrippingEmbedder {
    fn name(&self) -> &'static str {
        "tripping"
    }

    fn dimensions(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        Ok(topic_axis(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError> {
        if texts.iter().any(|t| t.contains("tripwire")) {
            return Err(AgentError::ApiRequest {
                message: "embedding backend rejected the batch".to_string(),
                status: Some(500),
            });
        }
        Ok(texts.iter().map(|t| topic_axis(t)).collect())
    }
}

const fn unit_usage() -> TokenUsage {
    TokenUsage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    }
}

fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        content: text.to_string(),
        usage: unit_usage(),
        tool_calls: Vec::new(),
        finish_reason: Some("stop".to_string()),
    }
}

fn tool_call_response(name: &str, query: &str) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        usage: unit_usage(),
        tool_calls: vec![ToolCall {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments: serde_json::json!({ "query": query }).to_string(),
        }],
        finish_reason: Some("tool_calls".to_string()),
    }
}

/// Plays the language model for this corpus.
///
/// Each request is classified by its shape: JSON-mode requests are the
/// rerank and decompose calls, tool-bearing requests are reasoning
/// rounds, single-message requests are grounded completions, and the
/// remaining two-message request is comparison synthesis.
struct RoutingProvider {
    prompts: PromptSet,
    requests: StdMutex<Vec<ChatRequest>>,
    direct_top_answer: bool,
}

impl RoutingProvider {
    fn new() -> Self {
        Self::with_direct_answer(false)
    }

    fn with_direct_answer(direct_top_answer: bool) -> Self {
        Self {
            prompts: PromptSet::defaults(),
            requests: StdMutex::new(Vec::new()),
            direct_top_answer,
        }
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn summary_for(prompt: &str) -> &'static str {
    if prompt.contains("$10") || prompt.contains("Widgets") {
        "Covers widget and gadget pricing."
    } else if prompt.contains("Refunds") {
        "Covers the refund policy."
    } else if prompt.contains("alpha") {
        "Covers alpha facts."
    } else if prompt.contains("gamma") {
        "Covers gamma facts."
    } else {
        "Covers assorted notes."
    }
}

#[async_trait]
impl LlmProvider for RoutingProvider {
    fn name(&self) -> &'static str {
        "routing"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.requests.lock().unwrap().push(request.clone());

        let system = request.messages[0].content.as_str();

        if request.json_mode {
            if system == self.prompts.rerank {
                return Ok(text_response(
                    r#"[{"index": 0, "score": 0.9}, {"index": 1, "score": 0.8}]"#,
                ));
            }
            return Ok(text_response(
                r#"[{"tool_name": "tool_root_pricing", "sub_question": "What are the plan prices?"},
                    {"tool_name": "tool_root_faq", "sub_question": "What is the refund policy?"}]"#,
            ));
        }

        if !request.tools.is_empty() {
            let answered = request
                .messages
                .last()
                .is_some_and(|m| m.role == Role::Tool);

            if system == self.prompts.top_agent {
                if self.direct_top_answer {
                    return Ok(text_response("Answering from prior knowledge."));
                }
                let question = request.messages[1].content.clone();
                if answered {
                    return Ok(text_response(if question.contains("Compare") {
                        "Plans cost $10 per month, while refunds stay available for 30 days."
                    } else {
                        "Plans start at $10 per month."
                    }));
                }
                if question.contains("Compare") {
                    return Ok(tool_call_response(COMPARE_TOOL_NAME, &question));
                }
                return Ok(tool_call_response("tool_root_pricing", &question));
            }

            // Document agent reasoning round.
            let pricing = system.contains("root_pricing");
            if answered {
                return Ok(text_response(if pricing {
                    "The pricing page lists plans at $10 per month."
                } else {
                    "The FAQ grants refunds within 30 days."
                }));
            }
            return Ok(tool_call_response(
                "fact_lookup",
                if pricing { "plan prices" } else { "refund policy" },
            ));
        }

        if request.messages.len() == 1 {
            if system.contains("Context information from multiple sources") {
                return Ok(text_response(summary_for(system)));
            }
            // Grounded fact lookup over retrieved chunks.
            return Ok(text_response(if system.contains("$10") {
                "Plans start at $10 per month."
            } else if system.contains("Refunds") {
                "Refunds are issued within 30 days."
            } else {
                "No relevant facts found."
            }));
        }

        // Comparison synthesis.
        Ok(text_response(
            "Plans cost $10 per month and refunds are issued within 30 days.",
        ))
    }

    async fn chat_stream(
        &self,
        _request: &ChatRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>, AgentError> {
        Err(AgentError::Stream {
            message: "not implemented".to_string(),
        })
    }
}

// =====================================================================
// Fixtures
// =====================================================================

fn write_file(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}

fn write_corpus(dir: &Path) {
    write_file(
        dir,
        "pricing.html",
        "<html><head><script>nav()</script></head><body>\
         <h1>Pricing</h1><p>Plans start at $10 per month.</p>\
         <p>Widgets cost 42 credits.</p></body></html>",
    );
    write_file(
        dir,
        "faq.html",
        "<html><body><h1>FAQ</h1><p>Refunds are issued within 30 days.</p></body></html>",
    );
}

async fn build_engine_with(
    docs: &Path,
    cache: Arc<dyn BlobCache>,
    provider: Arc<RoutingProvider>,
    embedder: Arc<dyn Embedder>,
) -> DocentEngine {
    let config = DocentConfig::builder()
        .api_key("test")
        .build()
        .unwrap_or_else(|_| unreachable!());
    let corpus = CorpusLoader::new(docs).load().unwrap();
    let runtime = AgentRuntime::new(provider, embedder, PromptSet::defaults(), config);
    DocentEngine::build(corpus, runtime, cache).await.unwrap()
}

async fn build_engine(
    docs: &Path,
    cache: Arc<dyn BlobCache>,
    provider: Arc<RoutingProvider>,
) -> DocentEngine {
    build_engine_with(docs, cache, provider, Arc::new(TopicEmbedder)).await
}

fn description_of(engine: &DocentEngine, name: &str) -> String {
    engine
        .registry()
        .get(name)
        .map(|tool| tool.description().to_string())
        .unwrap()
}

// =====================================================================
// Scenarios
// =====================================================================

#[tokio::test]
async fn test_agent_mode_selects_and_invokes_pricing_tool() {
    let docs = tempfile::tempdir().unwrap();
    write_corpus(docs.path());
    let provider = Arc::new(RoutingProvider::new());
    let engine = build_engine(
        docs.path(),
        Arc::new(MemoryCache::new()),
        Arc::clone(&provider),
    )
    .await;

    let outcome = engine
        .query("What is the price?", QueryMode::Agent)
        .await
        .unwrap();

    assert_eq!(outcome.mode, QueryMode::Agent);
    assert_eq!(outcome.answer, "Plans start at $10 per month.");
    assert!(outcome.candidates.contains(&"tool_root_pricing".to_string()));
    assert!(outcome.candidates.contains(&COMPARE_TOOL_NAME.to_string()));

    assert_eq!(outcome.invocations.len(), 1);
    let record = &outcome.invocations[0];
    assert!(record.succeeded());
    assert_eq!(record.tool_name, "tool_root_pricing");
    assert_eq!(
        record.answer.as_deref(),
        Some("The pricing page lists plans at $10 per month.")
    );

    // Two ingest summaries, then rerank, two top rounds, two document
    // agent rounds, and one grounded completion.
    assert_eq!(provider.request_count(), 8);
}

#[tokio::test]
async fn test_comparison_query_decomposes_across_documents() {
    let docs = tempfile::tempdir().unwrap();
    write_corpus(docs.path());
    let provider = Arc::new(RoutingProvider::new());
    let engine = build_engine(
        docs.path(),
        Arc::new(MemoryCache::new()),
        Arc::clone(&provider),
    )
    .await;

    let outcome = engine
        .query("Compare pricing and FAQ policies", QueryMode::Agent)
        .await
        .unwrap();

    assert_eq!(
        outcome.answer,
        "Plans cost $10 per month, while refunds stay available for 30 days."
    );
    assert!(outcome.candidates.contains(&"tool_root_pricing".to_string()));
    assert!(outcome.candidates.contains(&"tool_root_faq".to_string()));
    assert!(outcome.candidates.contains(&COMPARE_TOOL_NAME.to_string()));

    // The original query, not a decomposition, reaches the compare tool.
    assert_eq!(outcome.invocations.len(), 1);
    assert_eq!(outcome.invocations[0].tool_name, COMPARE_TOOL_NAME);
    assert_eq!(outcome.invocations[0].argument, "Compare pricing and FAQ policies");

    // Both document agents answered their sub-question.
    let requests = provider.requests();
    let prompts = PromptSet::defaults();
    let synthesize = requests
        .iter()
        .find(|r| r.messages[0].content == prompts.synthesize)
        .unwrap();
    let body = &synthesize.messages[1].content;
    assert!(body.contains("tool_root_pricing"));
    assert!(body.contains("tool_root_faq"));
    assert!(body.contains("Compare pricing and FAQ policies"));

    let faq_rounds = requests
        .iter()
        .filter(|r| !r.tools.is_empty() && r.messages[0].content.contains("root_faq"))
        .count();
    assert_eq!(faq_rounds, 2);
}

#[tokio::test]
async fn test_base_mode_answers_from_flat_index() {
    let docs = tempfile::tempdir().unwrap();
    write_corpus(docs.path());
    let provider = Arc::new(RoutingProvider::new());
    let engine = build_engine(
        docs.path(),
        Arc::new(MemoryCache::new()),
        Arc::clone(&provider),
    )
    .await;

    let before = provider.request_count();
    let outcome = engine
        .query("What is the price?", QueryMode::Base)
        .await
        .unwrap();

    assert_eq!(outcome.mode, QueryMode::Base);
    assert_eq!(outcome.answer, "Plans start at $10 per month.");
    assert!(outcome.invocations.is_empty());
    assert!(outcome.candidates.is_empty());

    // One grounded completion, no tool advertisement.
    assert_eq!(provider.request_count() - before, 1);
    let last = provider.requests().pop().unwrap();
    assert!(last.tools.is_empty());
    assert!(last.messages[0].content.contains("Context information is below"));
    assert!(last.messages[0].content.contains("$10"));
}

#[tokio::test]
async fn test_reingest_reads_summaries_from_persisted_cache() {
    let docs = tempfile::tempdir().unwrap();
    write_corpus(docs.path());
    let data = tempfile::tempdir().unwrap();
    let cache_path = data.path().join("cache.db");

    let first_provider = Arc::new(RoutingProvider::new());
    let cache = Arc::new(SqliteCache::open(&cache_path).unwrap());
    let first = build_engine(docs.path(), cache, Arc::clone(&first_provider)).await;
    let first_description = description_of(&first, "tool_root_pricing");
    assert_eq!(first.report().cache_hits, 0);
    assert_eq!(first_provider.request_count(), 2);
    drop(first);

    // A fresh engine over the same database, as after a process restart.
    let second_provider = Arc::new(RoutingProvider::new());
    let cache = Arc::new(SqliteCache::open(&cache_path).unwrap());
    let second = build_engine(docs.path(), cache, Arc::clone(&second_provider)).await;

    assert_eq!(second.report().indexed, 2);
    assert_eq!(second.report().cache_hits, 2);
    // No summary completion ran; the description came back unchanged.
    assert_eq!(second_provider.request_count(), 0);
    assert_eq!(description_of(&second, "tool_root_pricing"), first_description);
}

#[tokio::test]
async fn test_failed_document_is_absent_from_registry() {
    let docs = tempfile::tempdir().unwrap();
    write_file(docs.path(), "alpha.md", "The alpha facts are recorded here.");
    write_file(
        docs.path(),
        "beta.md",
        "The beta facts hit a tripwire in the embedder.",
    );
    write_file(docs.path(), "gamma.md", "The gamma facts are recorded here.");

    let provider = Arc::new(RoutingProvider::new());
    let engine = build_engine_with(
        docs.path(),
        Arc::new(MemoryCache::new()),
        Arc::clone(&provider),
        Arc::new(TrippingEmbedder),
    )
    .await;

    let report = engine.report();
    assert_eq!(report.documents, 3);
    assert_eq!(report.indexed, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].doc_key, "root_beta");
    assert!(report.failures[0].error.contains("embedding failed"));

    assert_eq!(
        engine.registry().names(),
        vec!["tool_root_alpha", "tool_root_gamma"]
    );
}

#[tokio::test]
async fn test_top_agent_rejects_ungrounded_answer() {
    let docs = tempfile::tempdir().unwrap();
    write_corpus(docs.path());
    let provider = Arc::new(RoutingProvider::with_direct_answer(true));
    let engine = build_engine(
        docs.path(),
        Arc::new(MemoryCache::new()),
        Arc::clone(&provider),
    )
    .await;

    let err = engine
        .query("What is the price?", QueryMode::Agent)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::NoToolInvoked { .. }));
}
