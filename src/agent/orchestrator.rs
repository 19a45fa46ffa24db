//! Top-level agent driving one query cycle end to end.
//!
//! A cycle retrieves candidate tools from the registry, filters them
//! through the reranking retriever, appends a per-query comparison tool,
//! and then runs a single function-calling conversation in which the
//! model selects tools, consumes their answers, and writes the final
//! response.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::llm::{
    ChatRequest, TokenUsage, ToolCall, ToolChoice, ToolResult, query_tool_definition,
    system_message, user_message,
};
use crate::registry::ToolRegistry;
use crate::rerank::RerankingRetriever;

use super::AgentRuntime;
use super::compare::plan_comparison;
use super::outcome::{QueryMode, QueryOutcome, ToolInvocationRecord};
use super::tool::QueryTool;
use super::tool_loop::{ToolHandler, tool_loop};

/// Agent label used in diagnostics for the top-level loop.
const TOP_AGENT_NAME: &str = "top_agent";

/// Stages of one query cycle.
///
/// A cycle moves Idle → Retrieving → Selecting, oscillates between
/// Selecting and Invoking while the model works the tools, then closes
/// through Synthesizing back to Idle. Any error sends it to Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No cycle in flight.
    Idle,
    /// Fetching and reranking candidate tools.
    Retrieving,
    /// Waiting for the model to pick a tool or finish.
    Selecting,
    /// Running a selected tool.
    Invoking,
    /// Consuming the model's final response.
    Synthesizing,
    /// The cycle ended in an error.
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Retrieving => "retrieving",
            Self::Selecting => "selecting",
            Self::Invoking => "invoking",
            Self::Synthesizing => "synthesizing",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Logs and applies one phase transition.
async fn advance(phase: &Mutex<Phase>, next: Phase) {
    let mut current = phase.lock().await;
    debug!(from = %*current, to = %next, "phase transition");
    *current = next;
}

/// The orchestrating agent that owns the query cycle.
///
/// Holds no per-query state; the phase machine lives inside each call to
/// [`TopAgent::answer`], so one instance serves concurrent queries.
pub struct TopAgent {
    runtime: AgentRuntime,
    retriever: RerankingRetriever,
}

impl fmt::Debug for TopAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopAgent")
            .field("provider", &self.runtime.provider.name())
            .field("retriever", &self.retriever)
            .finish()
    }
}

impl TopAgent {
    /// Creates the agent with the model-based reranking retriever.
    #[must_use]
    pub fn new(runtime: AgentRuntime) -> Self {
        let retriever = RerankingRetriever::llm(&runtime);
        Self { runtime, retriever }
    }

    /// Creates the agent with a caller-supplied retriever.
    #[must_use]
    pub const fn with_retriever(runtime: AgentRuntime, retriever: RerankingRetriever) -> Self {
        Self { runtime, retriever }
    }

    /// Answers `query` over the tools registered in `registry`.
    ///
    /// The first reasoning round forces a tool selection; later rounds
    /// let the model keep invoking tools or finish. A selection outside
    /// the candidate set is rejected back to the model once, then fails
    /// the cycle. Failed invocations are reported to the model and
    /// recorded, but their output never reaches the final answer.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::EmptyQuery`] for blank input,
    /// [`AgentError::Retrieval`] when no candidate tool matches,
    /// [`AgentError::Selection`] after a second out-of-set selection,
    /// [`AgentError::NoToolInvoked`] when the model answered without
    /// using any tool, [`AgentError::AllToolsFailed`] when every
    /// invocation failed, and other [`AgentError`] values when a
    /// capability call fails.
    pub async fn answer(
        &self,
        registry: &ToolRegistry,
        query: &str,
    ) -> Result<QueryOutcome, AgentError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AgentError::EmptyQuery);
        }

        let phase = Mutex::new(Phase::Idle);
        let outcome = self.run_cycle(registry, query, &phase).await;

        match &outcome {
            Ok(result) => {
                advance(&phase, Phase::Idle).await;
                info!(
                    invocations = result.invocations.len(),
                    selection_retries = result.selection_retries,
                    total_tokens = result.usage.total_tokens,
                    elapsed_ms = result.elapsed_ms,
                    "query cycle complete"
                );
            }
            Err(error) => {
                advance(&phase, Phase::Failed).await;
                warn!(%error, "query cycle failed");
            }
        }

        outcome
    }

    async fn run_cycle(
        &self,
        registry: &ToolRegistry,
        query: &str,
        phase: &Mutex<Phase>,
    ) -> Result<QueryOutcome, AgentError> {
        let start = Instant::now();
        let mut usage = TokenUsage::default();

        advance(phase, Phase::Retrieving).await;
        let mut candidates = self.retriever.retrieve(registry, query, &mut usage).await?;
        if candidates.is_empty() {
            return Err(AgentError::Retrieval {
                message: "no candidate tools matched the query".to_string(),
            });
        }

        let compare = plan_comparison(&candidates, &self.runtime);
        candidates.push(compare);
        let candidate_names: Vec<String> =
            candidates.iter().map(|tool| tool.name().to_string()).collect();
        debug!(candidates = ?candidate_names, "candidate set assembled");

        advance(phase, Phase::Selecting).await;
        let mut request = ChatRequest::completion(
            &self.runtime.config.agent_model,
            vec![
                system_message(&self.runtime.prompts.top_agent),
                user_message(query),
            ],
            Some(self.runtime.config.agent_max_tokens),
        );
        request.tools = candidates
            .iter()
            .map(|tool| query_tool_definition(tool.name(), tool.description()))
            .collect();
        request.tool_choice = ToolChoice::Required;

        let handler = SelectionHandler {
            candidates: &candidates,
            phase,
            records: Mutex::new(Vec::new()),
            usage: Mutex::new(TokenUsage::default()),
            rejections: AtomicU32::new(0),
        };

        let response = tool_loop(
            self.runtime.provider.as_ref(),
            &mut request,
            &handler,
            self.runtime.config.max_tool_iterations,
            &mut usage,
        )
        .await?;

        let SelectionHandler {
            records,
            usage: tool_usage,
            rejections,
            ..
        } = handler;
        let invocations = records.into_inner();
        usage.absorb(tool_usage.into_inner());

        advance(phase, Phase::Synthesizing).await;
        if invocations.is_empty() {
            return Err(AgentError::NoToolInvoked {
                agent: TOP_AGENT_NAME.to_string(),
            });
        }
        if invocations.iter().all(|record| !record.succeeded()) {
            return Err(AgentError::AllToolsFailed {
                attempted: invocations.len(),
            });
        }

        Ok(QueryOutcome {
            answer: response.content.trim().to_string(),
            mode: QueryMode::Agent,
            candidates: candidate_names,
            invocations,
            selection_retries: rejections.into_inner(),
            usage,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

/// Dispatches the model's tool selections during the reasoning loop.
///
/// The first out-of-set selection is reported back to the model as a
/// recoverable error; the second fails the cycle. Failing tools are
/// likewise reported back so the model can try another candidate.
struct SelectionHandler<'a> {
    candidates: &'a [QueryTool],
    phase: &'a Mutex<Phase>,
    records: Mutex<Vec<ToolInvocationRecord>>,
    usage: Mutex<TokenUsage>,
    rejections: AtomicU32,
}

#[async_trait]
impl ToolHandler for SelectionHandler<'_> {
    async fn handle(&self, call: &ToolCall) -> Result<ToolResult, AgentError> {
        let Some(tool) = self.candidates.iter().find(|tool| tool.name() == call.name) else {
            let prior = self.rejections.fetch_add(1, Ordering::SeqCst);
            if prior >= 1 {
                return Err(AgentError::Selection {
                    name: call.name.clone(),
                });
            }
            warn!(tool = %call.name, "selection outside the candidate set; re-prompting");
            let valid = self
                .candidates
                .iter()
                .map(QueryTool::name)
                .collect::<Vec<_>>()
                .join(", ");
            return Ok(ToolResult::error(
                call,
                format!("unknown tool '{}'; select one of: {valid}", call.name),
            ));
        };

        let question = call.query_argument();
        advance(self.phase, Phase::Invoking).await;
        let started = Instant::now();

        let result = match tool.answer(&question).await {
            Ok(answer) => {
                self.usage.lock().await.absorb(answer.usage);
                self.records.lock().await.push(ToolInvocationRecord::success(
                    call.name.clone(),
                    question,
                    answer.text.clone(),
                    started.elapsed(),
                ));
                ToolResult::ok(call, answer.text)
            }
            Err(error) => {
                warn!(tool = %call.name, %error, "tool invocation failed");
                self.records.lock().await.push(ToolInvocationRecord::failure(
                    call.name.clone(),
                    question,
                    error.to_string(),
                    started.elapsed(),
                ));
                ToolResult::error(call, format!("tool '{}' failed: {error}", call.name))
            }
        };

        advance(self.phase, Phase::Selecting).await;
        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    use futures_util::Stream;

    use crate::agent::doc_agent::DocumentAgent;
    use crate::agent::prompt::{PromptSet, ToolBrief};
    use crate::config::DocentConfig;
    use crate::core::Chunk;
    use crate::embed::Embedder;
    use crate::index::{SummaryIndex, VectorIndex};
    use crate::llm::{ChatResponse, LlmProvider, Role};
    use crate::rerank::{Reranker, RerankOutput, RerankScore};

    struct ScriptedProvider {
        responses: StdMutex<VecDeque<ChatResponse>>,
        requests: StdMutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ChatResponse>) -> Self {
            Self {
                responses: StdMutex::new(responses.into()),
                requests: StdMutex::new(Vec::new()),
            }
        }

        fn request(&self, index: usize) -> ChatRequest {
            self.requests.lock().unwrap()[index].clone()
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses.lock().unwrap().pop_front().ok_or_else(|| {
                AgentError::ApiRequest {
                    message: "script exhausted".to_string(),
                    status: None,
                }
            })
        }

        async fn chat_stream(
            &self,
            _request: &ChatRequest,
        ) -> Result<Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>, AgentError>
        {
            Err(AgentError::Stream {
                message: "not implemented".to_string(),
            })
        }
    }

    struct MockEmbedder;

    #[async_trait]
    impl Embedder for MockEmbedder {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn dimensions(&self) -> usize {
            3
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AgentError> {
            Ok(vec![1.0, 0.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AgentError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    /// Keeps every candidate with equal score, preserving order.
    struct PassthroughReranker;

    #[async_trait]
    impl Reranker for PassthroughReranker {
        async fn score(
            &self,
            _query: &str,
            candidates: &[ToolBrief<'_>],
        ) -> Result<RerankOutput, AgentError> {
            let scores = candidates
                .iter()
                .enumerate()
                .map(|(index, _)| RerankScore { index, score: 1.0 })
                .collect();
            Ok(RerankOutput {
                scores,
                usage: TokenUsage::default(),
            })
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
                arguments: format!(r#"{{"query":"{query}"}}"#),
            }],
            finish_reason: Some("tool_calls".to_string()),
        }
    }

    fn doc_agent(
        runtime: &AgentRuntime,
        doc_key: &str,
        description: &str,
        texts: &[&str],
    ) -> DocumentAgent {
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk::new(doc_key, index, *text))
            .collect();
        let mut vectors = VectorIndex::new(3);
        for chunk in &chunks {
            vectors.push(chunk.clone(), vec![1.0, 0.0, 0.0]);
        }
        let summary_index = SummaryIndex::from_chunks(doc_key, &chunks);
        DocumentAgent::build(doc_key, description, vectors, summary_index, runtime)
    }

    async fn fixture(provider: Arc<ScriptedProvider>) -> (TopAgent, ToolRegistry) {
        let config = DocentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let runtime =
            AgentRuntime::new(provider, Arc::new(MockEmbedder), PromptSet::defaults(), config);

        let pricing = doc_agent(
            &runtime,
            "root_pricing",
            "Pricing of widgets and gadgets.",
            &["Widgets cost 42 credits.", "Gadgets cost 7 credits."],
        );
        let faq = doc_agent(
            &runtime,
            "root_faq",
            "Frequently asked questions.",
            &["Refunds are issued within 30 days."],
        );
        let registry = ToolRegistry::build(
            vec![
                QueryTool::Document(Arc::new(pricing)),
                QueryTool::Document(Arc::new(faq)),
            ],
            Arc::new(MockEmbedder),
        )
        .await
        .unwrap();

        let agent = TopAgent::with_retriever(
            runtime,
            RerankingRetriever::new(Box::new(PassthroughReranker), 10, 5),
        );
        (agent, registry)
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Idle.to_string(), "idle");
        assert_eq!(Phase::Retrieving.to_string(), "retrieving");
        assert_eq!(Phase::Invoking.to_string(), "invoking");
        assert_eq!(Phase::Failed.to_string(), "failed");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (agent, registry) = fixture(Arc::clone(&provider)).await;

        let err = agent.answer(&registry, "   ").await.unwrap_err();
        assert!(matches!(err, AgentError::EmptyQuery));
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_candidate_set_fails() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (agent, _) = fixture(Arc::clone(&provider)).await;
        let empty = ToolRegistry::build(Vec::new(), Arc::new(MockEmbedder))
            .await
            .unwrap();

        let err = agent.answer(&empty, "What is the price?").await.unwrap_err();
        assert!(matches!(err, AgentError::Retrieval { .. }));
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn test_full_cycle_invokes_selected_tool() {
        // Call order: top selection, document agent selection, grounded
        // answer, document agent final, top final.
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response("tool_root_pricing", "What is the price?"),
            tool_call_response("fact_lookup", "What is the price?"),
            text_response("Widgets cost 42 credits."),
            text_response("Plans start at $10."),
            text_response("Plans start at $10 per month."),
        ]));
        let (agent, registry) = fixture(Arc::clone(&provider)).await;

        let outcome = agent.answer(&registry, "What is the price?").await.unwrap();
        assert_eq!(outcome.answer, "Plans start at $10 per month.");
        assert_eq!(outcome.mode, QueryMode::Agent);
        assert_eq!(
            outcome.candidates,
            vec!["tool_root_pricing", "tool_root_faq", "compare_tool"]
        );
        assert_eq!(outcome.selection_retries, 0);
        assert_eq!(outcome.usage.total_tokens, 75);

        assert_eq!(outcome.invocations.len(), 1);
        let record = &outcome.invocations[0];
        assert!(record.succeeded());
        assert_eq!(record.tool_name, "tool_root_pricing");
        assert_eq!(record.argument, "What is the price?");
        assert_eq!(record.answer.as_deref(), Some("Plans start at $10."));

        // Selection round advertises every candidate and forces a call.
        let first = provider.request(0);
        assert_eq!(first.tools.len(), 3);
        assert_eq!(first.tool_choice, ToolChoice::Required);
        assert_eq!(first.messages[0].role, Role::System);
        assert!(first.messages[0].content.contains("use the tools provided"));
        assert!(first.tools.iter().any(|tool| tool.name == "compare_tool"));

        let last = provider.request(4);
        assert_eq!(last.tool_choice, ToolChoice::Auto);
        let reply = last.messages.last().unwrap();
        assert_eq!(reply.role, Role::Tool);
        assert!(reply.content.contains("Plans start at $10."));
    }

    #[tokio::test]
    async fn test_out_of_set_selection_reprompted_once() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response("tool_bogus", "What is the price?"),
            tool_call_response("tool_root_pricing", "What is the price?"),
            tool_call_response("fact_lookup", "What is the price?"),
            text_response("Widgets cost 42 credits."),
            text_response("Plans start at $10."),
            text_response("Plans start at $10 per month."),
        ]));
        let (agent, registry) = fixture(Arc::clone(&provider)).await;

        let outcome = agent.answer(&registry, "What is the price?").await.unwrap();
        assert_eq!(outcome.answer, "Plans start at $10 per month.");
        assert_eq!(outcome.selection_retries, 1);
        assert_eq!(outcome.invocations.len(), 1);

        // The corrective reply names the whole candidate set.
        let second = provider.request(1);
        let reply = second.messages.last().unwrap();
        assert_eq!(reply.role, Role::Tool);
        assert!(reply.content.contains("unknown tool 'tool_bogus'"));
        assert!(
            reply
                .content
                .contains("tool_root_pricing, tool_root_faq, compare_tool")
        );
    }

    #[tokio::test]
    async fn test_repeated_out_of_set_selection_fails() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response("tool_bogus", "What is the price?"),
            tool_call_response("tool_nonsense", "What is the price?"),
        ]));
        let (agent, registry) = fixture(Arc::clone(&provider)).await;

        let err = agent.answer(&registry, "What is the price?").await.unwrap_err();
        match err {
            AgentError::Selection { name } => assert_eq!(name, "tool_nonsense"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(provider.request_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_invocation_reported_and_excluded() {
        // The faq agent answers without using a sub-tool, which fails its
        // invocation; the model then falls back to the pricing tool.
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response("tool_root_faq", "What is the refund policy?"),
            text_response("Refunds take 30 days."),
            tool_call_response("tool_root_pricing", "What is the price?"),
            tool_call_response("fact_lookup", "What is the price?"),
            text_response("Widgets cost 42 credits."),
            text_response("Plans start at $10."),
            text_response("Plans start at $10 per month."),
        ]));
        let (agent, registry) = fixture(Arc::clone(&provider)).await;

        let outcome = agent
            .answer(&registry, "What is the price and refund policy?")
            .await
            .unwrap();
        assert_eq!(outcome.answer, "Plans start at $10 per month.");
        assert_eq!(outcome.invocations.len(), 2);

        let failed = &outcome.invocations[0];
        assert!(!failed.succeeded());
        assert_eq!(failed.tool_name, "tool_root_faq");
        assert!(failed.error.as_deref().unwrap().contains("tool_root_faq"));
        assert!(outcome.invocations[1].succeeded());

        // The model sees the failure as an error result, not an answer.
        let third = provider.request(2);
        let reply = third.messages.last().unwrap();
        assert_eq!(reply.role, Role::Tool);
        assert!(reply.content.contains("tool 'tool_root_faq' failed"));
    }

    #[tokio::test]
    async fn test_all_failed_invocations_fail_the_cycle() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response("tool_root_faq", "What is the refund policy?"),
            text_response("Refunds take 30 days."),
            text_response("I could not answer the question."),
        ]));
        let (agent, registry) = fixture(Arc::clone(&provider)).await;

        let err = agent
            .answer(&registry, "What is the refund policy?")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::AllToolsFailed { attempted: 1 }));
    }

    #[tokio::test]
    async fn test_direct_answer_without_selection_rejected() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            "From prior knowledge.",
        )]));
        let (agent, registry) = fixture(Arc::clone(&provider)).await;

        let err = agent.answer(&registry, "What is the price?").await.unwrap_err();
        match err {
            AgentError::NoToolInvoked { agent } => assert_eq!(agent, "top_agent"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
