//! Function-calling loop shared by the document and top-level agents.
//!
//! Drives the model ↔ tool round-trip: sends a request, dispatches any
//! tool calls through a [`ToolHandler`], appends the results, and repeats
//! until the model produces a final text response or the iteration limit
//! is reached.

use async_trait::async_trait;
use tracing::debug;

use crate::error::AgentError;
use crate::llm::{
    ChatRequest, ChatResponse, LlmProvider, TokenUsage, ToolCall, ToolChoice, ToolResult,
    assistant_tool_calls_message, tool_message,
};

/// Dispatches one tool call requested by the model.
///
/// A returned [`ToolResult`] (error or not) is fed back to the model and
/// the loop continues; returning `Err` aborts the whole loop. Handlers
/// use the error path for violations the conversation cannot recover
/// from.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Executes `call` and produces the result message for the model.
    async fn handle(&self, call: &ToolCall) -> Result<ToolResult, AgentError>;
}

/// Runs a function-calling loop: model → tool calls → tool results → model → …
///
/// Continues until the model responds without tool calls or
/// `max_iterations` is reached. When the request starts with
/// [`ToolChoice::Required`], the requirement is relaxed to `Auto` after
/// the first round that produced tool calls, so the model can finish
/// with a text answer.
///
/// Token usage from every round is absorbed into `usage`; the returned
/// response carries only the final round's figures.
///
/// # Errors
///
/// Returns [`AgentError::ToolLoopExceeded`] if the model keeps requesting
/// tools beyond `max_iterations`. Propagates provider errors and any
/// error returned by the handler.
#[allow(clippy::future_not_send)]
pub async fn tool_loop(
    provider: &dyn LlmProvider,
    request: &mut ChatRequest,
    handler: &dyn ToolHandler,
    max_iterations: usize,
    usage: &mut TokenUsage,
) -> Result<ChatResponse, AgentError> {
    for iteration in 0..max_iterations {
        let response = provider.chat(request).await?;
        usage.absorb(response.usage);

        if response.tool_calls.is_empty() {
            debug!(iteration, "tool loop completed with final text response");
            return Ok(response);
        }

        debug!(
            iteration,
            tool_count = response.tool_calls.len(),
            "executing tool calls"
        );

        request
            .messages
            .push(assistant_tool_calls_message(response.tool_calls.clone()));

        for call in &response.tool_calls {
            let result = handler.handle(call).await?;
            debug!(
                tool = call.name,
                call_id = call.id,
                is_error = result.is_error,
                "tool execution complete"
            );
            request
                .messages
                .push(tool_message(&result.tool_call_id, &result.content));
        }

        if request.tool_choice == ToolChoice::Required {
            request.tool_choice = ToolChoice::Auto;
        }
    }

    Err(AgentError::ToolLoopExceeded { max_iterations })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::Stream;

    use super::*;
    use crate::llm::{ToolDefinition, query_tool_definition, system_message, user_message};

    /// Mock provider that returns tool calls on the first N calls,
    /// then a final text response.
    struct MockToolProvider {
        call_count: AtomicUsize,
        tool_rounds: usize,
    }

    impl MockToolProvider {
        fn new(tool_rounds: usize) -> Self {
            Self {
                call_count: AtomicUsize::new(0),
                tool_rounds,
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockToolProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);

            if count < self.tool_rounds {
                Ok(ChatResponse {
                    content: String::new(),
                    usage: TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens: 2,
                        total_tokens: 12,
                    },
                    tool_calls: vec![ToolCall {
                        id: format!("call_{count}"),
                        name: "fact_lookup".to_string(),
                        arguments: r#"{"query": "What is the price?"}"#.to_string(),
                    }],
                    finish_reason: Some("tool_calls".to_string()),
                })
            } else {
                Ok(ChatResponse {
                    content: "Final answer based on tool results.".to_string(),
                    usage: TokenUsage {
                        prompt_tokens: 100,
                        completion_tokens: 20,
                        total_tokens: 120,
                    },
                    tool_calls: Vec::new(),
                    finish_reason: Some("stop".to_string()),
                })
            }
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

    /// Handler that answers every call, counting invocations.
    struct CountingHandler {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl ToolHandler for CountingHandler {
        async fn handle(&self, call: &ToolCall) -> Result<ToolResult, AgentError> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(ToolResult::ok(call, "Plans start at $10."))
        }
    }

    /// Handler that aborts the loop on any call.
    struct AbortingHandler;

    #[async_trait]
    impl ToolHandler for AbortingHandler {
        async fn handle(&self, call: &ToolCall) -> Result<ToolResult, AgentError> {
            Err(AgentError::Selection {
                name: call.name.clone(),
            })
        }
    }

    fn tools() -> Vec<ToolDefinition> {
        vec![query_tool_definition(
            "fact_lookup",
            "Useful for questions related to specific facts",
        )]
    }

    fn request_with_tools(choice: ToolChoice) -> ChatRequest {
        ChatRequest {
            model: "test".to_string(),
            messages: vec![
                system_message("You are a test agent."),
                user_message("What is the price?"),
            ],
            temperature: None,
            max_tokens: Some(1024),
            json_mode: false,
            stream: false,
            tools: tools(),
            tool_choice: choice,
        }
    }

    #[tokio::test]
    async fn test_single_tool_round() {
        let provider = MockToolProvider::new(1);
        let handler = CountingHandler {
            handled: AtomicUsize::new(0),
        };
        let mut request = request_with_tools(ToolChoice::Auto);
        let mut usage = TokenUsage::default();

        let response = tool_loop(&provider, &mut request, &handler, 10, &mut usage)
            .await
            .unwrap_or_else(|e| panic!("tool_loop failed: {e}"));

        assert_eq!(response.content, "Final answer based on tool results.");
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
        // system + user + assistant(tool_calls) + tool(result) = 4 messages
        assert_eq!(request.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_multiple_rounds_accumulate_usage() {
        let provider = MockToolProvider::new(3);
        let handler = CountingHandler {
            handled: AtomicUsize::new(0),
        };
        let mut request = request_with_tools(ToolChoice::Auto);
        let mut usage = TokenUsage::default();

        let response = tool_loop(&provider, &mut request, &handler, 10, &mut usage)
            .await
            .unwrap_or_else(|e| panic!("tool_loop failed: {e}"));

        assert_eq!(response.content, "Final answer based on tool results.");
        assert_eq!(handler.handled.load(Ordering::SeqCst), 3);
        // 3 tool rounds at 12 tokens plus the final round at 120.
        assert_eq!(usage.total_tokens, 156);
    }

    #[tokio::test]
    async fn test_loop_exceeded() {
        let provider = MockToolProvider::new(usize::MAX);
        let handler = CountingHandler {
            handled: AtomicUsize::new(0),
        };
        let mut request = request_with_tools(ToolChoice::Auto);
        let mut usage = TokenUsage::default();

        let result = tool_loop(&provider, &mut request, &handler, 3, &mut usage).await;
        assert!(matches!(
            result,
            Err(AgentError::ToolLoopExceeded { max_iterations: 3 })
        ));
    }

    #[tokio::test]
    async fn test_required_relaxes_to_auto_after_first_round() {
        let provider = MockToolProvider::new(1);
        let handler = CountingHandler {
            handled: AtomicUsize::new(0),
        };
        let mut request = request_with_tools(ToolChoice::Required);
        let mut usage = TokenUsage::default();

        tool_loop(&provider, &mut request, &handler, 10, &mut usage)
            .await
            .unwrap_or_else(|e| panic!("tool_loop failed: {e}"));

        assert_eq!(request.tool_choice, ToolChoice::Auto);
    }

    #[tokio::test]
    async fn test_handler_error_aborts_loop() {
        let provider = MockToolProvider::new(2);
        let mut request = request_with_tools(ToolChoice::Auto);
        let mut usage = TokenUsage::default();

        let result = tool_loop(&provider, &mut request, &AbortingHandler, 10, &mut usage).await;
        assert!(matches!(result, Err(AgentError::Selection { .. })));
    }
}
