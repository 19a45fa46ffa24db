//! `OpenAI` provider implementation using the `async-openai` crate.
//!
//! Supports any `OpenAI`-compatible API (`OpenAI`, Azure, local proxies)
//! via the base URL override in [`DocentConfig`]. Every call site gets an
//! enforced timeout and bounded retry on transport failures.

use std::pin::Pin;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestToolMessage, ChatCompletionRequestUserMessage, ChatCompletionTool,
    ChatCompletionToolChoiceOption, ChatCompletionToolType, CreateChatCompletionRequest,
    CreateChatCompletionStreamResponse, FinishReason, FunctionCall, FunctionObject,
    ResponseFormat,
};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tracing::debug;

use super::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use super::provider::LlmProvider;
use super::tool::{ToolCall, ToolChoice};
use crate::config::DocentConfig;
use crate::error::AgentError;

/// Base delay for retry backoff.
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Delay before retry `attempt` (1-based), doubling each time.
pub(crate) const fn retry_backoff(attempt: u32) -> Duration {
    let exp = if attempt > 6 { 6 } else { attempt };
    Duration::from_millis(RETRY_BASE_DELAY_MS << exp)
}

/// Whether an SDK error is worth retrying (transport-level only).
pub(crate) const fn is_transient(error: &OpenAIError) -> bool {
    matches!(error, OpenAIError::Reqwest(_))
}

pub(crate) fn api_error(error: &OpenAIError) -> AgentError {
    AgentError::ApiRequest {
        message: error.to_string(),
        status: None,
    }
}

/// Canonical wire name for a finish reason.
const fn finish_reason_label(reason: &FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::ToolCalls => "tool_calls",
        FinishReason::ContentFilter => "content_filter",
        FinishReason::FunctionCall => "function_call",
    }
}

/// `OpenAI`-compatible LLM provider.
///
/// Wraps the `async-openai` client for chat completions. Compatible
/// with any API that follows the `OpenAI` chat completion spec.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiProvider {
    /// Creates a new provider from pipeline configuration.
    #[must_use]
    pub fn new(config: &DocentConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            timeout: config.timeout,
            max_retries: config.max_retries,
        }
    }

    /// Converts our message type to the `OpenAI` SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: async_openai::types::ChatCompletionRequestSystemMessageContent::Text(
                        msg.content.clone(),
                    ),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: async_openai::types::ChatCompletionRequestUserMessageContent::Text(
                    msg.content.clone(),
                ),
                name: None,
            }),
            Role::Assistant => {
                let tool_calls = if msg.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        msg.tool_calls
                            .iter()
                            .map(|tc| ChatCompletionMessageToolCall {
                                id: tc.id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                };

                let content = if msg.content.is_empty() {
                    None
                } else {
                    Some(
                        async_openai::types::ChatCompletionRequestAssistantMessageContent::Text(
                            msg.content.clone(),
                        ),
                    )
                };

                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content,
                    name: None,
                    tool_calls,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
            Role::Tool => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                content: async_openai::types::ChatCompletionRequestToolMessageContent::Text(
                    msg.content.clone(),
                ),
                tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
            }),
        }
    }

    /// Builds an `OpenAI` chat completion request from our generic request.
    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let response_format = if request.json_mode {
            Some(ResponseFormat::JsonObject)
        } else {
            None
        };

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|td| ChatCompletionTool {
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionObject {
                            name: td.name.clone(),
                            description: Some(td.description.clone()),
                            parameters: Some(td.parameters.clone()),
                            strict: None,
                        },
                    })
                    .collect(),
            )
        };

        let tool_choice = if request.tools.is_empty() {
            None
        } else {
            match request.tool_choice {
                ToolChoice::Auto => None,
                ToolChoice::Required => Some(ChatCompletionToolChoiceOption::Required),
            }
        };

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature.filter(|&t| t != 0.0),
            max_completion_tokens: request.max_tokens,
            stream: if request.stream { Some(true) } else { None },
            response_format,
            tools,
            tool_choice,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let openai_request = Self::build_request(request);
        let timeout_secs = self.timeout.as_secs();

        let mut last_error = AgentError::Timeout { secs: timeout_secs };

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_backoff(attempt)).await;
                debug!(attempt, "retrying chat request");
            }

            let chat = self.client.chat();
            let call = chat.create(openai_request.clone());
            match tokio::time::timeout(self.timeout, call).await {
                Err(_) => {
                    last_error = AgentError::Timeout { secs: timeout_secs };
                }
                Ok(Err(e)) if is_transient(&e) => {
                    last_error = api_error(&e);
                }
                Ok(Err(e)) => return Err(api_error(&e)),
                Ok(Ok(response)) => {
                    let choice = response.choices.first();

                    let content = choice
                        .and_then(|c| c.message.content.as_ref())
                        .cloned()
                        .unwrap_or_default();

                    let tool_calls = choice
                        .and_then(|c| c.message.tool_calls.as_ref())
                        .map(|tcs| {
                            tcs.iter()
                                .map(|tc| ToolCall {
                                    id: tc.id.clone(),
                                    name: tc.function.name.clone(),
                                    arguments: tc.function.arguments.clone(),
                                })
                                .collect()
                        })
                        .unwrap_or_default();

                    let finish_reason = choice
                        .and_then(|c| c.finish_reason.as_ref())
                        .map(|fr| finish_reason_label(fr).to_string());

                    let usage = response
                        .usage
                        .map_or_else(TokenUsage::default, |u| TokenUsage {
                            prompt_tokens: u.prompt_tokens,
                            completion_tokens: u.completion_tokens,
                            total_tokens: u.total_tokens,
                        });

                    return Ok(ChatResponse {
                        content,
                        usage,
                        tool_calls,
                        finish_reason,
                    });
                }
            }
        }

        Err(last_error)
    }

    async fn chat_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>, AgentError> {
        let mut stream_request = request.clone();
        stream_request.stream = true;
        let openai_request = Self::build_request(&stream_request);

        let chat = self.client.chat();
        let connect = chat.create_stream(openai_request);
        let stream = tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| AgentError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| api_error(&e))?;

        let mapped = stream.map(
            |result: Result<CreateChatCompletionStreamResponse, OpenAIError>| match result {
                Ok(response) => {
                    let text = response
                        .choices
                        .first()
                        .and_then(|c| c.delta.content.as_ref())
                        .cloned()
                        .unwrap_or_default();
                    Ok(text)
                }
                Err(e) => Err(AgentError::Stream {
                    message: e.to_string(),
                }),
            },
        );

        Ok(Box::pin(mapped))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::llm::message;
    use crate::llm::tool::query_tool_definition;

    fn request_with(tools: Vec<crate::llm::tool::ToolDefinition>, choice: ToolChoice) -> ChatRequest {
        ChatRequest {
            model: "gpt-5.2-2025-12-11".to_string(),
            messages: vec![message::user_message("test")],
            temperature: Some(0.0),
            max_tokens: Some(100),
            json_mode: false,
            stream: false,
            tools,
            tool_choice: choice,
        }
    }

    #[test]
    fn test_convert_system_message() {
        let msg = message::system_message("test");
        let converted = OpenAiProvider::convert_message(&msg);
        assert!(matches!(converted, ChatCompletionRequestMessage::System(_)));
    }

    #[test]
    fn test_convert_tool_message() {
        let msg = message::tool_message("call_123", "result data");
        let converted = OpenAiProvider::convert_message(&msg);
        assert!(matches!(converted, ChatCompletionRequestMessage::Tool(_)));
    }

    #[test]
    fn test_convert_assistant_with_tool_calls() {
        let msg = message::assistant_tool_calls_message(vec![ToolCall {
            id: "call_1".to_string(),
            name: "fact_lookup".to_string(),
            arguments: r#"{"query":"price"}"#.to_string(),
        }]);
        let converted = OpenAiProvider::convert_message(&msg);
        if let ChatCompletionRequestMessage::Assistant(a) = converted {
            assert!(a.tool_calls.is_some());
            let tcs = a.tool_calls.as_ref().map_or(0, Vec::len);
            assert_eq!(tcs, 1);
        } else {
            panic!("Expected Assistant message");
        }
    }

    #[test]
    fn test_build_request_json_mode() {
        let mut request = request_with(Vec::new(), ToolChoice::Auto);
        request.json_mode = true;
        let built = OpenAiProvider::build_request(&request);
        assert!(built.response_format.is_some());
        assert!(built.tools.is_none());
        assert!(built.tool_choice.is_none());
    }

    #[test]
    fn test_build_request_with_tools() {
        let request = request_with(
            vec![query_tool_definition("tool_root_pricing", "Pricing facts.")],
            ToolChoice::Auto,
        );
        let built = OpenAiProvider::build_request(&request);
        let tools = built.tools.as_ref().map_or(0, Vec::len);
        assert_eq!(tools, 1);
        // Auto stays unset so the provider default applies.
        assert!(built.tool_choice.is_none());
    }

    #[test]
    fn test_build_request_required_tool_choice() {
        let request = request_with(
            vec![query_tool_definition("tool_root_pricing", "Pricing facts.")],
            ToolChoice::Required,
        );
        let built = OpenAiProvider::build_request(&request);
        assert!(matches!(
            built.tool_choice,
            Some(ChatCompletionToolChoiceOption::Required)
        ));
    }

    #[test]
    fn test_required_without_tools_is_dropped() {
        let request = request_with(Vec::new(), ToolChoice::Required);
        let built = OpenAiProvider::build_request(&request);
        assert!(built.tool_choice.is_none());
    }

    #[test]
    fn test_finish_reason_labels() {
        assert_eq!(finish_reason_label(&FinishReason::Stop), "stop");
        assert_eq!(finish_reason_label(&FinishReason::ToolCalls), "tool_calls");
    }

    #[test]
    fn test_retry_backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(1), Duration::from_millis(1000));
        assert_eq!(retry_backoff(2), Duration::from_millis(2000));
        assert_eq!(retry_backoff(3), Duration::from_millis(4000));
        // Capped exponent keeps long retry chains bounded.
        assert_eq!(retry_backoff(40), retry_backoff(6));
    }
}
