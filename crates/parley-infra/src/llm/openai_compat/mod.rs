//! OpenAI-compatible completion provider.
//!
//! A single [`OpenAiCompatibleProvider`] serves OpenAI and Groq via
//! configurable base URLs and factory functions.
//!
//! Uses [`async_openai`] for type-safe request/response handling and
//! built-in SSE streaming.

pub mod config;
pub mod streaming;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, ChatCompletionStreamOptions,
    CreateChatCompletionRequest, FinishReason,
};

use parley_core::llm::provider::{EventStream, LlmProvider};
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, MessageRole, StopReason, Usage,
};

use self::config::OpenAiCompatConfig;
use self::streaming::map_openai_stream;

/// Unified provider for any OpenAI-compatible API.
///
/// Does NOT derive Debug: the `async_openai::Client` inside holds the API key.
pub struct OpenAiCompatibleProvider {
    client: Client<OpenAIConfig>,
    provider_name: String,
    model: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.base_url);

        Self {
            client: Client::with_config(openai_config),
            provider_name: config.provider_name,
            model: config.model,
        }
    }

    /// Create an OpenAI provider (`https://api.openai.com/v1`).
    pub fn openai(api_key: &str, model: &str) -> Self {
        Self::new(config::openai_defaults(api_key, model))
    }

    /// Create a Groq provider (`https://api.groq.com/openai/v1`).
    pub fn groq(api_key: &str, model: &str) -> Self {
        Self::new(config::groq_defaults(api_key, model))
    }

    /// Build a [`CreateChatCompletionRequest`] from a generic [`CompletionRequest`].
    fn build_request(&self, request: &CompletionRequest, stream: bool) -> CreateChatCompletionRequest {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();

        if let Some(ref system) = request.system {
            messages.push(system_message(system.clone()));
        }

        for msg in &request.messages {
            let oai_msg = match msg.role {
                MessageRole::System => system_message(msg.content.clone()),
                MessageRole::User => {
                    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                        content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                        name: None,
                    })
                }
                MessageRole::Assistant => {
                    #[allow(deprecated)]
                    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                        content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                            msg.content.clone(),
                        )),
                        refusal: None,
                        name: None,
                        audio: None,
                        tool_calls: None,
                        function_call: None,
                    })
                }
            };
            messages.push(oai_msg);
        }

        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        let mut req = CreateChatCompletionRequest {
            model,
            messages,
            max_completion_tokens: Some(request.max_tokens),
            temperature: request.temperature.map(|t| t as f32),
            ..Default::default()
        };

        if stream {
            req.stream = Some(true);
            req.stream_options = Some(ChatCompletionStreamOptions {
                include_usage: Some(true),
                include_obfuscation: None,
            });
        }

        req
    }
}

fn system_message(content: String) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: ChatCompletionRequestSystemMessageContent::Text(content),
        name: None,
    })
}

/// Map an OpenAI finish reason onto [`StopReason`].
pub(crate) fn map_finish_reason(reason: &FinishReason) -> StopReason {
    match reason {
        FinishReason::Stop => StopReason::EndTurn,
        FinishReason::Length => StopReason::MaxTokens,
        FinishReason::ContentFilter => StopReason::ContentFilter,
        // Parley never offers tools; treat a stray tool call as a finished turn.
        FinishReason::ToolCalls | FinishReason::FunctionCall => StopReason::EndTurn,
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let oai_request = self.build_request(request, false);

        let response = self
            .client
            .chat()
            .create(oai_request)
            .await
            .map_err(map_openai_error)?;

        let first = response.choices.first();
        let content = first
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        let stop_reason = first
            .and_then(|c| c.finish_reason.as_ref())
            .map(map_finish_reason)
            .unwrap_or(StopReason::EndTurn);

        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: response.id,
            content,
            // Inline reasoning is split out by the completion client.
            reasoning: None,
            model: response.model,
            stop_reason,
            usage,
        })
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        let oai_request = self.build_request(&request, true);

        // Clone the client for the 'static stream.
        let client = self.client.clone();

        Box::pin(async_stream::try_stream! {
            let oai_stream = client
                .chat()
                .create_stream(oai_request)
                .await
                .map_err(map_openai_error)?;

            let mut inner = map_openai_stream(oai_stream);

            use futures_util::StreamExt;
            while let Some(event) = inner.next().await {
                yield event?;
            }
        })
    }
}

/// Map an `async_openai::error::OpenAIError` to an [`LlmError`].
fn map_openai_error(err: async_openai::error::OpenAIError) -> LlmError {
    use async_openai::error::OpenAIError;

    match &err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.as_deref().unwrap_or("");
            let error_type = api_err.r#type.as_deref().unwrap_or("");

            if code == "authentication_error"
                || code == "invalid_api_key"
                || error_type == "authentication_error"
                || api_err.message.contains("Incorrect API key")
                || api_err.message.contains("Invalid API key")
            {
                LlmError::AuthenticationFailed
            } else if code == "rate_limit_exceeded" || error_type == "rate_limit_error" {
                LlmError::RateLimited {
                    retry_after_ms: None,
                }
            } else if error_type == "invalid_request_error"
                || code == "context_length_exceeded"
            {
                LlmError::InvalidRequest(api_err.message.clone())
            } else {
                LlmError::Provider {
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::Reqwest(reqwest_err) => match reqwest_err.status().map(|s| s.as_u16()) {
            Some(400) | Some(422) => LlmError::InvalidRequest(err.to_string()),
            Some(401) | Some(403) => LlmError::AuthenticationFailed,
            Some(429) => LlmError::RateLimited {
                retry_after_ms: None,
            },
            _ => LlmError::Provider {
                message: err.to_string(),
            },
        },
        OpenAIError::JSONDeserialize(_, content) => {
            LlmError::Deserialization(format!("failed to parse response: {content}"))
        }
        OpenAIError::StreamError(stream_err) => LlmError::Stream(stream_err.to_string()),
        OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg.clone()),
        _ => LlmError::Provider {
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::llm::Message;

    fn request(messages: Vec<Message>, system: Option<&str>) -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o".to_string(),
            messages,
            system: system.map(str::to_string),
            max_tokens: 1024,
            temperature: Some(0.7),
            stream: false,
        }
    }

    #[test]
    fn test_openai_factory() {
        let provider = OpenAiCompatibleProvider::openai("sk-test", "gpt-4o");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model, "gpt-4o");
    }

    #[test]
    fn test_groq_factory() {
        let provider = OpenAiCompatibleProvider::groq("gsk-test", "deepseek-r1-distill-qwen-32b");
        assert_eq!(provider.name(), "groq");
        assert_eq!(provider.model, "deepseek-r1-distill-qwen-32b");
    }

    #[test]
    fn test_build_request_messages() {
        let provider = OpenAiCompatibleProvider::openai("sk-test", "gpt-4o");
        let request = request(
            vec![
                Message {
                    role: MessageRole::User,
                    content: "Hello".to_string(),
                },
                Message {
                    role: MessageRole::Assistant,
                    content: "Hi there!".to_string(),
                },
            ],
            Some("Be helpful"),
        );

        let oai_req = provider.build_request(&request, false);
        assert_eq!(oai_req.model, "gpt-4o");
        // 1 system + 2 conversation = 3 messages
        assert_eq!(oai_req.messages.len(), 3);
        assert_eq!(oai_req.max_completion_tokens, Some(1024));
        assert!(oai_req.stream.is_none());
        assert!(oai_req.stream_options.is_none());
    }

    #[test]
    fn test_build_request_streaming() {
        let provider = OpenAiCompatibleProvider::openai("sk-test", "gpt-4o");
        let oai_req = provider.build_request(&request(vec![], None), true);

        assert_eq!(oai_req.stream, Some(true));
        let opts = oai_req.stream_options.unwrap();
        assert_eq!(opts.include_usage, Some(true));
    }

    #[test]
    fn test_build_request_empty_model_uses_default() {
        let provider = OpenAiCompatibleProvider::groq("gsk-test", "deepseek-r1-distill-qwen-32b");
        let mut req = request(vec![], None);
        req.model = String::new();

        let oai_req = provider.build_request(&req, false);
        assert_eq!(oai_req.model, "deepseek-r1-distill-qwen-32b");
    }

    #[test]
    fn test_finish_reason_mapping() {
        let cases = [
            (FinishReason::Stop, StopReason::EndTurn),
            (FinishReason::Length, StopReason::MaxTokens),
            (FinishReason::ContentFilter, StopReason::ContentFilter),
            (FinishReason::ToolCalls, StopReason::EndTurn),
        ];
        for (finish, expected) in cases {
            assert_eq!(map_finish_reason(&finish), expected);
        }
    }

    #[test]
    fn test_map_openai_error_api_auth() {
        use async_openai::error::{ApiError, OpenAIError};
        let api_err = ApiError {
            message: "Incorrect API key provided".to_string(),
            r#type: Some("authentication_error".to_string()),
            param: None,
            code: None,
        };
        let err = map_openai_error(OpenAIError::ApiError(api_err));
        assert!(matches!(err, LlmError::AuthenticationFailed));
    }

    #[test]
    fn test_map_openai_error_rate_limit() {
        use async_openai::error::{ApiError, OpenAIError};
        let api_err = ApiError {
            message: "Rate limit exceeded".to_string(),
            r#type: Some("rate_limit_error".to_string()),
            param: None,
            code: None,
        };
        let err = map_openai_error(OpenAIError::ApiError(api_err));
        assert!(matches!(err, LlmError::RateLimited { .. }));
    }

    #[test]
    fn test_map_openai_error_invalid_request() {
        use async_openai::error::{ApiError, OpenAIError};
        let api_err = ApiError {
            message: "messages: must not be empty".to_string(),
            r#type: Some("invalid_request_error".to_string()),
            param: Some("messages".to_string()),
            code: None,
        };
        let err = map_openai_error(OpenAIError::ApiError(api_err));
        assert!(matches!(err, LlmError::InvalidRequest(_)));

        let err = map_openai_error(OpenAIError::InvalidArgument("bad arg".to_string()));
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }
}
