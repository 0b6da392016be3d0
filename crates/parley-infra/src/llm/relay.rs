//! Client for a `parley serve` relay endpoint.
//!
//! The relay holds the upstream API key and runs reasoning extraction
//! server-side, so this provider only decodes its SSE events.

use futures_util::StreamExt;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};

use parley_core::llm::provider::{EventStream, LlmProvider};
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, StopReason, StreamEvent, Usage,
};
use parley_types::relay::{
    EVENT_DONE, EVENT_ERROR, EVENT_REASONING_DELTA, EVENT_TEXT_DELTA, RelayDelta,
    RelayErrorEvent, RelayReply, RelayRequest,
};

/// Path of the completion route on a relay server.
pub const CHAT_PATH: &str = "/api/chat";

/// Provider that forwards completions through a relay server.
pub struct RelayProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl RelayProvider {
    /// `base_url` is the relay origin, e.g. `http://127.0.0.1:3000`.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}{CHAT_PATH}", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body(request: &CompletionRequest, stream: bool) -> RelayRequest {
        RelayRequest {
            messages: request.messages.clone(),
            system: request.system.clone(),
            stream,
        }
    }
}

fn status_error(status: reqwest::StatusCode, body: String) -> LlmError {
    match status.as_u16() {
        400 | 422 => LlmError::InvalidRequest(body),
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited {
            retry_after_ms: None,
        },
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

fn parse_data<T: serde::de::DeserializeOwned>(event: &str, data: &str) -> Result<T, LlmError> {
    serde_json::from_str(data)
        .map_err(|e| LlmError::Deserialization(format!("invalid {event} event: {e}")))
}

impl LlmProvider for RelayProvider {
    fn name(&self) -> &str {
        "relay"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&Self::body(request, false))
            .send()
            .await
            .map_err(|e| LlmError::Provider {
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_body));
        }

        let reply: RelayReply = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        Ok(CompletionResponse {
            id: String::new(),
            content: reply.content,
            reasoning: reply.reasoning,
            model: request.model.clone(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        })
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        let builder = self.client.post(&self.endpoint).json(&Self::body(&request, true));

        let mut source: EventSource = match builder.eventsource() {
            Ok(source) => source,
            Err(e) => {
                let err = LlmError::Provider {
                    message: format!("failed to build relay request: {e}"),
                };
                return Box::pin(futures_util::stream::once(async move { Err(err) }));
            }
        };
        // A chat reply must never be replayed from the start.
        source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        Box::pin(async_stream::try_stream! {
            let mut finished = false;

            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => yield StreamEvent::Connected,
                    Ok(Event::Message(msg)) => match msg.event.as_str() {
                        EVENT_TEXT_DELTA => {
                            let delta: RelayDelta = parse_data(EVENT_TEXT_DELTA, &msg.data)?;
                            yield StreamEvent::TextDelta { text: delta.text };
                        }
                        EVENT_REASONING_DELTA => {
                            let delta: RelayDelta = parse_data(EVENT_REASONING_DELTA, &msg.data)?;
                            yield StreamEvent::ThinkingDelta { thinking: delta.text };
                        }
                        EVENT_ERROR => {
                            source.close();
                            let err: RelayErrorEvent = parse_data(EVENT_ERROR, &msg.data)?;
                            Err(LlmError::Stream(err.message))?;
                        }
                        EVENT_DONE => {
                            finished = true;
                            break;
                        }
                        other => {
                            tracing::debug!(event = other, "ignoring unknown relay event");
                        }
                    },
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                        source.close();
                        let body = response.text().await.unwrap_or_default();
                        Err(status_error(status, body))?;
                    }
                    Err(e) => {
                        source.close();
                        Err(LlmError::Stream(e.to_string()))?;
                    }
                }
            }
            source.close();

            if !finished {
                Err(LlmError::Stream("relay closed the stream before it finished".to_string()))?;
            }
            yield StreamEvent::Done;
        })
    }
}
