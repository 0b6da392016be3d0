//! Relay completion endpoint.
//!
//! POST /api/chat
//!
//! Forwards a turn history to the configured upstream provider. Reasoning
//! extraction happens here, so clients receive it pre-split.
//!
//! With `"stream": true` (the default) the reply is Server-Sent Events:
//! - `reasoning_delta` -- reasoning text: `{ "text": "..." }`
//! - `text_delta` -- visible text: `{ "text": "..." }`
//! - `error` -- upstream failure, ends the stream: `{ "message": "..." }`
//! - `done` -- clean end of stream: `{}`
//!
//! Otherwise a single JSON `{ "content", "reasoning" }` is returned.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Serialize;
use tokio_stream::Stream;
use tracing::{debug, warn};

use parley_core::llm::completion::{CompletionClient, DeltaStream};
use parley_types::chat::{MessageRole, Turn};
use parley_types::error::ChatError;
use parley_types::relay::{
    EVENT_DONE, EVENT_ERROR, EVENT_REASONING_DELTA, EVENT_TEXT_DELTA, RelayDelta,
    RelayErrorEvent, RelayReply, RelayRequest,
};

use crate::http::error::AppError;
use crate::http::router::RelayState;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

pub async fn chat<C>(State(state): State<RelayState<C>>, body: Bytes) -> Result<Response, AppError>
where
    C: CompletionClient + 'static,
{
    let request = parse_request(&body)?;
    let turns = to_turns(request.messages, request.system);
    debug!(turns = turns.len(), stream = request.stream, "relay request");

    if request.stream {
        let deltas = state.client.stream_reply(&turns);
        return Ok(Sse::new(relay_events(deltas))
            .keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
            .into_response());
    }

    let reply = state.client.complete_reply(&turns).await?;
    Ok(Json(RelayReply {
        content: reply.content_delta.unwrap_or_default(),
        reasoning: reply.reasoning_delta.filter(|r| !r.is_empty()),
    })
    .into_response())
}

/// Decode and validate the body. Any failure is `RequestMalformed` and no
/// upstream call is made.
fn parse_request(body: &[u8]) -> Result<RelayRequest, ChatError> {
    let request: RelayRequest = serde_json::from_slice(body)
        .map_err(|e| ChatError::RequestMalformed(format!("invalid request body: {e}")))?;

    if request.messages.is_empty() {
        return Err(ChatError::RequestMalformed(
            "messages must not be empty".to_string(),
        ));
    }
    if request
        .messages
        .last()
        .is_some_and(|m| m.role != MessageRole::User)
    {
        return Err(ChatError::RequestMalformed(
            "the last message must come from the user".to_string(),
        ));
    }
    Ok(request)
}

fn to_turns(
    messages: Vec<parley_types::llm::Message>,
    system: Option<String>,
) -> Vec<Turn> {
    system
        .filter(|s| !s.trim().is_empty())
        .map(|s| Turn::new(MessageRole::System, s))
        .into_iter()
        .chain(messages.into_iter().map(|m| Turn::new(m.role, m.content)))
        .collect()
}

fn sse_event<T: Serialize>(name: &'static str, payload: &T) -> Event {
    let data = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(name).data(data)
}

/// Map reply fragments to relay events. A failed stream ends with `error`
/// and never sends `done`.
fn relay_events(mut deltas: DeltaStream) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => {
                    if let Some(text) = delta.reasoning_delta.filter(|t| !t.is_empty()) {
                        yield Ok(sse_event(EVENT_REASONING_DELTA, &RelayDelta { text }));
                    }
                    if let Some(text) = delta.content_delta.filter(|t| !t.is_empty()) {
                        yield Ok(sse_event(EVENT_TEXT_DELTA, &RelayDelta { text }));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "upstream stream failed");
                    yield Ok(sse_event(EVENT_ERROR, &RelayErrorEvent { message: e.to_string() }));
                    return;
                }
            }
        }
        yield Ok(Event::default().event(EVENT_DONE).data("{}"));
    }
}
