//! LlmProvider trait definition.
//!
//! This is the core abstraction that every completion backend implements.
//! Uses RPITIT for `complete` and `Pin<Box<dyn Stream>>` for `stream`
//! (streams need to be object-safe for the BoxLlmProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use parley_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

/// Boxed provider event stream.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Trait for completion backends (OpenAI, Groq, a Parley relay).
///
/// Implementations live in parley-infra (e.g., `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai", "groq").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    ///
    /// Establishment failures surface as the first (and only) `Err` item.
    fn stream(&self, request: CompletionRequest) -> EventStream;
}
