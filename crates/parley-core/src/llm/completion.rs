//! Completion client: turn history in, content/reasoning deltas out.
//!
//! `CompletionClient` is the port the session controller and the relay
//! endpoint consume. `ProviderCompletionClient` implements it on top of any
//! [`LlmProvider`], stripping turn metadata before sending upstream and
//! demultiplexing inline reasoning on the way back.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use pin_project_lite::pin_project;
use tracing::{Instrument, debug, info_span};

use parley_types::chat::{CompletionDelta, Turn};
use parley_types::config::CompletionConfig;
use parley_types::llm::{CompletionRequest, LlmError, StreamEvent};

use super::box_provider::BoxLlmProvider;
use super::provider::LlmProvider;
use super::reasoning::{ReasoningExtractor, extract_reasoning};

/// Boxed stream of reply fragments. Finite, lazy, and not restartable.
pub type DeltaStream =
    Pin<Box<dyn Stream<Item = Result<CompletionDelta, LlmError>> + Send + 'static>>;

/// Port for issuing a completion over a full turn history.
///
/// Implementations are stateless across calls. A failure to establish the
/// call, or an abort mid-stream, surfaces as a single terminal `Err` item.
pub trait CompletionClient: Send + Sync {
    /// Stream the assistant's reply to `turns`.
    fn stream_reply(&self, turns: &[Turn]) -> DeltaStream;

    /// Produce the whole reply at once.
    fn complete_reply(
        &self,
        turns: &[Turn],
    ) -> impl Future<Output = Result<CompletionDelta, LlmError>> + Send;
}

/// Request parameters applied to every call.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub system: Option<String>,
    /// Tag wrapping inline reasoning; `None` disables extraction.
    pub reasoning_tag: Option<String>,
}

impl CompletionSettings {
    pub fn from_config(config: &CompletionConfig) -> Self {
        Self {
            model: config.resolved_model(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system: None,
            reasoning_tag: config.reasoning_tag().map(str::to_string),
        }
    }
}

/// [`CompletionClient`] backed by an [`LlmProvider`].
pub struct ProviderCompletionClient<P = BoxLlmProvider> {
    provider: P,
    settings: CompletionSettings,
}

impl<P: LlmProvider> ProviderCompletionClient<P> {
    pub fn new(provider: P, settings: CompletionSettings) -> Self {
        Self { provider, settings }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    /// Build the upstream request. Only role and content leave the client;
    /// turns with no content (e.g. an aborted reply) are skipped.
    fn build_request(&self, turns: &[Turn], stream: bool) -> CompletionRequest {
        CompletionRequest {
            model: self.settings.model.clone(),
            messages: turns
                .iter()
                .filter(|turn| !turn.content.trim().is_empty())
                .map(Turn::to_message)
                .collect(),
            system: self.settings.system.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            stream,
        }
    }
}

impl<P: LlmProvider> CompletionClient for ProviderCompletionClient<P> {
    fn stream_reply(&self, turns: &[Turn]) -> DeltaStream {
        let request = self.build_request(turns, true);

        let span = info_span!(
            "gen_ai.stream",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.request.stream = true,
            gen_ai.request.messages = request.messages.len(),
        );

        let events = span.in_scope(|| self.provider.stream(request));
        let tag = self.settings.reasoning_tag.clone();

        let deltas = async_stream::try_stream! {
            let mut extractor = tag.as_deref().map(ReasoningExtractor::new);
            let mut events = events;

            while let Some(event) = events.next().await {
                match event? {
                    StreamEvent::TextDelta { text } => {
                        let delta = match extractor.as_mut() {
                            Some(extractor) => extractor.push(&text),
                            None => CompletionDelta::content(text),
                        };
                        if !delta.is_empty() {
                            yield delta;
                        }
                    }
                    StreamEvent::ThinkingDelta { thinking } => {
                        if !thinking.is_empty() {
                            yield CompletionDelta::reasoning(thinking);
                        }
                    }
                    StreamEvent::Usage(usage) => {
                        debug!(
                            gen_ai.usage.input_tokens = usage.input_tokens,
                            gen_ai.usage.output_tokens = usage.output_tokens,
                            "completion usage"
                        );
                    }
                    StreamEvent::MessageDelta { stop_reason } => {
                        debug!(%stop_reason, "completion finishing");
                    }
                    StreamEvent::Done => break,
                    StreamEvent::Connected => {}
                }
            }

            if let Some(extractor) = extractor.as_mut() {
                let rest = extractor.finish();
                if !rest.is_empty() {
                    yield rest;
                }
            }
        };

        Box::pin(StreamInSpan {
            inner: deltas,
            span,
        })
    }

    async fn complete_reply(&self, turns: &[Turn]) -> Result<CompletionDelta, LlmError> {
        let request = self.build_request(turns, false);

        let span = info_span!(
            "gen_ai.complete",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            gen_ai.request.stream = false,
        );

        let response = self.provider.complete(&request).instrument(span).await?;

        let (content, extracted) = match self.settings.reasoning_tag.as_deref() {
            Some(tag) => extract_reasoning(&response.content, tag),
            None => (response.content, None),
        };
        let reasoning = match (response.reasoning, extracted) {
            (Some(native), Some(inline)) => Some(format!("{native}\n{inline}")),
            (native, inline) => native.or(inline),
        };

        Ok(CompletionDelta {
            content_delta: Some(content),
            reasoning_delta: reasoning,
        })
    }
}

pin_project! {
    /// Keeps a tracing span entered for every poll of the wrapped stream so
    /// the span covers the whole streamed response, not just its creation.
    struct StreamInSpan<S> {
        #[pin]
        inner: S,
        span: tracing::Span,
    }
}

impl<S: Stream> Stream for StreamInSpan<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _enter = this.span.enter();
        this.inner.poll_next(cx)
    }
}
