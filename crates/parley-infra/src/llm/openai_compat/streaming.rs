//! OpenAI SSE stream to [`StreamEvent`] adapter.
//!
//! Maps `async-openai`'s [`ChatCompletionResponseStream`] chunks to the
//! provider-agnostic [`StreamEvent`] enum defined in `parley-types`.

use futures_util::StreamExt;

use async_openai::types::chat::ChatCompletionResponseStream;

use parley_core::llm::provider::EventStream;
use parley_types::llm::{LlmError, StreamEvent, Usage};

use super::map_finish_reason;

/// Map an async-openai [`ChatCompletionResponseStream`] to a stream of [`StreamEvent`]s.
///
/// The returned stream emits events in this order:
/// 1. `Connected` -- immediately on entry
/// 2. `TextDelta` -- for each non-empty content chunk
/// 3. `MessageDelta` -- with the stop reason when finish_reason appears
/// 4. `Usage` -- token usage (requires `stream_options.include_usage = true` on request)
/// 5. `Done` -- at the end of the stream
///
/// A chunk that fails to arrive ends the stream with `LlmError::Stream`.
pub fn map_openai_stream(stream: ChatCompletionResponseStream) -> EventStream {
    Box::pin(async_stream::try_stream! {
        yield StreamEvent::Connected;

        let mut stream = stream;

        while let Some(result) = stream.next().await {
            let chunk = result.map_err(|e| LlmError::Stream(e.to_string()))?;

            for choice in chunk.choices {
                if let Some(text) = choice.delta.content {
                    if !text.is_empty() {
                        yield StreamEvent::TextDelta { text };
                    }
                }

                if let Some(finish_reason) = choice.finish_reason {
                    yield StreamEvent::MessageDelta {
                        stop_reason: map_finish_reason(&finish_reason),
                    };
                }
            }

            // The final chunk carries usage with an empty choices array.
            if let Some(usage) = chunk.usage {
                yield StreamEvent::Usage(Usage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                });
            }
        }

        yield StreamEvent::Done;
    })
}
