//! Inline reasoning extraction.
//!
//! Some models (e.g. DeepSeek R1 distills) interleave their chain of thought
//! with the answer using markup like `<think>...</think>`. The extractor
//! splits such a text stream into content and reasoning channels. Delimiters
//! may arrive split across fragments, so any trailing text that could be the
//! start of the next delimiter is held back until the next push.

use parley_types::chat::CompletionDelta;

/// Streaming demultiplexer for tag-delimited reasoning.
#[derive(Debug, Clone)]
pub struct ReasoningExtractor {
    open: String,
    close: String,
    in_reasoning: bool,
    skip_newlines: bool,
    pending: String,
}

impl ReasoningExtractor {
    /// Create an extractor for `<tag>` / `</tag>`.
    pub fn new(tag: &str) -> Self {
        Self {
            open: format!("<{tag}>"),
            close: format!("</{tag}>"),
            in_reasoning: false,
            skip_newlines: false,
            pending: String::new(),
        }
    }

    /// Whether the extractor is currently inside a reasoning block.
    pub fn in_reasoning(&self) -> bool {
        self.in_reasoning
    }

    /// Feed one raw fragment; returns whatever can be emitted safely.
    pub fn push(&mut self, fragment: &str) -> CompletionDelta {
        self.pending.push_str(fragment);
        let mut out = Split::default();

        loop {
            if self.skip_newlines {
                let trimmed = self.pending.trim_start_matches(['\r', '\n']);
                if trimmed.is_empty() {
                    self.pending.clear();
                    break;
                }
                self.pending = trimmed.to_string();
                self.skip_newlines = false;
            }

            let delimiter = if self.in_reasoning {
                &self.close
            } else {
                &self.open
            };

            if let Some(pos) = self.pending.find(delimiter.as_str()) {
                let rest = self.pending.split_off(pos);
                let before = std::mem::take(&mut self.pending);
                out.push(self.in_reasoning, &before);
                self.pending = rest[delimiter.len()..].to_string();
                self.in_reasoning = !self.in_reasoning;
                self.skip_newlines = true;
                continue;
            }

            let held = partial_suffix_len(&self.pending, delimiter);
            let emit_len = self.pending.len() - held;
            let tail = self.pending.split_off(emit_len);
            let head = std::mem::replace(&mut self.pending, tail);
            out.push(self.in_reasoning, &head);
            break;
        }

        out.into_delta()
    }

    /// Flush held-back text at end of stream.
    pub fn finish(&mut self) -> CompletionDelta {
        let mut out = Split::default();
        let rest = std::mem::take(&mut self.pending);
        out.push(self.in_reasoning, &rest);
        out.into_delta()
    }
}

/// Split a complete response into `(content, reasoning)`.
pub fn extract_reasoning(text: &str, tag: &str) -> (String, Option<String>) {
    let mut extractor = ReasoningExtractor::new(tag);
    let first = extractor.push(text);
    let last = extractor.finish();

    let content: String = [first.content_delta, last.content_delta]
        .into_iter()
        .flatten()
        .collect();
    let reasoning: String = [first.reasoning_delta, last.reasoning_delta]
        .into_iter()
        .flatten()
        .collect();

    let reasoning = reasoning.trim_end().to_string();
    (content, (!reasoning.is_empty()).then_some(reasoning))
}

/// Length in bytes of the longest suffix of `text` that is a proper prefix of `delimiter`.
fn partial_suffix_len(text: &str, delimiter: &str) -> usize {
    delimiter
        .char_indices()
        .map(|(idx, _)| idx)
        .filter(|&idx| idx > 0 && text.ends_with(&delimiter[..idx]))
        .max()
        .unwrap_or(0)
}

#[derive(Default)]
struct Split {
    content: String,
    reasoning: String,
}

impl Split {
    fn push(&mut self, reasoning: bool, text: &str) {
        if reasoning {
            self.reasoning.push_str(text);
        } else {
            self.content.push_str(text);
        }
    }

    fn into_delta(self) -> CompletionDelta {
        CompletionDelta {
            content_delta: (!self.content.is_empty()).then_some(self.content),
            reasoning_delta: (!self.reasoning.is_empty()).then_some(self.reasoning),
        }
    }
}
