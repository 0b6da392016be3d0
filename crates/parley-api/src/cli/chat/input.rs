//! Async readline input handling for the chat loop.
//!
//! Wraps `rustyline_async::Readline` so input can be read while a reply is
//! streaming; that is how Ctrl+C reaches an in-flight exchange.

use std::future::Future;

use rustyline_async::{Readline, ReadlineError, ReadlineEvent, SharedWriter};

/// Events produced by the input handler.
#[derive(Debug)]
pub enum InputEvent {
    /// User submitted a line (trimmed).
    Message(String),
    /// End of file (Ctrl+D).
    Eof,
    /// Interrupt signal (Ctrl+C).
    Interrupted,
}

/// Anything the chat loop can read lines from.
pub trait LineSource {
    fn read_line(&mut self) -> impl Future<Output = InputEvent>;
}

/// Async input handler wrapping rustyline_async.
pub struct ChatInput {
    rl: Readline,
}

impl ChatInput {
    /// Create the input handler with the given prompt.
    ///
    /// The returned `SharedWriter` prints output without clobbering the
    /// prompt line.
    pub fn new(prompt: String) -> Result<(Self, SharedWriter), ReadlineError> {
        let (rl, stdout) = Readline::new(prompt)?;
        Ok((Self { rl }, stdout))
    }

    /// Read a line of input. Read errors are treated as end of input.
    pub async fn read_line(&mut self) -> InputEvent {
        match self.rl.readline().await {
            Ok(ReadlineEvent::Line(line)) => InputEvent::Message(line.trim().to_string()),
            Ok(ReadlineEvent::Eof) => InputEvent::Eof,
            Ok(ReadlineEvent::Interrupted) => InputEvent::Interrupted,
            Err(e) => {
                tracing::debug!(error = %e, "readline failed");
                InputEvent::Eof
            }
        }
    }

    /// Clear the terminal screen.
    pub fn clear(&mut self) {
        let _ = self.rl.clear();
    }
}

impl LineSource for ChatInput {
    async fn read_line(&mut self) -> InputEvent {
        ChatInput::read_line(self).await
    }
}
