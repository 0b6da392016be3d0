//! Interactive CLI chat for Parley.
//!
//! Streams replies through a session controller, renders reasoning apart
//! from the visible answer, and queues each settled exchange to the history
//! store. Entry point: `loop_runner::run_chat_loop`.

pub mod banner;
pub mod commands;
pub mod input;
pub mod loop_runner;
