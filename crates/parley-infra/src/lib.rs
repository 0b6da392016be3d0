//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`:
//! SQLite chat history, OS keychain storage, OpenAI-compatible and relay
//! completion providers, the hosted auth backend, and config loading.

pub mod auth;
pub mod config;
pub mod keychain;
pub mod llm;
pub mod sqlite;
