//! Shared domain types for Parley.
//!
//! This crate contains the types shared by every layer: chat turns and
//! sessions, LLM request/stream shapes, auth sessions, configuration, and
//! the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror, secrecy.

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod relay;
