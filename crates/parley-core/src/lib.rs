//! Session lifecycle and port definitions for Parley.
//!
//! This crate defines the "ports" (repository, completion, and auth traits)
//! that the infrastructure layer implements, plus the orchestration built
//! on them. It depends only on `parley-types` -- never on `parley-infra` or
//! any database/IO crate.

pub mod auth;
pub mod chat;
pub mod llm;
