//! HTTP layer for `parley serve`.
//!
//! Axum relay exposing `POST /api/chat` (SSE or JSON) and `/health`, with
//! the envelope error format and CORS.

pub mod error;
pub mod handlers;
pub mod router;
