//! Authentication boundary.
//!
//! The chat layer only ever sees the resolved [`OwnerId`](parley_types::chat::OwnerId);
//! credential material stays behind these traits.

pub mod backend;
pub mod service;
