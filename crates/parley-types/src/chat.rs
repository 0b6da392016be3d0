//! Chat turn, session, and history record types for Parley.
//!
//! A conversation lives in memory as a [`ChatSession`] and is mirrored to
//! the `chat_history` table as a [`ChatRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

// Re-export MessageRole from llm module (it's used in both chat and llm contexts).
pub use crate::llm::MessageRole;
use crate::llm::Message;

/// Identifier of the authenticated user who owns a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One message in a conversation.
///
/// `reasoning` carries the model's intermediate reasoning when the provider
/// exposes it. `incomplete` marks an assistant turn whose stream ended with
/// a terminal error or was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub incomplete: bool,
}

impl Turn {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content: content.into(),
            reasoning: None,
            incomplete: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// The upstream view of this turn: role and content, reasoning stripped.
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// The in-memory conversation owned by the session controller.
///
/// `id`, `created_at` and `updated_at` stay `None` until the first
/// successful create in the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Option<Uuid>,
    pub owner_id: Option<OwnerId>,
    pub title: Option<String>,
    pub turns: Vec<Turn>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    pub fn new(owner_id: Option<OwnerId>) -> Self {
        Self {
            id: None,
            owner_id,
            title: None,
            turns: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// A persisted conversation row in `chat_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: Uuid,
    pub user_id: OwnerId,
    pub title: String,
    pub messages: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRecord {
    pub fn meta(&self) -> RecordMeta {
        RecordMeta {
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Remote identity and timestamps confirmed by the history store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One fragment of an assistant reply, split into visible and reasoning text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_delta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_delta: Option<String>,
}

impl CompletionDelta {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content_delta: Some(text.into()),
            reasoning_delta: None,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            content_delta: None,
            reasoning_delta: Some(text.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content_delta.as_deref().is_none_or(str::is_empty)
            && self.reasoning_delta.as_deref().is_none_or(str::is_empty)
    }
}

/// Lifecycle state of the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerState {
    /// No request in flight; awaiting user input.
    Idle,
    /// User turn appended and request issued; nothing received yet.
    Sending,
    /// Fragments arriving.
    Streaming,
    /// Reply finished, successfully or with a recorded error.
    Settled,
}

impl ControllerState {
    /// Whether a completion request is currently in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, ControllerState::Sending | ControllerState::Streaming)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Idle => write!(f, "idle"),
            ControllerState::Sending => write!(f, "sending"),
            ControllerState::Streaming => write!(f, "streaming"),
            ControllerState::Settled => write!(f, "settled"),
        }
    }
}
