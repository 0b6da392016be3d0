//! In-memory store for the active conversation.
//!
//! Holds the ordered turn list plus session metadata for exactly one
//! conversation. Only the session controller writes to it.

use parley_types::chat::{ChatRecord, ChatSession, MessageRole, OwnerId, RecordMeta, Turn};
use uuid::Uuid;

use super::title::derive_title;

/// Ordered turns and metadata for one conversation.
#[derive(Debug, Clone)]
pub struct SessionStore {
    session: ChatSession,
}

impl SessionStore {
    pub fn new(owner_id: Option<OwnerId>) -> Self {
        Self {
            session: ChatSession::new(owner_id),
        }
    }

    /// Add a turn to the end.
    ///
    /// The first user turn fixes the title; later turns never change it.
    pub fn append(&mut self, turn: Turn) {
        if self.session.title.is_none() && turn.role == MessageRole::User {
            self.session.title = Some(derive_title(&turn.content));
        }
        self.session.turns.push(turn);
    }

    /// Replace the final turn if it is an assistant turn, otherwise append.
    pub fn replace_last(&mut self, turn: Turn) {
        match self.session.turns.last_mut() {
            Some(last) if last.role == MessageRole::Assistant => *last = turn,
            _ => self.append(turn),
        }
    }

    /// Start a new chat: drop turns, title, and remote identity. Owner is kept.
    pub fn reset(&mut self) {
        let owner = self.session.owner_id.take();
        self.session = ChatSession::new(owner);
    }

    /// Load a persisted conversation so further exchanges update it.
    pub fn resume(&mut self, record: ChatRecord) {
        self.session = ChatSession {
            id: Some(record.id),
            owner_id: Some(record.user_id),
            title: Some(record.title),
            turns: record.messages,
            created_at: Some(record.created_at),
            updated_at: Some(record.updated_at),
        };
    }

    /// Apply identity and timestamps confirmed by the history store.
    pub fn reconcile(&mut self, meta: RecordMeta) {
        self.session.id = Some(meta.id);
        self.session.created_at = Some(meta.created_at);
        self.session.updated_at = Some(meta.updated_at);
    }

    pub fn set_owner(&mut self, owner_id: Option<OwnerId>) {
        self.session.owner_id = owner_id;
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn turns(&self) -> &[Turn] {
        &self.session.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.session.turns.last()
    }

    pub fn title(&self) -> Option<&str> {
        self.session.title.as_deref()
    }

    pub fn id(&self) -> Option<Uuid> {
        self.session.id
    }

    pub fn owner(&self) -> Option<&OwnerId> {
        self.session.owner_id.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.session.turns.is_empty()
    }
}
