//! Owner-scoped access to stored conversations.
//!
//! ChatHistoryService backs the history screens: listing, searching,
//! opening, and deleting an owner's past chats. Every call needs a resolved
//! owner and fails with `AuthRequired` before touching the repository
//! otherwise.

use std::sync::Arc;

use parley_types::chat::{ChatRecord, OwnerId};
use parley_types::error::{ChatError, RepositoryError};
use tracing::{info, warn};
use uuid::Uuid;

use super::repository::ChatHistoryRepository;

/// Owner-scoped facade over a [`ChatHistoryRepository`].
pub struct ChatHistoryService<R: ChatHistoryRepository> {
    repo: Arc<R>,
}

impl<R: ChatHistoryRepository> ChatHistoryService<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Shared handle to the underlying repository (for building controllers).
    pub fn repo(&self) -> Arc<R> {
        Arc::clone(&self.repo)
    }

    /// All of the owner's chats, most recently updated first.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, owner: Option<&OwnerId>) -> Result<Vec<ChatRecord>, ChatError> {
        let owner = owner.ok_or(ChatError::AuthRequired)?;
        Ok(self.repo.list_by_owner(owner, None).await?)
    }

    /// Chats whose title contains `query`, ignoring case.
    #[tracing::instrument(skip(self))]
    pub async fn search(
        &self,
        owner: Option<&OwnerId>,
        query: &str,
    ) -> Result<Vec<ChatRecord>, ChatError> {
        let owner = owner.ok_or(ChatError::AuthRequired)?;
        Ok(self.repo.list_by_owner(owner, Some(query)).await?)
    }

    /// One chat, if it exists and belongs to the owner.
    pub async fn get(
        &self,
        owner: Option<&OwnerId>,
        id: &Uuid,
    ) -> Result<Option<ChatRecord>, ChatError> {
        let owner = owner.ok_or(ChatError::AuthRequired)?;
        let record = self.repo.get(id).await?;
        Ok(record.filter(|r| &r.user_id == owner))
    }

    /// Delete one of the owner's chats.
    pub async fn delete(&self, owner: Option<&OwnerId>, id: &Uuid) -> Result<(), ChatError> {
        let owner = owner.ok_or(ChatError::AuthRequired)?;

        match self.repo.get(id).await? {
            Some(record) if &record.user_id == owner => {}
            Some(_) => {
                warn!(chat_id = %id, owner = %owner, "refusing to delete another user's chat");
                return Err(RepositoryError::NotFound.into());
            }
            None => return Err(RepositoryError::NotFound.into()),
        }

        self.repo.delete(id).await?;
        info!(chat_id = %id, "chat deleted");
        Ok(())
    }
}
