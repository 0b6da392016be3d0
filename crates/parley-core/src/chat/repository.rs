//! ChatHistoryRepository trait definition.
//!
//! Durable mirror of conversations in the `chat_history` table, addressed
//! by owner and record id.

use parley_types::chat::{ChatRecord, OwnerId, Turn};
use parley_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for chat history persistence.
///
/// Implementations live in parley-infra (e.g., `SqliteChatHistoryRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatHistoryRepository: Send + Sync {
    /// Insert a new record. Assigns id, `created_at`, and `updated_at`.
    fn create(
        &self,
        owner: &OwnerId,
        title: &str,
        turns: &[Turn],
    ) -> impl std::future::Future<Output = Result<ChatRecord, RepositoryError>> + Send;

    /// Replace a record's turns and bump `updated_at`. The title is untouched.
    ///
    /// Returns `RepositoryError::NotFound` when no record has this id.
    fn update(
        &self,
        id: &Uuid,
        turns: &[Turn],
    ) -> impl std::future::Future<Output = Result<ChatRecord, RepositoryError>> + Send;

    /// Delete a record. Returns `RepositoryError::NotFound` when absent.
    fn delete(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a record by id.
    fn get(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ChatRecord>, RepositoryError>> + Send;

    /// List an owner's records, newest `updated_at` first.
    ///
    /// `title_filter` is a case-insensitive substring match on the title.
    fn list_by_owner(
        &self,
        owner: &OwnerId,
        title_filter: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatRecord>, RepositoryError>> + Send;
}

/// Case-insensitive substring match used for title filters.
///
/// A blank filter matches everything.
pub fn title_matches(title: &str, filter: &str) -> bool {
    let filter = filter.trim();
    filter.is_empty() || title.to_lowercase().contains(&filter.to_lowercase())
}
