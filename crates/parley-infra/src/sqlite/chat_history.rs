//! SQLite chat history repository implementation.
//!
//! Implements `ChatHistoryRepository` from `parley-core` using sqlx with the
//! split reader/writer pool. Turns are stored as a JSON array in the
//! `messages` column; timestamps are fixed-width RFC 3339 strings so
//! `ORDER BY updated_at` is chronological.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parley_core::chat::repository::{ChatHistoryRepository, title_matches};
use parley_types::chat::{ChatRecord, OwnerId, Turn};
use parley_types::error::RepositoryError;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatHistoryRepository`.
pub struct SqliteChatHistoryRepository {
    pool: DatabasePool,
}

impl SqliteChatHistoryRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to domain ChatRecord.
struct ChatHistoryRow {
    id: String,
    user_id: String,
    title: String,
    messages: String,
    created_at: String,
    updated_at: String,
}

impl ChatHistoryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            messages: row.try_get("messages")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_record(self) -> Result<ChatRecord, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid chat id: {e}")))?;
        let messages: Vec<Turn> = serde_json::from_str(&self.messages)
            .map_err(|e| RepositoryError::Query(format!("invalid messages json: {e}")))?;

        Ok(ChatRecord {
            id,
            user_id: OwnerId(self.user_id),
            title: self.title,
            messages,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at the precision stored in the table.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn encode_turns(turns: &[Turn]) -> Result<String, RepositoryError> {
    serde_json::to_string(turns)
        .map_err(|e| RepositoryError::Query(format!("failed to encode messages: {e}")))
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

impl ChatHistoryRepository for SqliteChatHistoryRepository {
    async fn create(
        &self,
        owner: &OwnerId,
        title: &str,
        turns: &[Turn],
    ) -> Result<ChatRecord, RepositoryError> {
        let created_at = now();
        let record = ChatRecord {
            id: Uuid::now_v7(),
            user_id: owner.clone(),
            title: title.to_string(),
            messages: turns.to_vec(),
            created_at,
            updated_at: created_at,
        };

        sqlx::query(
            r#"INSERT INTO chat_history (id, user_id, title, messages, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(record.user_id.as_str())
        .bind(&record.title)
        .bind(encode_turns(turns)?)
        .bind(format_datetime(&record.created_at))
        .bind(format_datetime(&record.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            other => query_err(other),
        })?;

        Ok(record)
    }

    async fn update(&self, id: &Uuid, turns: &[Turn]) -> Result<ChatRecord, RepositoryError> {
        let row = sqlx::query(
            r#"UPDATE chat_history
               SET messages = ?, updated_at = ?
               WHERE id = ?
               RETURNING *"#,
        )
        .bind(encode_turns(turns)?)
        .bind(format_datetime(&now()))
        .bind(id.to_string())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(query_err)?;

        let row = row.ok_or(RepositoryError::NotFound)?;
        ChatHistoryRow::from_row(&row)
            .map_err(query_err)?
            .into_record()
    }

    async fn delete(&self, id: &Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM chat_history WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn get(&self, id: &Uuid) -> Result<Option<ChatRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chat_history WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let history_row = ChatHistoryRow::from_row(&row).map_err(query_err)?;
                Ok(Some(history_row.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn list_by_owner(
        &self,
        owner: &OwnerId,
        title_filter: Option<&str>,
    ) -> Result<Vec<ChatRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_history WHERE user_id = ? ORDER BY updated_at DESC, id DESC",
        )
        .bind(owner.as_str())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        // SQLite's LIKE only folds ASCII, so the title filter runs here.
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let history_row = ChatHistoryRow::from_row(row).map_err(query_err)?;
            if title_filter.is_some_and(|f| !title_matches(&history_row.title, f)) {
                continue;
            }
            records.push(history_row.into_record()?);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn alice() -> OwnerId {
        OwnerId::new("alice")
    }

    fn exchange(question: &str, answer: &str) -> Vec<Turn> {
        let mut reply = Turn::assistant(answer);
        reply.reasoning = Some("thinking it over".to_string());
        vec![Turn::user(question), reply]
    }

    /// Keeps `updated_at` values distinct between consecutive writes.
    async fn tick() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = SqliteChatHistoryRepository::new(test_pool().await);
        let turns = exchange("What is Rust?", "A systems language.");

        let created = repo.create(&alice(), "What is Rust?", &turns).await.unwrap();
        assert_eq!(created.created_at, created.updated_at);

        let fetched = repo.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.messages[1].reasoning.as_deref(), Some("thinking it over"));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let repo = SqliteChatHistoryRepository::new(test_pool().await);
        assert!(repo.get(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_replaces_messages_and_keeps_title() {
        let repo = SqliteChatHistoryRepository::new(test_pool().await);
        let mut turns = exchange("first", "one");
        let created = repo.create(&alice(), "first", &turns).await.unwrap();

        tick().await;
        turns.extend(exchange("second", "two"));
        let updated = repo.update(&created.id, &turns).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "first");
        assert_eq!(updated.messages.len(), 4);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);

        let fetched = repo.get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, updated);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let repo = SqliteChatHistoryRepository::new(test_pool().await);
        let err = repo
            .update(&Uuid::now_v7(), &exchange("a", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_incomplete_turn_survives_round_trip() {
        let repo = SqliteChatHistoryRepository::new(test_pool().await);
        let mut partial = Turn::assistant("Hi ");
        partial.incomplete = true;
        let turns = vec![Turn::user("hello"), partial];

        let created = repo.create(&alice(), "hello", &turns).await.unwrap();
        let fetched = repo.get(&created.id).await.unwrap().unwrap();

        assert!(fetched.messages[1].incomplete);
        assert!(!fetched.messages[0].incomplete);
    }

    #[tokio::test]
    async fn test_list_by_owner_newest_first() {
        let repo = SqliteChatHistoryRepository::new(test_pool().await);
        let a = repo.create(&alice(), "alpha", &exchange("a", "1")).await.unwrap();
        tick().await;
        let b = repo.create(&alice(), "beta", &exchange("b", "2")).await.unwrap();
        tick().await;
        repo.create(&OwnerId::new("bob"), "bob's", &exchange("c", "3"))
            .await
            .unwrap();
        tick().await;

        // Touching `a` moves it to the front.
        repo.update(&a.id, &exchange("a", "1 again")).await.unwrap();

        let listed = repo.list_by_owner(&alice(), None).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_list_by_owner_title_filter_ignores_case() {
        let repo = SqliteChatHistoryRepository::new(test_pool().await);
        for title in ["Rust lifetimes", "Groceries", "Über RUST"] {
            repo.create(&alice(), title, &exchange(title, "ok"))
                .await
                .unwrap();
            tick().await;
        }

        let found = repo.list_by_owner(&alice(), Some("rust")).await.unwrap();
        let titles: Vec<&str> = found.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Über RUST", "Rust lifetimes"]);

        let unicode = repo.list_by_owner(&alice(), Some("über")).await.unwrap();
        assert_eq!(unicode.len(), 1);

        let blank = repo.list_by_owner(&alice(), Some("  ")).await.unwrap();
        assert_eq!(blank.len(), 3);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = SqliteChatHistoryRepository::new(test_pool().await);
        let created = repo.create(&alice(), "gone", &exchange("x", "y")).await.unwrap();

        repo.delete(&created.id).await.unwrap();
        assert!(repo.get(&created.id).await.unwrap().is_none());

        let err = repo.delete(&created.id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }
}
