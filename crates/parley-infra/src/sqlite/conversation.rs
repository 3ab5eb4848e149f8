//! SQLite conversation repository implementation.

use parley_core::chat::repository::ConversationRepository;
use parley_types::conversation::{Conversation, ConversationMetadata, ConversationSettings};
use parley_types::error::RepositoryError;
use parley_types::llm::ProviderType;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `ConversationRepository`.
pub struct SqliteConversationRepository {
    pool: DatabasePool,
}

impl SqliteConversationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct ConversationRow {
    conversation_id: String,
    user_id: String,
    title: String,
    endpoint: Option<String>,
    model: Option<String>,
    settings: String,
    metadata: String,
    is_archived: bool,
    tags: String,
    created_at: String,
    updated_at: String,
}

impl ConversationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            conversation_id: row.try_get("conversation_id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            endpoint: row.try_get("endpoint")?,
            model: row.try_get("model")?,
            settings: row.try_get("settings")?,
            metadata: row.try_get("metadata")?,
            is_archived: row.try_get("is_archived")?,
            tags: row.try_get("tags")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_conversation(self) -> Result<Conversation, RepositoryError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .map(str::parse::<ProviderType>)
            .transpose()
            .map_err(RepositoryError::Query)?;
        let settings: ConversationSettings = serde_json::from_str(&self.settings)
            .map_err(|e| RepositoryError::Query(format!("invalid settings: {e}")))?;
        let metadata: ConversationMetadata = serde_json::from_str(&self.metadata)
            .map_err(|e| RepositoryError::Query(format!("invalid metadata: {e}")))?;
        let tags: Vec<String> = serde_json::from_str(&self.tags)
            .map_err(|e| RepositoryError::Query(format!("invalid tags: {e}")))?;

        Ok(Conversation {
            conversation_id: parse_uuid(&self.conversation_id, "conversation_id")?,
            user: self.user_id,
            title: self.title,
            endpoint,
            model: self.model,
            settings,
            metadata,
            is_archived: self.is_archived,
            tags,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(e.to_string()))
}

impl ConversationRepository for SqliteConversationRepository {
    async fn get(&self, conversation_id: &Uuid, user_id: &str) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE conversation_id = ? AND user_id = ?")
            .bind(conversation_id.to_string())
            .bind(user_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.map(|row| {
            ConversationRow::from_row(&row)
                .map_err(query_error)?
                .into_conversation()
        })
        .transpose()
    }

    async fn create(&self, conversation: &Conversation) -> Result<Conversation, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO conversations (conversation_id, user_id, title, endpoint, model, settings, metadata, is_archived, tags, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(conversation.conversation_id.to_string())
        .bind(&conversation.user)
        .bind(&conversation.title)
        .bind(conversation.endpoint.map(|e| e.to_string()))
        .bind(&conversation.model)
        .bind(to_json(&conversation.settings)?)
        .bind(to_json(&conversation.metadata)?)
        .bind(conversation.is_archived)
        .bind(to_json(&conversation.tags)?)
        .bind(format_datetime(&conversation.created_at))
        .bind(format_datetime(&conversation.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("conversation {}", conversation.conversation_id))
            }
            _ => query_error(e),
        })?;

        Ok(conversation.clone())
    }

    async fn touch(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
        endpoint: ProviderType,
        model: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let result = sqlx::query(
            "UPDATE conversations SET endpoint = ?, model = ?, updated_at = ? WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(endpoint.to_string())
        .bind(model)
        .bind(format_datetime(&chrono::Utc::now()))
        .bind(conversation_id.to_string())
        .bind(user_id)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        // Read back through the writer so the fresh row is visible.
        let row = sqlx::query("SELECT * FROM conversations WHERE conversation_id = ? AND user_id = ?")
            .bind(conversation_id.to_string())
            .bind(user_id)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_error)?;
        row.map(|row| {
            ConversationRow::from_row(&row)
                .map_err(query_error)?
                .into_conversation()
        })
        .transpose()
    }

    async fn update_title(&self, conversation_id: &Uuid, user_id: &str, title: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE conversations SET title = ?, updated_at = ? WHERE conversation_id = ? AND user_id = ?",
        )
        .bind(title)
        .bind(format_datetime(&chrono::Utc::now()))
        .bind(conversation_id.to_string())
        .bind(user_id)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, conversation_id: &Uuid, user_id: &str) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let result = sqlx::query("DELETE FROM conversations WHERE conversation_id = ? AND user_id = ?")
            .bind(conversation_id.to_string())
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM messages WHERE conversation_id = ? AND user_id = ?")
            .bind(conversation_id.to_string())
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::llm::SamplingParams;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn sample(user: &str) -> Conversation {
        let mut convo = Conversation::new(Uuid::now_v7(), user);
        convo.endpoint = Some(ProviderType::Anthropic);
        convo.model = Some("claude-sonnet-4-20250514".into());
        convo.settings = ConversationSettings {
            prompt_prefix: Some("Be brief".into()),
            sampling: SamplingParams {
                temperature: Some(0.4),
                ..Default::default()
            },
        };
        convo.metadata.spec = Some("fast".into());
        convo.tags = vec!["work".into()];
        convo
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = SqliteConversationRepository::new(test_pool().await);
        let convo = sample("u1");
        repo.create(&convo).await.unwrap();

        let loaded = repo.get(&convo.conversation_id, "u1").await.unwrap().unwrap();
        assert_eq!(loaded.title, "New Chat");
        assert_eq!(loaded.endpoint, Some(ProviderType::Anthropic));
        assert_eq!(loaded.settings, convo.settings);
        assert_eq!(loaded.metadata.spec.as_deref(), Some("fast"));
        assert_eq!(loaded.tags, ["work"]);

        assert!(repo.get(&convo.conversation_id, "u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_conflict() {
        let repo = SqliteConversationRepository::new(test_pool().await);
        let convo = sample("u1");
        repo.create(&convo).await.unwrap();
        let err = repo.create(&convo).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_touch_updates_model_for_owner_only() {
        let repo = SqliteConversationRepository::new(test_pool().await);
        let convo = sample("u1");
        repo.create(&convo).await.unwrap();

        let touched = repo
            .touch(&convo.conversation_id, "u1", ProviderType::OpenAi, "gpt-4o")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(touched.endpoint, Some(ProviderType::OpenAi));
        assert_eq!(touched.model.as_deref(), Some("gpt-4o"));
        assert!(touched.updated_at >= convo.updated_at);

        let other = repo
            .touch(&convo.conversation_id, "u2", ProviderType::OpenAi, "gpt-4o")
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_update_title() {
        let repo = SqliteConversationRepository::new(test_pool().await);
        let convo = sample("u1");
        repo.create(&convo).await.unwrap();

        assert!(repo.update_title(&convo.conversation_id, "u1", "Trip planning").await.unwrap());
        assert!(!repo.update_title(&Uuid::now_v7(), "u1", "x").await.unwrap());
        let loaded = repo.get(&convo.conversation_id, "u1").await.unwrap().unwrap();
        assert_eq!(loaded.title, "Trip planning");
    }

    #[tokio::test]
    async fn test_delete_removes_messages() {
        use crate::sqlite::message::SqliteMessageRepository;
        use parley_core::chat::repository::MessageRepository;
        use parley_types::message::ChatMessage;

        let pool = test_pool().await;
        let repo = SqliteConversationRepository::new(pool.clone());
        let messages = SqliteMessageRepository::new(pool);
        let convo = sample("u1");
        repo.create(&convo).await.unwrap();
        let msg = ChatMessage::from_user(Uuid::now_v7(), convo.conversation_id, None, "u1", "Hi");
        messages.create(&msg).await.unwrap();

        assert!(!repo.delete(&convo.conversation_id, "u2").await.unwrap());
        assert!(repo.delete(&convo.conversation_id, "u1").await.unwrap());
        assert!(repo.get(&convo.conversation_id, "u1").await.unwrap().is_none());
        assert!(messages.get(&msg.message_id, "u1").await.unwrap().is_none());
        assert!(!repo.delete(&convo.conversation_id, "u1").await.unwrap());
    }
}
