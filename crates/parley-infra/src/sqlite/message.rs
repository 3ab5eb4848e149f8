//! SQLite message repository implementation.
//!
//! Messages form a parent-pointer forest per conversation. The history walk
//! is a recursive CTE bounded by the conversation's message count, so a
//! corrupted parent cycle cannot loop.

use parley_core::chat::repository::{HistoryChain, MessageRepository};
use parley_types::error::RepositoryError;
use parley_types::message::{ChatMessage, MessagePatch, Sender};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_uuid, query_error};

/// SQLite-backed implementation of `MessageRepository`.
pub struct SqliteMessageRepository {
    pool: DatabasePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct MessageRow {
    message_id: String,
    conversation_id: String,
    parent_message_id: Option<String>,
    user_id: String,
    sender: String,
    text: String,
    model: Option<String>,
    error: bool,
    token_count: Option<i64>,
    files: String,
    created_at: String,
    updated_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            message_id: row.try_get("message_id")?,
            conversation_id: row.try_get("conversation_id")?,
            parent_message_id: row.try_get("parent_message_id")?,
            user_id: row.try_get("user_id")?,
            sender: row.try_get("sender")?,
            text: row.try_get("text")?,
            model: row.try_get("model")?,
            error: row.try_get("error")?,
            token_count: row.try_get("token_count")?,
            files: row.try_get("files")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let sender: Sender = self
            .sender
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let parent_message_id = self
            .parent_message_id
            .as_deref()
            .map(|id| parse_uuid(id, "parent_message_id"))
            .transpose()?;
        let files: Vec<String> = serde_json::from_str(&self.files)
            .map_err(|e| RepositoryError::Query(format!("invalid files: {e}")))?;

        Ok(ChatMessage {
            message_id: parse_uuid(&self.message_id, "message_id")?,
            conversation_id: parse_uuid(&self.conversation_id, "conversation_id")?,
            parent_message_id,
            user: self.user_id,
            is_created_by_user: sender == Sender::User,
            sender,
            text: self.text,
            model: self.model,
            error: self.error,
            token_count: self.token_count.map(|v| v as u32),
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            files,
        })
    }
}

fn rows_to_messages(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<ChatMessage>, RepositoryError> {
    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        messages.push(MessageRow::from_row(row).map_err(query_error)?.into_message()?);
    }
    Ok(messages)
}

const HISTORY_CHAIN_SQL: &str = r#"
WITH RECURSIVE chain(message_id, parent_message_id, depth) AS (
    SELECT message_id, parent_message_id, 0
    FROM messages
    WHERE message_id = ?1 AND conversation_id = ?2 AND user_id = ?3
    UNION ALL
    SELECT m.message_id, m.parent_message_id, c.depth + 1
    FROM messages m
    JOIN chain c ON m.message_id = c.parent_message_id
    WHERE m.conversation_id = ?2
      AND m.user_id = ?3
      AND c.depth + 1 < (SELECT COUNT(*) FROM messages WHERE conversation_id = ?2 AND user_id = ?3)
)
SELECT m.*
FROM chain c
JOIN messages m ON m.message_id = c.message_id
ORDER BY c.depth DESC
"#;

impl MessageRepository for SqliteMessageRepository {
    async fn create(&self, message: &ChatMessage) -> Result<ChatMessage, RepositoryError> {
        let files = serde_json::to_string(&message.files)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO messages (message_id, conversation_id, parent_message_id, user_id, sender, text, model, error, token_count, files, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.message_id.to_string())
        .bind(message.conversation_id.to_string())
        .bind(message.parent_message_id.map(|id| id.to_string()))
        .bind(&message.user)
        .bind(message.sender.to_string())
        .bind(&message.text)
        .bind(&message.model)
        .bind(message.error)
        .bind(message.token_count.map(|v| v as i64))
        .bind(files)
        .bind(format_datetime(&message.created_at))
        .bind(format_datetime(&message.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("message {}", message.message_id))
            }
            _ => query_error(e),
        })?;

        Ok(message.clone())
    }

    async fn get(&self, message_id: &Uuid, user_id: &str) -> Result<Option<ChatMessage>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM messages WHERE message_id = ? AND user_id = ?")
            .bind(message_id.to_string())
            .bind(user_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.map(|row| MessageRow::from_row(&row).map_err(query_error)?.into_message())
            .transpose()
    }

    async fn update(
        &self,
        message_id: &Uuid,
        user_id: &str,
        patch: &MessagePatch,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE messages
               SET text = COALESCE(?, text),
                   model = COALESCE(?, model),
                   error = COALESCE(?, error),
                   token_count = COALESCE(?, token_count),
                   updated_at = ?
               WHERE message_id = ? AND user_id = ?"#,
        )
        .bind(&patch.text)
        .bind(&patch.model)
        .bind(patch.error)
        .bind(patch.token_count.map(|v| v as i64))
        .bind(format_datetime(&chrono::Utc::now()))
        .bind(message_id.to_string())
        .bind(user_id)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let row = sqlx::query("SELECT * FROM messages WHERE message_id = ? AND user_id = ?")
            .bind(message_id.to_string())
            .bind(user_id)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_error)?;
        row.map(|row| MessageRow::from_row(&row).map_err(query_error)?.into_message())
            .transpose()
    }

    async fn children(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
        message_id: &Uuid,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM messages
               WHERE conversation_id = ? AND user_id = ? AND parent_message_id = ?
               ORDER BY created_at ASC, message_id ASC"#,
        )
        .bind(conversation_id.to_string())
        .bind(user_id)
        .bind(message_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        rows_to_messages(&rows)
    }

    async fn find_history_chain(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
        starting_message_id: &Uuid,
    ) -> Result<HistoryChain, RepositoryError> {
        let rows = sqlx::query(HISTORY_CHAIN_SQL)
            .bind(starting_message_id.to_string())
            .bind(conversation_id.to_string())
            .bind(user_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let messages = rows_to_messages(&rows)?;
        let Some(oldest) = messages.first() else {
            return Err(RepositoryError::NotFound);
        };
        let truncated = oldest.parent_message_id.is_some();
        Ok(HistoryChain {
            messages,
            truncated,
        })
    }
}
