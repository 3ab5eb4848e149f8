//! Repository traits for conversations and branching messages.
//!
//! Uses native async fn in traits (RPITIT, Rust 2024 edition). Implementations
//! live in parley-infra (e.g., `SqliteMessageRepository`).

use parley_types::conversation::Conversation;
use parley_types::error::RepositoryError;
use parley_types::llm::ProviderType;
use parley_types::message::{ChatMessage, MessagePatch};
use uuid::Uuid;

/// A root-to-leaf run of messages produced by walking parent pointers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryChain {
    /// Oldest first; the starting message is last.
    pub messages: Vec<ChatMessage>,
    /// Set when the walk stopped at a parent that no longer exists, or at the
    /// step bound, before reaching a root.
    pub truncated: bool,
}

impl HistoryChain {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// Persistence for the per-conversation message forest.
pub trait MessageRepository: Send + Sync {
    /// Insert a new message. Fails with `Conflict` if the id already exists.
    fn create(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<ChatMessage, RepositoryError>> + Send;

    /// Get a message owned by `user_id`.
    fn get(
        &self,
        message_id: &Uuid,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ChatMessage>, RepositoryError>> + Send;

    /// Apply `patch` in place. Returns `None` if the message is absent or not owned.
    fn update(
        &self,
        message_id: &Uuid,
        user_id: &str,
        patch: &MessagePatch,
    ) -> impl std::future::Future<Output = Result<Option<ChatMessage>, RepositoryError>> + Send;

    /// Direct children of a message, ordered by created_at ASC.
    fn children(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
        message_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;

    /// Walk parent pointers from `starting_message_id` up to a root.
    ///
    /// Fails with `NotFound` if the starting message does not belong to the
    /// conversation and user. A missing intermediate parent truncates the
    /// chain instead of failing. The walk takes at most as many steps as the
    /// conversation has messages.
    fn find_history_chain(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
        starting_message_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<HistoryChain, RepositoryError>> + Send;
}

/// Persistence for conversation records.
pub trait ConversationRepository: Send + Sync {
    /// Get a conversation owned by `user_id`.
    fn get(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// Insert a new conversation. Fails with `Conflict` if the id already exists.
    fn create(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<Conversation, RepositoryError>> + Send;

    /// Record the provider/model of the latest turn and bump `updated_at`.
    fn touch(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
        endpoint: ProviderType,
        model: &str,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// Set the title. Returns false if the conversation is absent or not owned.
    fn update_title(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
        title: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Delete a conversation and all of its messages.
    ///
    /// Returns false if the conversation is absent or not owned.
    fn delete(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
