//! In-memory doubles shared by the core's test modules.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::StreamExt;
use parley_types::attachment::Attachment;
use parley_types::conversation::Conversation;
use parley_types::error::{AttachmentError, CacheError, RepositoryError};
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderType, StreamEvent, Usage,
};
use parley_types::message::{ChatMessage, MessagePatch, Sender};
use uuid::Uuid;

use super::attachments::AttachmentStore;
use super::repository::{ConversationRepository, HistoryChain, MessageRepository};
use crate::llm::provider::{LlmProvider, LlmStream};
use crate::title::cache::TitleCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreOp {
    Create(Uuid),
    Update(Uuid),
}

#[derive(Default)]
pub(crate) struct InMemoryMessages {
    messages: Mutex<HashMap<Uuid, ChatMessage>>,
    ops: Mutex<Vec<StoreOp>>,
    fail_assistant_writes: bool,
}

impl InMemoryMessages {
    /// A store that rejects every assistant create/update.
    pub(crate) fn failing_assistant_writes() -> Self {
        Self {
            fail_assistant_writes: true,
            ..Default::default()
        }
    }

    fn reject(&self, sender: Sender) -> Result<(), RepositoryError> {
        if self.fail_assistant_writes && sender == Sender::Assistant {
            return Err(RepositoryError::Query("disk I/O error".into()));
        }
        Ok(())
    }

    /// Insert without recording an op.
    pub(crate) fn seed(&self, message: ChatMessage) {
        self.messages
            .lock()
            .unwrap()
            .insert(message.message_id, message);
    }

    pub(crate) fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }

    pub(crate) fn find(&self, id: &Uuid) -> Option<ChatMessage> {
        self.messages.lock().unwrap().get(id).cloned()
    }

    pub(crate) fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl MessageRepository for InMemoryMessages {
    async fn create(&self, message: &ChatMessage) -> Result<ChatMessage, RepositoryError> {
        self.reject(message.sender)?;
        let mut messages = self.messages.lock().unwrap();
        if messages.contains_key(&message.message_id) {
            return Err(RepositoryError::Conflict(message.message_id.to_string()));
        }
        messages.insert(message.message_id, message.clone());
        self.ops.lock().unwrap().push(StoreOp::Create(message.message_id));
        Ok(message.clone())
    }

    async fn get(&self, message_id: &Uuid, user_id: &str) -> Result<Option<ChatMessage>, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(message_id)
            .filter(|m| m.user == user_id)
            .cloned())
    }

    async fn update(
        &self,
        message_id: &Uuid,
        user_id: &str,
        patch: &MessagePatch,
    ) -> Result<Option<ChatMessage>, RepositoryError> {
        let mut messages = self.messages.lock().unwrap();
        let Some(message) = messages.get_mut(message_id).filter(|m| m.user == user_id) else {
            return Ok(None);
        };
        self.reject(message.sender)?;
        if let Some(text) = &patch.text {
            message.text = text.clone();
        }
        if let Some(model) = &patch.model {
            message.model = Some(model.clone());
        }
        if let Some(error) = patch.error {
            message.error = error;
        }
        if let Some(count) = patch.token_count {
            message.token_count = Some(count);
        }
        self.ops.lock().unwrap().push(StoreOp::Update(*message_id));
        Ok(Some(message.clone()))
    }

    async fn children(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
        message_id: &Uuid,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut children: Vec<_> = self
            .messages
            .lock()
            .unwrap()
            .values()
            .filter(|m| {
                m.conversation_id == *conversation_id
                    && m.user == user_id
                    && m.parent_message_id == Some(*message_id)
            })
            .cloned()
            .collect();
        children.sort_by_key(|m| (m.created_at, m.message_id));
        Ok(children)
    }

    async fn find_history_chain(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
        starting_message_id: &Uuid,
    ) -> Result<HistoryChain, RepositoryError> {
        let messages = self.messages.lock().unwrap();
        let in_scope =
            |m: &&ChatMessage| m.conversation_id == *conversation_id && m.user == user_id;
        let bound = messages.values().filter(in_scope).count();

        let mut current = messages
            .get(starting_message_id)
            .filter(in_scope)
            .ok_or(RepositoryError::NotFound)?;
        let mut chain = vec![current.clone()];
        let mut truncated = false;
        while let Some(parent_id) = current.parent_message_id {
            if chain.len() >= bound {
                truncated = true;
                break;
            }
            match messages.get(&parent_id).filter(in_scope) {
                Some(parent) => {
                    chain.push(parent.clone());
                    current = parent;
                }
                None => {
                    truncated = true;
                    break;
                }
            }
        }
        chain.reverse();
        Ok(HistoryChain {
            messages: chain,
            truncated,
        })
    }
}

#[derive(Default)]
pub(crate) struct InMemoryConversations {
    conversations: Mutex<HashMap<Uuid, Conversation>>,
}

impl InMemoryConversations {
    pub(crate) fn seed(&self, conversation: Conversation) {
        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.conversation_id, conversation);
    }

    pub(crate) fn find(&self, id: &Uuid) -> Option<Conversation> {
        self.conversations.lock().unwrap().get(id).cloned()
    }

    pub(crate) fn count(&self) -> usize {
        self.conversations.lock().unwrap().len()
    }
}

impl ConversationRepository for InMemoryConversations {
    async fn get(&self, conversation_id: &Uuid, user_id: &str) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .get(conversation_id)
            .filter(|c| c.user == user_id)
            .cloned())
    }

    async fn create(&self, conversation: &Conversation) -> Result<Conversation, RepositoryError> {
        let mut conversations = self.conversations.lock().unwrap();
        if conversations.contains_key(&conversation.conversation_id) {
            return Err(RepositoryError::Conflict(conversation.conversation_id.to_string()));
        }
        conversations.insert(conversation.conversation_id, conversation.clone());
        Ok(conversation.clone())
    }

    async fn touch(
        &self,
        conversation_id: &Uuid,
        user_id: &str,
        endpoint: ProviderType,
        model: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let mut conversations = self.conversations.lock().unwrap();
        let Some(convo) = conversations
            .get_mut(conversation_id)
            .filter(|c| c.user == user_id)
        else {
            return Ok(None);
        };
        convo.endpoint = Some(endpoint);
        convo.model = Some(model.to_string());
        convo.updated_at = chrono::Utc::now();
        Ok(Some(convo.clone()))
    }

    async fn update_title(&self, conversation_id: &Uuid, user_id: &str, title: &str) -> Result<bool, RepositoryError> {
        let mut conversations = self.conversations.lock().unwrap();
        match conversations
            .get_mut(conversation_id)
            .filter(|c| c.user == user_id)
        {
            Some(convo) => {
                convo.title = title.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, conversation_id: &Uuid, user_id: &str) -> Result<bool, RepositoryError> {
        let mut conversations = self.conversations.lock().unwrap();
        if conversations
            .get(conversation_id)
            .is_some_and(|c| c.user == user_id)
        {
            conversations.remove(conversation_id);
            return Ok(true);
        }
        Ok(false)
    }
}

/// TTL-less title cache; `unavailable` makes every call fail.
#[derive(Default)]
pub(crate) struct MemoryTitles {
    pub(crate) titles: DashMap<(String, Uuid), String>,
    pub(crate) unavailable: bool,
}

impl TitleCache for MemoryTitles {
    async fn put(&self, user_id: &str, conversation_id: &Uuid, title: &str, _ttl: Duration) -> Result<(), CacheError> {
        if self.unavailable {
            return Err(CacheError::Unavailable("offline".into()));
        }
        self.titles
            .insert((user_id.to_string(), *conversation_id), title.to_string());
        Ok(())
    }

    async fn take(&self, user_id: &str, conversation_id: &Uuid) -> Result<Option<String>, CacheError> {
        if self.unavailable {
            return Err(CacheError::Unavailable("offline".into()));
        }
        Ok(self
            .titles
            .remove(&(user_id.to_string(), *conversation_id))
            .map(|(_, title)| title))
    }
}

#[derive(Default)]
pub(crate) struct StubAttachments {
    pub(crate) files: HashMap<String, Attachment>,
}

impl AttachmentStore for StubAttachments {
    async fn load(&self, _user_id: &str, file_id: &str) -> Result<Attachment, AttachmentError> {
        self.files
            .get(file_id)
            .cloned()
            .ok_or_else(|| AttachmentError::NotFound(file_id.to_string()))
    }
}

/// Scripted provider. `stream` replays `script`, then either ends or, with
/// `hang`, stays pending forever.
#[derive(Clone)]
pub(crate) struct MockProvider {
    pub(crate) provider_type: ProviderType,
    pub(crate) script: Vec<Result<StreamEvent, LlmError>>,
    pub(crate) hang: bool,
    pub(crate) title: Result<String, LlmError>,
    pub(crate) requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockProvider {
    pub(crate) fn replying(chunks: &[&str]) -> Self {
        let mut script: Vec<_> = chunks
            .iter()
            .map(|c| {
                Ok(StreamEvent::Delta {
                    text: c.to_string(),
                })
            })
            .collect();
        script.push(Ok(StreamEvent::Done {
            usage: Usage {
                input_tokens: 10,
                output_tokens: chunks.len() as u32,
            },
        }));
        Self {
            provider_type: ProviderType::OpenAi,
            script,
            hang: false,
            title: Ok("\"Friendly Greeting\"".to_string()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn failing(error: LlmError) -> Self {
        Self {
            script: vec![Err(error)],
            ..Self::replying(&[])
        }
    }

    pub(crate) fn recorded(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    fn default_model(&self) -> Option<&str> {
        Some("mock-small")
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.title.clone().map(|content| CompletionResponse {
            id: "title".into(),
            content,
            model: request.model.clone(),
            usage: Usage::default(),
        })
    }

    fn stream(&self, request: CompletionRequest) -> LlmStream {
        self.requests.lock().unwrap().push(request);
        let replay = futures_util::stream::iter(self.script.clone());
        if self.hang {
            Box::pin(replay.chain(futures_util::stream::pending()))
        } else {
            Box::pin(replay)
        }
    }
}
