//! Ephemeral per-request streaming state.

use std::time::Instant;

use chrono::Utc;
use parley_types::llm::Usage;
use parley_types::message::{ChatMessage, MessagePatch};
use uuid::Uuid;

/// Where the assistant reply of a turn is persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseTarget {
    /// Insert a new assistant message.
    Create {
        message_id: Uuid,
        parent_message_id: Uuid,
    },
    /// Overwrite an existing assistant message in place.
    Update { message: ChatMessage },
}

impl ResponseTarget {
    pub fn message_id(&self) -> Uuid {
        match self {
            ResponseTarget::Create { message_id, .. } => *message_id,
            ResponseTarget::Update { message } => message.message_id,
        }
    }
}

/// In-flight values of one streaming exchange.
///
/// Lives for exactly one request and is consumed into the response message
/// once the provider stream terminates.
#[derive(Debug, Clone)]
pub struct StreamingSession {
    user_id: String,
    conversation_id: Uuid,
    model: String,
    target: ResponseTarget,
    user_message: ChatMessage,
    text: String,
    usage: Usage,
    started_at: Instant,
}

impl StreamingSession {
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: Uuid,
        model: impl Into<String>,
        target: ResponseTarget,
        user_message: ChatMessage,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id,
            model: model.into(),
            target,
            user_message,
            text: String::new(),
            usage: Usage::default(),
            started_at: Instant::now(),
        }
    }

    pub fn response_message_id(&self) -> Uuid {
        self.target.message_id()
    }

    pub fn target(&self) -> &ResponseTarget {
        &self.target
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn user_message(&self) -> &ChatMessage {
        &self.user_message
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    pub fn push_delta(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub fn record_usage(&mut self, usage: Usage) {
        self.usage.input_tokens += usage.input_tokens;
        self.usage.output_tokens += usage.output_tokens;
    }

    /// The assistant message as it should be persisted now.
    pub fn response_message(&self) -> ChatMessage {
        let token_count = (self.usage.output_tokens > 0).then_some(self.usage.output_tokens);
        match &self.target {
            ResponseTarget::Create {
                message_id,
                parent_message_id,
            } => {
                let mut message = ChatMessage::from_assistant(
                    *message_id,
                    self.conversation_id,
                    Some(*parent_message_id),
                    self.user_id.clone(),
                    self.model.clone(),
                );
                message.text = self.text.clone();
                message.token_count = token_count;
                message
            }
            ResponseTarget::Update { message } => {
                let mut message = message.clone();
                message.text = self.text.clone();
                message.model = Some(self.model.clone());
                message.error = false;
                message.token_count = token_count;
                message.updated_at = Utc::now();
                message
            }
        }
    }

    /// Patch equivalent of [`Self::response_message`] for in-place updates.
    pub fn response_patch(&self) -> MessagePatch {
        MessagePatch {
            text: Some(self.text.clone()),
            model: Some(self.model.clone()),
            error: Some(false),
            token_count: (self.usage.output_tokens > 0).then_some(self.usage.output_tokens),
        }
    }
}
