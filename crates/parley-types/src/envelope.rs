//! Server-to-client wire envelopes.
//!
//! Every envelope is one named SSE event with a JSON payload. The event name
//! comes from [`ServerEnvelope::event_name`]; the payload is the envelope's
//! serde representation.

use serde::Serialize;
use uuid::Uuid;

use crate::conversation::Conversation;
use crate::message::{ChatMessage, Sender, parent_id};

/// Event name of the delta payload's inner `event` field.
pub const MESSAGE_DELTA_EVENT: &str = "on_message_delta";

/// One discrete unit of the streaming wire protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerEnvelope {
    Created(CreatedPayload),
    Delta(DeltaPayload),
    Final(Box<FinalPayload>),
    Error(ErrorPayload),
}

impl ServerEnvelope {
    /// SSE event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEnvelope::Created(_) => "created",
            ServerEnvelope::Delta(_) | ServerEnvelope::Final(_) => "message",
            ServerEnvelope::Error(_) => "error",
        }
    }

    /// Whether this envelope ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerEnvelope::Final(_) | ServerEnvelope::Error(_))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Acknowledgement of the user message, sent before any provider call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedPayload {
    pub message: CreatedMessage,
    pub created: bool,
}

impl CreatedPayload {
    pub fn new(message: &ChatMessage) -> Self {
        Self {
            message: CreatedMessage {
                message_id: message.message_id,
                parent_message_id: message.parent_message_id,
                conversation_id: message.conversation_id,
                sender: message.sender,
                text: message.text.clone(),
                is_created_by_user: message.is_created_by_user,
            },
            created: true,
        }
    }
}

/// The subset of the user message echoed in the `created` envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedMessage {
    pub message_id: Uuid,
    #[serde(with = "parent_id")]
    pub parent_message_id: Option<Uuid>,
    pub conversation_id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub is_created_by_user: bool,
}

/// One incremental text chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaPayload {
    pub event: &'static str,
    pub data: DeltaData,
}

impl DeltaPayload {
    pub fn text(step_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            event: MESSAGE_DELTA_EVENT,
            data: DeltaData {
                id: step_id.into(),
                delta: DeltaContent {
                    content: vec![DeltaPart::Text { text: text.into() }],
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaData {
    pub id: String,
    pub delta: DeltaContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaContent {
    pub content: Vec<DeltaPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeltaPart {
    Text { text: String },
}

/// Terminal success record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalPayload {
    #[serde(rename = "final")]
    pub is_final: bool,
    pub conversation: Conversation,
    pub title: String,
    pub request_message: ChatMessage,
    pub response_message: ChatMessage,
}

impl FinalPayload {
    pub fn new(
        conversation: Conversation,
        request_message: ChatMessage,
        response_message: ChatMessage,
    ) -> Self {
        Self {
            is_final: true,
            title: conversation.title.clone(),
            conversation,
            request_message,
            response_message,
        }
    }
}

/// Terminal failure record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error: bool,
    pub text: String,
    pub message_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
}

impl ErrorPayload {
    pub fn new(text: impl Into<String>, message_id: Uuid, conversation_id: Option<Uuid>) -> Self {
        Self {
            error: true,
            text: text.into(),
            message_id,
            conversation_id,
        }
    }
}
