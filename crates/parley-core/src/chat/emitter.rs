//! Protocol emitter: normalized stream events to wire envelopes.
//!
//! The emitter is an order-preserving translator with one rule: after a
//! terminal envelope (`final` or `error`) it emits nothing else. Every method
//! returns `None` once the stream has terminated.

use parley_types::conversation::Conversation;
use parley_types::envelope::{CreatedPayload, DeltaPayload, ErrorPayload, FinalPayload, ServerEnvelope};
use parley_types::llm::StreamEvent;
use parley_types::message::ChatMessage;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Open,
    Terminated,
}

/// Per-stream envelope builder.
#[derive(Debug)]
pub struct ProtocolEmitter {
    step_id: String,
    response_message_id: Uuid,
    conversation_id: Option<Uuid>,
    phase: Phase,
}

impl ProtocolEmitter {
    pub fn new(response_message_id: Uuid, conversation_id: Option<Uuid>) -> Self {
        Self {
            step_id: format!("step_{}", Uuid::new_v4().simple()),
            response_message_id,
            conversation_id,
            phase: Phase::Open,
        }
    }

    /// Stable step id carried by every delta of this stream.
    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn is_terminated(&self) -> bool {
        self.phase == Phase::Terminated
    }

    pub fn created(&mut self, user_message: &ChatMessage) -> Option<ServerEnvelope> {
        self.open()?;
        Some(ServerEnvelope::Created(CreatedPayload::new(user_message)))
    }

    pub fn delta(&mut self, text: &str) -> Option<ServerEnvelope> {
        self.open()?;
        Some(ServerEnvelope::Delta(DeltaPayload::text(&self.step_id, text)))
    }

    /// Translate one normalized event. `Done` produces nothing: the final
    /// envelope needs persisted state and comes from [`Self::finish`].
    pub fn event(&mut self, event: &StreamEvent) -> Option<ServerEnvelope> {
        match event {
            StreamEvent::Delta { text } => self.delta(text),
            StreamEvent::Done { .. } => None,
        }
    }

    pub fn finish(
        &mut self,
        conversation: Conversation,
        request_message: ChatMessage,
        response_message: ChatMessage,
    ) -> Option<ServerEnvelope> {
        self.open()?;
        self.phase = Phase::Terminated;
        Some(ServerEnvelope::Final(Box::new(FinalPayload::new(
            conversation,
            request_message,
            response_message,
        ))))
    }

    pub fn error(&mut self, text: impl Into<String>) -> Option<ServerEnvelope> {
        self.open()?;
        self.phase = Phase::Terminated;
        Some(ServerEnvelope::Error(ErrorPayload::new(
            text,
            self.response_message_id,
            self.conversation_id,
        )))
    }

    fn open(&self) -> Option<()> {
        (self.phase == Phase::Open).then_some(())
    }
}
