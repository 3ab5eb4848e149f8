//! Streaming orchestrator: the end-to-end ask and edit flows.
//!
//! A turn moves through
//! `Idle -> ResolvingModel -> Persisting -> BuildingContext -> Streaming -> Completing -> Done`,
//! with `Failed` reachable from every state after `Idle`. Everything up to
//! `BuildingContext` runs before the caller gets a stream, so those failures
//! are ordinary `Err` values. Once the stream exists, failures become a
//! terminal error envelope.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use parley_types::config::TitleConfig;
use parley_types::conversation::{Conversation, ConversationMetadata, ConversationSettings};
use parley_types::envelope::ServerEnvelope;
use parley_types::error::{ChatError, RepositoryError, TitleError};
use parley_types::llm::{
    CompletionRequest, ContentPart, LlmError, Message, MessageContent, MessageRole, StreamEvent,
};
use parley_types::message::{ChatMessage, MessagePatch, Sender};
use parley_types::request::{AskRequest, EditTarget};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::attachments::AttachmentStore;
use super::edit::classify_edit_target;
use super::emitter::ProtocolEmitter;
use super::repository::{ConversationRepository, HistoryChain, MessageRepository};
use super::session::{ResponseTarget, StreamingSession};
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::registry::ProviderRegistry;
use crate::spec::{ModelSpecRegistry, ResolvedModel, resolve_model};
use crate::title::cache::TitleCache;
use crate::title::task::{TitleJob, poll_title, spawn_title_task};

/// The envelope stream handed to the transport.
pub type EnvelopeStream = Pin<Box<dyn Stream<Item = ServerEnvelope> + Send + 'static>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    ResolvingModel,
    Persisting,
    BuildingContext,
    Streaming,
    Completing,
    Done,
    Failed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Idle => "idle",
            FlowState::ResolvingModel => "resolving_model",
            FlowState::Persisting => "persisting",
            FlowState::BuildingContext => "building_context",
            FlowState::Streaming => "streaming",
            FlowState::Completing => "completing",
            FlowState::Done => "done",
            FlowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Current state of one turn, with transition logging.
#[derive(Debug)]
struct Flow {
    state: FlowState,
    conversation_id: Option<Uuid>,
}

impl Flow {
    fn new() -> Self {
        Self {
            state: FlowState::Idle,
            conversation_id: None,
        }
    }

    fn enter(&mut self, next: FlowState) {
        debug!(
            from = %self.state,
            to = %next,
            conversation_id = ?self.conversation_id,
            "flow transition"
        );
        self.state = next;
    }

    fn fail(&mut self, reason: &dyn fmt::Display) {
        warn!(
            from = %self.state,
            conversation_id = ?self.conversation_id,
            error = %reason,
            "flow failed"
        );
        self.state = FlowState::Failed;
    }
}

/// Everything the streaming half of a turn needs, owned.
struct Turn {
    user_id: String,
    conversation: Conversation,
    user_message: ChatMessage,
    target: ResponseTarget,
    provider: Arc<BoxLlmProvider>,
    request: CompletionRequest,
    generate_title: bool,
}

/// Drives ask and edit turns end to end.
///
/// Generic over the persistence, cache and attachment ports so parley-core
/// never depends on parley-infra. Cheap to clone.
pub struct ChatOrchestrator<C, M, T, A> {
    conversations: Arc<C>,
    messages: Arc<M>,
    titles: Arc<T>,
    attachments: Arc<A>,
    providers: Arc<ProviderRegistry>,
    specs: Arc<ModelSpecRegistry>,
    title_config: TitleConfig,
    shutdown: CancellationToken,
}

impl<C, M, T, A> Clone for ChatOrchestrator<C, M, T, A> {
    fn clone(&self) -> Self {
        Self {
            conversations: self.conversations.clone(),
            messages: self.messages.clone(),
            titles: self.titles.clone(),
            attachments: self.attachments.clone(),
            providers: self.providers.clone(),
            specs: self.specs.clone(),
            title_config: self.title_config.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<C, M, T, A> ChatOrchestrator<C, M, T, A>
where
    C: ConversationRepository + 'static,
    M: MessageRepository + 'static,
    T: TitleCache + 'static,
    A: AttachmentStore + 'static,
{
    pub fn new(
        conversations: Arc<C>,
        messages: Arc<M>,
        titles: Arc<T>,
        attachments: Arc<A>,
        providers: Arc<ProviderRegistry>,
        specs: Arc<ModelSpecRegistry>,
    ) -> Self {
        Self {
            conversations,
            messages,
            titles,
            attachments,
            providers,
            specs,
            title_config: TitleConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_title_config(mut self, title_config: TitleConfig) -> Self {
        self.title_config = title_config;
        self
    }

    /// Background title tasks stop when `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Send a new user message and stream the reply.
    #[tracing::instrument(name = "chat.ask", skip(self, request), fields(user_id = %user_id))]
    pub async fn ask(&self, user_id: &str, request: AskRequest) -> Result<EnvelopeStream, ChatError> {
        let mut flow = Flow::new();
        match self.prepare_ask(user_id, &request, &mut flow).await {
            Ok(turn) => Ok(self.stream_turn(turn, flow)),
            Err(e) => {
                flow.fail(&e);
                Err(e)
            }
        }
    }

    /// Edit an existing message and stream the regenerated reply.
    #[tracing::instrument(name = "chat.edit", skip(self, request), fields(user_id = %user_id))]
    pub async fn edit(&self, user_id: &str, request: AskRequest) -> Result<EnvelopeStream, ChatError> {
        let mut flow = Flow::new();
        match self.prepare_edit(user_id, &request, &mut flow).await {
            Ok(turn) => Ok(self.stream_turn(turn, flow)),
            Err(e) => {
                flow.fail(&e);
                Err(e)
            }
        }
    }

    /// Collect the generated title of a new conversation, if it is ready.
    pub async fn poll_title(&self, user_id: &str, conversation_id: &Uuid) -> Result<String, TitleError> {
        poll_title(
            &*self.titles,
            user_id,
            conversation_id,
            Duration::from_millis(self.title_config.poll_delay_ms),
        )
        .await
    }

    /// Delete a conversation and its messages.
    pub async fn delete_conversation(&self, user_id: &str, conversation_id: &Uuid) -> Result<(), ChatError> {
        if self.conversations.delete(conversation_id, user_id).await? {
            info!(%conversation_id, "conversation deleted");
            Ok(())
        } else {
            Err(ChatError::NotFound(format!("conversation {conversation_id}")))
        }
    }

    async fn prepare_ask(&self, user_id: &str, request: &AskRequest, flow: &mut Flow) -> Result<Turn, ChatError> {
        flow.enter(FlowState::ResolvingModel);
        if request.text.trim().is_empty() {
            return Err(ChatError::Validation("text is required".to_string()));
        }
        let requested_conversation = request.conversation_id().map_err(ChatError::Validation)?;
        let resolved = resolve_model(request, &self.specs, &self.providers)?;
        let provider = self.provider_for(&resolved)?;

        let conversation_id = requested_conversation.unwrap_or_else(Uuid::now_v7);
        flow.conversation_id = Some(conversation_id);
        let parent = request.parent_message_id;

        // The parent chain is read before anything is written, so an unknown
        // parent leaves no records behind.
        let mut messages = match parent {
            Some(parent_id) => {
                let chain = self
                    .messages
                    .find_history_chain(&conversation_id, user_id, &parent_id)
                    .await
                    .map_err(|e| match e {
                        RepositoryError::NotFound => {
                            ChatError::NotFound(format!("parent message {parent_id}"))
                        }
                        other => other.into(),
                    })?;
                note_truncation(&chain, &conversation_id);
                to_provider_messages(&chain.messages)
            }
            None => Vec::new(),
        };

        flow.enter(FlowState::Persisting);
        let mut user_message = ChatMessage::from_user(
            request.message_id.unwrap_or_else(Uuid::now_v7),
            conversation_id,
            parent,
            user_id,
            request.text.clone(),
        );
        user_message.files = request.files.iter().map(|f| f.file_id.clone()).collect();

        let (saved, conversation) = tokio::join!(
            self.messages.create(&user_message),
            self.ensure_conversation(
                user_id,
                conversation_id,
                requested_conversation.is_some(),
                parent.is_some(),
                &resolved,
            ),
        );
        let (conversation, created) = conversation?;
        let user_message = saved?;

        flow.enter(FlowState::BuildingContext);
        messages.push(
            self.current_message(user_id, &user_message.text, &user_message.files)
                .await,
        );

        Ok(Turn {
            user_id: user_id.to_string(),
            conversation,
            target: ResponseTarget::Create {
                message_id: Uuid::now_v7(),
                parent_message_id: user_message.message_id,
            },
            user_message,
            request: completion_request(&resolved, messages),
            provider,
            generate_title: created && parent.is_none() && self.title_config.enabled,
        })
    }

    async fn prepare_edit(&self, user_id: &str, request: &AskRequest, flow: &mut Flow) -> Result<Turn, ChatError> {
        flow.enter(FlowState::ResolvingModel);
        let target = EditTarget::from_request(request).ok_or_else(|| {
            ChatError::Validation("edit requires parentMessageId or responseMessageId".to_string())
        })?;
        let conversation_id = request
            .conversation_id()
            .map_err(ChatError::Validation)?
            .ok_or_else(|| ChatError::Validation("edit requires a conversationId".to_string()))?;
        flow.conversation_id = Some(conversation_id);
        let resolved = resolve_model(request, &self.specs, &self.providers)?;
        let provider = self.provider_for(&resolved)?;

        flow.enter(FlowState::Persisting);
        let plan = classify_edit_target(
            &*self.messages,
            &conversation_id,
            user_id,
            target,
            request.override_parent_message_id,
        )
        .await?;

        // Request text is the user's question. When the alias names an
        // assistant message the text belongs to that reply, so the question
        // is left as stored.
        let edits_question = match target {
            EditTarget::ByResponseId { .. } => true,
            EditTarget::ByFieldAlias { aliased_message_id } => {
                aliased_message_id == plan.user_message.message_id
            }
        };
        let edited_text = request.text.trim();
        let patch = (edits_question && !edited_text.is_empty() && edited_text != plan.user_message.text)
            .then(|| MessagePatch::text(edited_text));
        let user_message_id = plan.user_message.message_id;

        let (user_message, conversation) = tokio::join!(
            async {
                match &patch {
                    Some(patch) => self.messages.update(&user_message_id, user_id, patch).await,
                    None => Ok(Some(plan.user_message.clone())),
                }
            },
            self.conversations
                .touch(&conversation_id, user_id, resolved.provider, &resolved.model),
        );
        let conversation = conversation?
            .ok_or_else(|| ChatError::NotFound(format!("conversation {conversation_id}")))?;
        let user_message = user_message?
            .ok_or_else(|| ChatError::NotFound(format!("message {user_message_id}")))?;

        flow.enter(FlowState::BuildingContext);
        let chain = self
            .messages
            .find_history_chain(&conversation_id, user_id, &user_message.message_id)
            .await?;
        note_truncation(&chain, &conversation_id);
        let prior = &chain.messages[..chain.len().saturating_sub(1)];
        let mut messages = to_provider_messages(prior);

        let files: Vec<String> = if request.files.is_empty() {
            user_message.files.clone()
        } else {
            request.files.iter().map(|f| f.file_id.clone()).collect()
        };
        messages.push(self.current_message(user_id, &user_message.text, &files).await);

        let target = match plan.assistant_message {
            Some(message) => ResponseTarget::Update { message },
            None => ResponseTarget::Create {
                message_id: Uuid::now_v7(),
                parent_message_id: plan.response_parent_id,
            },
        };

        Ok(Turn {
            user_id: user_id.to_string(),
            conversation,
            user_message,
            target,
            request: completion_request(&resolved, messages),
            provider,
            generate_title: false,
        })
    }

    fn provider_for(&self, resolved: &ResolvedModel) -> Result<Arc<BoxLlmProvider>, ChatError> {
        self.providers.get(resolved.provider).ok_or_else(|| {
            ChatError::Validation(format!("provider '{}' is not configured", resolved.provider))
        })
    }

    /// Find the conversation for a turn, creating it when it does not exist.
    ///
    /// Returns the conversation and whether it was created. A reply (non-root
    /// message) into an unknown conversation is `NotFound`.
    async fn ensure_conversation(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        requested: bool,
        has_parent: bool,
        resolved: &ResolvedModel,
    ) -> Result<(Conversation, bool), ChatError> {
        if requested {
            if let Some(existing) = self
                .conversations
                .touch(&conversation_id, user_id, resolved.provider, &resolved.model)
                .await?
            {
                return Ok((existing, false));
            }
            if has_parent {
                return Err(ChatError::NotFound(format!("conversation {conversation_id}")));
            }
        }

        let mut conversation = Conversation::new(conversation_id, user_id);
        conversation.endpoint = Some(resolved.provider);
        conversation.model = Some(resolved.model.clone());
        conversation.settings = ConversationSettings {
            prompt_prefix: resolved.system_prompt.clone(),
            sampling: resolved.sampling.clone(),
        };
        conversation.metadata = ConversationMetadata {
            icon_url: resolved.icon_url.clone(),
            greeting: resolved.greeting.clone(),
            spec: resolved.spec_name.clone(),
        };
        let created = self.conversations.create(&conversation).await?;
        info!(%conversation_id, model = %resolved.model, "conversation created");
        Ok((created, true))
    }

    /// The provider message for the current turn, with whatever attachments load.
    async fn current_message(&self, user_id: &str, text: &str, file_ids: &[String]) -> Message {
        let mut parts = vec![ContentPart::Text {
            text: text.to_string(),
        }];
        for file_id in file_ids {
            match self.attachments.load(user_id, file_id).await {
                Ok(attachment) => parts.push(attachment.into_content_part()),
                Err(e) => warn!(%file_id, error = %e, "attachment unavailable, continuing without it"),
            }
        }
        if parts.len() == 1 {
            Message::user(text)
        } else {
            Message {
                role: MessageRole::User,
                content: MessageContent::Parts(parts),
            }
        }
    }

    fn stream_turn(&self, turn: Turn, mut flow: Flow) -> EnvelopeStream {
        let this = self.clone();
        Box::pin(async_stream::stream! {
            let Turn {
                user_id,
                conversation,
                user_message,
                target,
                provider,
                request,
                generate_title,
            } = turn;
            let conversation_id = conversation.conversation_id;
            let model = request.model.clone();

            let mut emitter = ProtocolEmitter::new(target.message_id(), Some(conversation_id));
            let mut guard = PartialSave::new(
                this.messages.clone(),
                StreamingSession::new(
                    user_id.clone(),
                    conversation_id,
                    model.clone(),
                    target,
                    user_message.clone(),
                ),
            );

            if let Some(envelope) = emitter.created(&user_message) {
                yield envelope;
            }

            flow.enter(FlowState::Streaming);
            let mut events = provider.stream(request);
            let mut completed = false;
            let mut failure: Option<LlmError> = None;
            while let Some(item) = events.next().await {
                match item {
                    Ok(StreamEvent::Delta { text }) => {
                        guard.session.push_delta(&text);
                        if let Some(envelope) = emitter.delta(&text) {
                            yield envelope;
                        }
                    }
                    Ok(StreamEvent::Done { usage }) => {
                        guard.session.record_usage(usage);
                        completed = true;
                        break;
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            drop(events);
            let session = guard.disarm();

            let failure = match (completed, failure) {
                (_, Some(e)) => Some(e),
                (false, None) => Some(LlmError::Network(
                    "provider stream ended before completion".to_string(),
                )),
                (true, None) => None,
            };

            if let Some(e) = failure {
                flow.fail(&e);
                warn!(%conversation_id, kind = e.kind(), error = %e, "provider stream failed");
                if let Some(envelope) = emitter.error(e.to_string()) {
                    yield envelope;
                }
            } else {
                flow.enter(FlowState::Completing);
                // Detached so a disconnect during the write cannot cancel it.
                let save = tokio::spawn({
                    let messages = this.messages.clone();
                    let session = session.clone();
                    async move { persist_response(&*messages, &session).await }
                });
                let response_message = match save.await {
                    Ok(Ok(saved)) => saved,
                    Ok(Err(e)) => {
                        error!(
                            %conversation_id,
                            response_message_id = %session.response_message_id(),
                            error = %e,
                            "failed to persist assistant message"
                        );
                        session.response_message()
                    }
                    Err(e) => {
                        error!(%conversation_id, error = %e, "assistant message save task failed");
                        session.response_message()
                    }
                };

                let usage = session.usage();
                info!(
                    %conversation_id,
                    response_message_id = %response_message.message_id,
                    gen_ai.provider.name = provider.name(),
                    gen_ai.request.model = %model,
                    gen_ai.usage.input_tokens = usage.input_tokens,
                    gen_ai.usage.output_tokens = usage.output_tokens,
                    elapsed_ms = session.elapsed_ms(),
                    "turn complete"
                );

                if generate_title {
                    this.spawn_title(&session, &provider, &model);
                }

                flow.enter(FlowState::Done);
                if let Some(envelope) = emitter.finish(conversation, user_message, response_message) {
                    yield envelope;
                }
            }
        })
    }

    fn spawn_title(&self, session: &StreamingSession, turn_provider: &Arc<BoxLlmProvider>, turn_model: &str) {
        let conversation_id = session.user_message().conversation_id;
        let Some((provider, model)) = self.title_target(turn_provider, turn_model) else {
            debug!(%conversation_id, "no title provider available, skipping title");
            return;
        };
        let job = TitleJob {
            user_id: session.user_id().to_string(),
            conversation_id,
            user_text: session.user_message().text.clone(),
            assistant_text: session.text().to_string(),
            provider,
            model,
            ttl: Duration::from_secs(self.title_config.cache_ttl_secs),
        };
        // Detached: the handle is dropped and the task runs to completion.
        let _ = spawn_title_task(
            job,
            self.conversations.clone(),
            self.titles.clone(),
            self.shutdown.child_token(),
        );
        debug!(%conversation_id, "title task spawned");
    }

    fn title_target(
        &self,
        turn_provider: &Arc<BoxLlmProvider>,
        turn_model: &str,
    ) -> Option<(Arc<BoxLlmProvider>, String)> {
        let Some(provider_type) = self.title_config.provider else {
            let model = self
                .title_config
                .model
                .clone()
                .unwrap_or_else(|| turn_model.to_string());
            return Some((turn_provider.clone(), model));
        };
        let provider = self.providers.get(provider_type)?;
        let model = self
            .title_config
            .model
            .clone()
            .or_else(|| provider.default_model().map(str::to_string))
            .or_else(|| {
                (provider_type == turn_provider.provider_type()).then(|| turn_model.to_string())
            })?;
        Some((provider, model))
    }
}

/// Persist the assistant reply of a session: create or update per its target.
async fn persist_response<M: MessageRepository>(
    messages: &M,
    session: &StreamingSession,
) -> Result<ChatMessage, ChatError> {
    match session.target() {
        ResponseTarget::Create { .. } => Ok(messages.create(&session.response_message()).await?),
        ResponseTarget::Update { message } => messages
            .update(&message.message_id, session.user_id(), &session.response_patch())
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("message {}", message.message_id))),
    }
}

/// Saves the accumulated partial reply if the stream is dropped mid-flight.
struct PartialSave<M: MessageRepository + 'static> {
    messages: Arc<M>,
    session: StreamingSession,
    armed: bool,
}

impl<M: MessageRepository + 'static> PartialSave<M> {
    fn new(messages: Arc<M>, session: StreamingSession) -> Self {
        Self {
            messages,
            session,
            armed: true,
        }
    }

    /// The stream reached a terminal event; nothing to save on drop.
    fn disarm(&mut self) -> StreamingSession {
        self.armed = false;
        self.session.clone()
    }
}

impl<M: MessageRepository + 'static> Drop for PartialSave<M> {
    fn drop(&mut self) {
        if !self.armed || self.session.text().is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime available, dropping partial response");
            return;
        };
        let messages = self.messages.clone();
        let session = self.session.clone();
        runtime.spawn(async move {
            let response_message_id = session.response_message_id();
            match persist_response(&*messages, &session).await {
                Ok(_) => info!(
                    %response_message_id,
                    chars = session.text().len(),
                    "saved partial response after client disconnect"
                ),
                Err(e) => warn!(%response_message_id, error = %e, "failed to save partial response"),
            }
        });
    }
}

fn completion_request(resolved: &ResolvedModel, messages: Vec<Message>) -> CompletionRequest {
    CompletionRequest {
        model: resolved.model.clone(),
        messages,
        system: resolved.system_prompt.clone(),
        sampling: resolved.sampling.clone(),
    }
}

/// Convert stored history to provider messages, skipping empty and errored turns.
fn to_provider_messages(history: &[ChatMessage]) -> Vec<Message> {
    history
        .iter()
        .filter(|m| !m.error && !m.text.trim().is_empty())
        .map(|m| match m.sender {
            Sender::User => Message::user(m.text.clone()),
            Sender::Assistant => Message::assistant(m.text.clone()),
        })
        .collect()
}

fn note_truncation(chain: &HistoryChain, conversation_id: &Uuid) {
    if chain.truncated {
        warn!(
            %conversation_id,
            kept = chain.len(),
            "history chain truncated at a missing parent, continuing with partial context"
        );
    }
}
