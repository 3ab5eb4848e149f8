//! Background title task and the poll-wait-poll read side.

use std::sync::Arc;
use std::time::Duration;

use parley_types::error::TitleError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cache::TitleCache;
use super::generate::generate_title;
use crate::chat::repository::ConversationRepository;
use crate::llm::box_provider::BoxLlmProvider;

/// Everything a title task needs, owned.
pub struct TitleJob {
    pub user_id: String,
    pub conversation_id: Uuid,
    pub user_text: String,
    pub assistant_text: String,
    pub provider: Arc<BoxLlmProvider>,
    pub model: String,
    pub ttl: Duration,
}

/// Spawn title generation for a new conversation.
///
/// The task writes the title to the cache and to the conversation record. A
/// cache failure is skipped silently, a generation failure is logged and
/// swallowed. Cancelling `shutdown` abandons the task.
pub fn spawn_title_task<C, T>(
    job: TitleJob,
    conversations: Arc<C>,
    cache: Arc<T>,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    C: ConversationRepository + 'static,
    T: TitleCache + 'static,
{
    tokio::spawn(async move {
        let conversation_id = job.conversation_id;
        let title = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!(%conversation_id, "title generation cancelled by shutdown");
                return;
            }
            result = generate_title(&job.provider, &job.user_text, &job.assistant_text, &job.model) => result,
        };

        let title = match title {
            Ok(title) if !title.is_empty() => title,
            Ok(_) => {
                warn!(%conversation_id, "title model returned an empty title");
                return;
            }
            Err(e) => {
                warn!(%conversation_id, error = %e, kind = e.kind(), "title generation failed");
                return;
            }
        };

        if let Err(e) = cache
            .put(&job.user_id, &conversation_id, &title, job.ttl)
            .await
        {
            debug!(%conversation_id, error = %e, "title cache unavailable, skipping handoff");
        }

        match conversations
            .update_title(&conversation_id, &job.user_id, &title)
            .await
        {
            Ok(true) => info!(%conversation_id, %title, "conversation titled"),
            Ok(false) => warn!(%conversation_id, "conversation vanished before titling"),
            Err(e) => warn!(%conversation_id, error = %e, "failed to store conversation title"),
        }
    })
}

/// Collect a generated title: poll, wait `delay`, poll once more.
///
/// A cache failure reads as "not there yet".
pub async fn poll_title<T: TitleCache>(
    cache: &T,
    user_id: &str,
    conversation_id: &Uuid,
    delay: Duration,
) -> Result<String, TitleError> {
    if let Some(title) = take(cache, user_id, conversation_id).await {
        return Ok(title);
    }
    tokio::time::sleep(delay).await;
    take(cache, user_id, conversation_id)
        .await
        .ok_or(TitleError::NotReady)
}

async fn take<T: TitleCache>(cache: &T, user_id: &str, conversation_id: &Uuid) -> Option<String> {
    match cache.take(user_id, conversation_id).await {
        Ok(title) => title,
        Err(e) => {
            debug!(%conversation_id, error = %e, "title cache unavailable");
            None
        }
    }
}
