//! Edit-target classification.
//!
//! An edit either regenerates an existing assistant reply in place or starts a
//! new branch under the edited user message. [`classify_edit_target`] decides
//! which, from the already-disambiguated [`EditTarget`].

use parley_types::error::ChatError;
use parley_types::message::{ChatMessage, Sender};
use parley_types::request::EditTarget;
use uuid::Uuid;

use super::repository::MessageRepository;

/// Outcome of classifying an edit request.
#[derive(Debug, Clone, PartialEq)]
pub struct EditPlan {
    /// The user message whose text the edit applies to.
    pub user_message: ChatMessage,
    /// The assistant reply to overwrite; `None` means a new branch.
    pub assistant_message: Option<ChatMessage>,
    /// Parent of a newly created reply. Only meaningful for a new branch.
    pub response_parent_id: Uuid,
}

impl EditPlan {
    pub fn is_new_branch(&self) -> bool {
        self.assistant_message.is_none()
    }
}

/// Resolve an edit request into the user message to edit and the assistant
/// message to update, if any.
///
/// 1. `ByResponseId` names the assistant message; its parent is the user message.
/// 2. `ByFieldAlias` names the edited message itself. An assistant message is
///    treated as in (1); a user message pairs with its most recent assistant child.
/// 3. A user message with no assistant child is a new branch, parented to
///    `override_parent` when given.
#[tracing::instrument(skip(repo, conversation_id), fields(conversation_id = %conversation_id))]
pub async fn classify_edit_target<M: MessageRepository>(
    repo: &M,
    conversation_id: &Uuid,
    user_id: &str,
    target: EditTarget,
    override_parent: Option<Uuid>,
) -> Result<EditPlan, ChatError> {
    let (user_message, assistant_message) = match target {
        EditTarget::ByResponseId {
            response_message_id,
        } => {
            let assistant = load(repo, conversation_id, user_id, &response_message_id).await?;
            if assistant.sender != Sender::Assistant {
                return Err(ChatError::Validation(format!(
                    "responseMessageId {response_message_id} is not an assistant message"
                )));
            }
            let user = parent_of(repo, conversation_id, user_id, &assistant).await?;
            (user, Some(assistant))
        }
        EditTarget::ByFieldAlias { aliased_message_id } => {
            let edited = load(repo, conversation_id, user_id, &aliased_message_id).await?;
            match edited.sender {
                Sender::Assistant => {
                    let user = parent_of(repo, conversation_id, user_id, &edited).await?;
                    (user, Some(edited))
                }
                Sender::User => {
                    let latest = repo
                        .children(conversation_id, user_id, &edited.message_id)
                        .await?
                        .into_iter()
                        .filter(|m| m.sender == Sender::Assistant)
                        .next_back();
                    (edited, latest)
                }
            }
        }
    };

    let response_parent_id = match &assistant_message {
        Some(_) => user_message.message_id,
        None => override_parent.unwrap_or(user_message.message_id),
    };

    tracing::debug!(
        user_message_id = %user_message.message_id,
        new_branch = assistant_message.is_none(),
        "classified edit target"
    );

    Ok(EditPlan {
        user_message,
        assistant_message,
        response_parent_id,
    })
}

async fn load<M: MessageRepository>(
    repo: &M,
    conversation_id: &Uuid,
    user_id: &str,
    message_id: &Uuid,
) -> Result<ChatMessage, ChatError> {
    repo.get(message_id, user_id)
        .await?
        .filter(|m| m.conversation_id == *conversation_id)
        .ok_or_else(|| ChatError::NotFound(format!("message {message_id}")))
}

async fn parent_of<M: MessageRepository>(
    repo: &M,
    conversation_id: &Uuid,
    user_id: &str,
    assistant: &ChatMessage,
) -> Result<ChatMessage, ChatError> {
    let parent_id = assistant.parent_message_id.ok_or_else(|| {
        ChatError::Validation(format!(
            "assistant message {} has no parent user message",
            assistant.message_id
        ))
    })?;
    let parent = load(repo, conversation_id, user_id, &parent_id).await?;
    if parent.sender != Sender::User {
        return Err(ChatError::Validation(format!(
            "parent of assistant message {} is not a user message",
            assistant.message_id
        )));
    }
    Ok(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::InMemoryMessages;

    const USER: &str = "u1";

    struct Thread {
        convo: Uuid,
        question: ChatMessage,
        first_answer: ChatMessage,
        second_answer: ChatMessage,
    }

    fn seed(repo: &InMemoryMessages) -> Thread {
        let convo = Uuid::now_v7();
        let question = ChatMessage::from_user(Uuid::now_v7(), convo, None, USER, "Hello");
        let mut first_answer =
            ChatMessage::from_assistant(Uuid::now_v7(), convo, Some(question.message_id), USER, "m");
        first_answer.text = "Hi".into();
        let mut second_answer =
            ChatMessage::from_assistant(Uuid::now_v7(), convo, Some(question.message_id), USER, "m");
        second_answer.text = "Hey there".into();
        second_answer.created_at = first_answer.created_at + chrono::Duration::seconds(1);
        repo.seed(question.clone());
        repo.seed(first_answer.clone());
        repo.seed(second_answer.clone());
        Thread {
            convo,
            question,
            first_answer,
            second_answer,
        }
    }

    #[tokio::test]
    async fn test_by_response_id_targets_that_assistant() {
        let repo = InMemoryMessages::default();
        let t = seed(&repo);
        let plan = classify_edit_target(
            &repo,
            &t.convo,
            USER,
            EditTarget::ByResponseId {
                response_message_id: t.first_answer.message_id,
            },
            None,
        )
        .await
        .unwrap();
        assert_eq!(plan.user_message.message_id, t.question.message_id);
        assert_eq!(
            plan.assistant_message.map(|m| m.message_id),
            Some(t.first_answer.message_id)
        );
    }

    #[tokio::test]
    async fn test_alias_of_user_message_picks_latest_assistant_child() {
        let repo = InMemoryMessages::default();
        let t = seed(&repo);
        let plan = classify_edit_target(
            &repo,
            &t.convo,
            USER,
            EditTarget::ByFieldAlias {
                aliased_message_id: t.question.message_id,
            },
            None,
        )
        .await
        .unwrap();
        assert_eq!(plan.user_message.message_id, t.question.message_id);
        assert_eq!(
            plan.assistant_message.map(|m| m.message_id),
            Some(t.second_answer.message_id)
        );
    }

    #[tokio::test]
    async fn test_alias_of_assistant_message_resolves_parent() {
        let repo = InMemoryMessages::default();
        let t = seed(&repo);
        let plan = classify_edit_target(
            &repo,
            &t.convo,
            USER,
            EditTarget::ByFieldAlias {
                aliased_message_id: t.first_answer.message_id,
            },
            None,
        )
        .await
        .unwrap();
        assert_eq!(plan.user_message.message_id, t.question.message_id);
        assert!(!plan.is_new_branch());
    }

    #[tokio::test]
    async fn test_user_message_without_reply_is_new_branch() {
        let repo = InMemoryMessages::default();
        let convo = Uuid::now_v7();
        let lonely = ChatMessage::from_user(Uuid::now_v7(), convo, None, USER, "anyone?");
        repo.seed(lonely.clone());

        let plan = classify_edit_target(
            &repo,
            &convo,
            USER,
            EditTarget::ByFieldAlias {
                aliased_message_id: lonely.message_id,
            },
            None,
        )
        .await
        .unwrap();
        assert!(plan.is_new_branch());
        assert_eq!(plan.response_parent_id, lonely.message_id);

        let override_parent = Uuid::now_v7();
        let plan = classify_edit_target(
            &repo,
            &convo,
            USER,
            EditTarget::ByFieldAlias {
                aliased_message_id: lonely.message_id,
            },
            Some(override_parent),
        )
        .await
        .unwrap();
        assert_eq!(plan.response_parent_id, override_parent);
    }

    #[tokio::test]
    async fn test_classification_is_deterministic() {
        let repo = InMemoryMessages::default();
        let t = seed(&repo);
        let lonely = ChatMessage::from_user(Uuid::now_v7(), t.convo, None, USER, "anyone?");
        repo.seed(lonely.clone());

        let cases = [
            (
                EditTarget::ByFieldAlias {
                    aliased_message_id: t.question.message_id,
                },
                None,
            ),
            (
                EditTarget::ByResponseId {
                    response_message_id: t.first_answer.message_id,
                },
                None,
            ),
            (
                EditTarget::ByFieldAlias {
                    aliased_message_id: lonely.message_id,
                },
                Some(t.second_answer.message_id),
            ),
        ];
        for (target, override_parent) in cases {
            let first = classify_edit_target(&repo, &t.convo, USER, target, override_parent)
                .await
                .unwrap();
            for _ in 0..5 {
                let again = classify_edit_target(&repo, &t.convo, USER, target, override_parent)
                    .await
                    .unwrap();
                assert_eq!(again, first, "{target:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_or_foreign_target_is_not_found() {
        let repo = InMemoryMessages::default();
        let t = seed(&repo);

        let err = classify_edit_target(
            &repo,
            &t.convo,
            USER,
            EditTarget::ByResponseId {
                response_message_id: Uuid::now_v7(),
            },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));

        let err = classify_edit_target(
            &repo,
            &t.convo,
            "someone-else",
            EditTarget::ByFieldAlias {
                aliased_message_id: t.question.message_id,
            },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));

        let err = classify_edit_target(
            &repo,
            &Uuid::now_v7(),
            USER,
            EditTarget::ByFieldAlias {
                aliased_message_id: t.question.message_id,
            },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_response_id_naming_user_message_is_rejected() {
        let repo = InMemoryMessages::default();
        let t = seed(&repo);
        let err = classify_edit_target(
            &repo,
            &t.convo,
            USER,
            EditTarget::ByResponseId {
                response_message_id: t.question.message_id,
            },
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }
}
