//! Conversation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::{ProviderType, SamplingParams};

/// Title a conversation carries until title generation completes.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Per-conversation generation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_prefix: Option<String>,
    #[serde(flatten)]
    pub sampling: SamplingParams,
}

/// Display metadata attached to a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
}

/// A conversation owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conversation_id: Uuid,
    pub user: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<ProviderType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub settings: ConversationSettings,
    #[serde(default)]
    pub metadata: ConversationMetadata,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// A new, untitled conversation.
    pub fn new(conversation_id: Uuid, user: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id,
            user: user.into(),
            title: DEFAULT_TITLE.to_string(),
            endpoint: None,
            model: None,
            settings: ConversationSettings::default(),
            metadata: ConversationMetadata::default(),
            is_archived: false,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
