//! Branching message records.
//!
//! Messages form a forest per conversation: each record points at its logical
//! predecessor through `parent_message_id`, and `None` marks a root. On the
//! wire a root is encoded with the all-zero UUID; the translation lives in the
//! [`parent_id`] serde module so no other code sees the sentinel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Wire sentinel meaning "no parent".
pub const NO_PARENT: Uuid = Uuid::nil();

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Sender::User),
            "assistant" => Ok(Sender::Assistant),
            other => Err(format!("invalid sender: '{other}'")),
        }
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    #[serde(with = "parent_id", default)]
    pub parent_message_id: Option<Uuid>,
    pub user: String,
    pub sender: Sender,
    pub text: String,
    pub is_created_by_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl ChatMessage {
    /// A fresh user-authored message.
    pub fn from_user(
        message_id: Uuid,
        conversation_id: Uuid,
        parent_message_id: Option<Uuid>,
        user: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            message_id,
            conversation_id,
            parent_message_id,
            user: user.into(),
            sender: Sender::User,
            text: text.into(),
            is_created_by_user: true,
            model: None,
            error: false,
            token_count: None,
            created_at: now,
            updated_at: now,
            files: Vec::new(),
        }
    }

    /// A fresh assistant message (text filled in as the stream completes).
    pub fn from_assistant(
        message_id: Uuid,
        conversation_id: Uuid,
        parent_message_id: Option<Uuid>,
        user: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            message_id,
            conversation_id,
            parent_message_id,
            user: user.into(),
            sender: Sender::Assistant,
            text: String::new(),
            is_created_by_user: false,
            model: Some(model.into()),
            error: false,
            token_count: None,
            created_at: now,
            updated_at: now,
            files: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_message_id.is_none()
    }
}

/// Partial in-place update of a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub text: Option<String>,
    pub model: Option<String>,
    pub error: Option<bool>,
    pub token_count: Option<u32>,
}

impl MessagePatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.model.is_none()
            && self.error.is_none()
            && self.token_count.is_none()
    }
}

/// Serde adapter mapping `None` to and from the all-zero UUID.
pub mod parent_id {
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    use super::NO_PARENT;

    pub fn serialize<S: Serializer>(value: &Option<Uuid>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.unwrap_or(NO_PARENT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Uuid>, D::Error> {
        let raw: Option<Uuid> = Option::deserialize(deserializer)?;
        Ok(raw.filter(|id| *id != NO_PARENT))
    }
}
