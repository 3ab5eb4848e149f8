//! LLM request/response types for Parley.
//!
//! These types model the provider-agnostic side of every LLM call:
//! role-tagged messages with text or mixed text/image content, sampling
//! parameters, the normalized streaming events, and the common error taxonomy
//! every provider adapter maps its native failures into.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a message in an LLM conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// One part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Inline image, base64-encoded.
    Image { media_type: String, data: String },
}

/// Message body: plain text, or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn has_images(&self) -> bool {
        matches!(self, MessageContent::Parts(parts)
            if parts.iter().any(|p| matches!(p, ContentPart::Image { .. })))
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

/// A single message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl Message {
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters shared by all providers.
///
/// `extra` carries provider-specific fields that are passed through verbatim
/// by adapters that support them and ignored by the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SamplingParams {
    /// Overlay `other` on top of `self`: every value set in `other` wins.
    pub fn merged_with(&self, other: &SamplingParams) -> SamplingParams {
        let mut extra = self.extra.clone();
        extra.extend(other.extra.clone());
        SamplingParams {
            temperature: other.temperature.or(self.temperature),
            top_p: other.top_p.or(self.top_p),
            top_k: other.top_k.or(self.top_k),
            stop_sequences: if other.stop_sequences.is_empty() {
                self.stop_sequences.clone()
            } else {
                other.stop_sequences.clone()
            },
            max_tokens: other.max_tokens.or(self.max_tokens),
            extra,
        }
    }
}

/// Request to an LLM provider for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default)]
    pub sampling: SamplingParams,
}

impl CompletionRequest {
    /// Default output budget when neither the spec nor the request sets one.
    pub const DEFAULT_MAX_TOKENS: u32 = 4096;

    pub fn max_tokens(&self) -> u32 {
        self.sampling.max_tokens.unwrap_or(Self::DEFAULT_MAX_TOKENS)
    }
}

/// Response from an LLM provider for a non-streaming completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub usage: Usage,
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Normalized events emitted by every provider adapter.
///
/// A well-formed stream is zero or more `Delta` followed by exactly one
/// `Done`. Failures arrive as `Err(LlmError)` items and end the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Delta { text: String },
    Done { usage: Usage },
}

/// Errors from LLM provider operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("provider overloaded: {0}")]
    Overloaded(String),

    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl LlmError {
    /// Stable machine-readable category, used in logs and error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            LlmError::AuthenticationFailed(_) => "authentication",
            LlmError::RateLimited { .. } => "rate_limit",
            LlmError::InvalidRequest(_) => "invalid_request",
            LlmError::Network(_) => "network",
            LlmError::Overloaded(_) => "overloaded",
            LlmError::Provider { .. } => "provider",
            LlmError::Deserialization(_) => "deserialization",
        }
    }

    /// Map an HTTP status from a provider into the common taxonomy.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => LlmError::AuthenticationFailed(body),
            429 => LlmError::RateLimited {
                retry_after_ms: None,
            },
            400 | 404 | 413 | 422 => LlmError::InvalidRequest(body),
            503 | 529 => LlmError::Overloaded(body),
            _ => LlmError::Provider {
                message: format!("HTTP {status}: {body}"),
            },
        }
    }
}

/// The closed set of provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Anthropic,
    /// Any OpenAI-compatible Chat Completions API.
    #[serde(rename = "openai", alias = "openAI")]
    OpenAi,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::Anthropic => write!(f, "anthropic"),
            ProviderType::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(ProviderType::Anthropic),
            "openai" => Ok(ProviderType::OpenAi),
            other => Err(format!("invalid provider type: '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_roundtrip() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            let parsed: MessageRole = role.to_string().parse().unwrap();
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn test_provider_type_serde() {
        let json = serde_json::to_string(&ProviderType::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
        let parsed: ProviderType = serde_json::from_str("\"openAI\"").unwrap();
        assert_eq!(parsed, ProviderType::OpenAi);
        assert!("bedrock".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_sampling_merge_prefers_override() {
        let base = SamplingParams {
            temperature: Some(0.2),
            top_p: Some(0.9),
            max_tokens: Some(1000),
            stop_sequences: vec!["\n\nHuman:".to_string()],
            ..Default::default()
        };
        let over = SamplingParams {
            temperature: Some(0.8),
            ..Default::default()
        };
        let merged = base.merged_with(&over);
        assert_eq!(merged.temperature, Some(0.8));
        assert_eq!(merged.top_p, Some(0.9));
        assert_eq!(merged.max_tokens, Some(1000));
        assert_eq!(merged.stop_sequences.len(), 1);
    }

    #[test]
    fn test_content_text_skips_images() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "look".to_string(),
            },
            ContentPart::Image {
                media_type: "image/png".to_string(),
                data: "AAAA".to_string(),
            },
        ]);
        assert_eq!(content.text(), "look");
        assert!(content.has_images());
        assert!(!MessageContent::from("plain").has_images());
    }

    #[test]
    fn test_llm_error_kind_from_status() {
        assert_eq!(LlmError::from_status(401, String::new()).kind(), "authentication");
        assert_eq!(LlmError::from_status(429, String::new()).kind(), "rate_limit");
        assert_eq!(LlmError::from_status(400, String::new()).kind(), "invalid_request");
        assert_eq!(LlmError::from_status(529, String::new()).kind(), "overloaded");
        assert_eq!(LlmError::from_status(500, String::new()).kind(), "provider");
    }

    #[test]
    fn test_stream_event_serde_tag() {
        let json = serde_json::to_value(StreamEvent::Delta {
            text: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "delta");
    }
}
