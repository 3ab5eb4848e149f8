//! Client request shapes for the ask and edit endpoints.
//!
//! The wire contract overloads `parentMessageId`: on an edit it names the
//! message being edited rather than a parent. [`EditTarget`] captures that
//! distinction once, at the boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::{ProviderType, SamplingParams};
use crate::message::parent_id;

/// Reference to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

/// Body of `POST /api/ask` and `POST /api/edit`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub text: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default, with = "parent_id")]
    pub parent_message_id: Option<Uuid>,
    #[serde(default)]
    pub message_id: Option<Uuid>,
    #[serde(default)]
    pub response_message_id: Option<Uuid>,
    #[serde(default)]
    pub override_parent_message_id: Option<Uuid>,
    #[serde(default)]
    pub endpoint: Option<ProviderType>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub spec: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
    #[serde(default)]
    pub prompt_prefix: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default, alias = "top_p")]
    pub top_p: Option<f64>,
    #[serde(default, alias = "top_k")]
    pub top_k: Option<u32>,
    #[serde(default, alias = "max_tokens")]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub stop: Vec<String>,
}

impl AskRequest {
    /// Parse the conversation id; absent, empty, `"new"` and the nil UUID all
    /// mean "start a new conversation".
    pub fn conversation_id(&self) -> Result<Option<Uuid>, String> {
        match self.conversation_id.as_deref().map(str::trim) {
            None | Some("") | Some("new") => Ok(None),
            Some(raw) => {
                let id = Uuid::parse_str(raw)
                    .map_err(|_| format!("invalid conversationId: '{raw}'"))?;
                Ok((!id.is_nil()).then_some(id))
            }
        }
    }

    /// Sampling values the client set explicitly.
    pub fn sampling_overrides(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            stop_sequences: self.stop.clone(),
            max_tokens: self.max_output_tokens,
            extra: serde_json::Map::new(),
        }
    }
}

/// Which message an edit request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EditTarget {
    /// The client named the assistant message to regenerate.
    #[serde(rename_all = "camelCase")]
    ByResponseId { response_message_id: Uuid },
    /// The client sent the edited message's id in `parentMessageId`.
    #[serde(rename_all = "camelCase")]
    ByFieldAlias { aliased_message_id: Uuid },
}

impl EditTarget {
    /// Translate the overloaded wire fields. `responseMessageId` wins.
    pub fn from_request(request: &AskRequest) -> Option<Self> {
        if let Some(response_message_id) = request.response_message_id {
            return Some(EditTarget::ByResponseId {
                response_message_id,
            });
        }
        request
            .parent_message_id
            .map(|aliased_message_id| EditTarget::ByFieldAlias { aliased_message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: serde_json::Value) -> AskRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_nil_parent_is_none() {
        let req = parse(serde_json::json!({
            "text": "Hello",
            "conversationId": null,
            "parentMessageId": "00000000-0000-0000-0000-000000000000",
            "model": "gpt-4o"
        }));
        assert!(req.parent_message_id.is_none());
        assert_eq!(req.conversation_id().unwrap(), None);
    }

    #[test]
    fn test_conversation_id_variants() {
        let mut req = AskRequest::default();
        req.conversation_id = Some("new".to_string());
        assert_eq!(req.conversation_id().unwrap(), None);

        let id = Uuid::now_v7();
        req.conversation_id = Some(id.to_string());
        assert_eq!(req.conversation_id().unwrap(), Some(id));

        req.conversation_id = Some("not-a-uuid".to_string());
        assert!(req.conversation_id().is_err());
    }

    #[test]
    fn test_edit_target_prefers_response_id() {
        let parent = Uuid::now_v7();
        let response = Uuid::now_v7();
        let req = AskRequest {
            parent_message_id: Some(parent),
            response_message_id: Some(response),
            ..Default::default()
        };
        assert_eq!(
            EditTarget::from_request(&req),
            Some(EditTarget::ByResponseId {
                response_message_id: response
            })
        );

        let req = AskRequest {
            parent_message_id: Some(parent),
            ..Default::default()
        };
        assert_eq!(
            EditTarget::from_request(&req),
            Some(EditTarget::ByFieldAlias {
                aliased_message_id: parent
            })
        );
        assert_eq!(EditTarget::from_request(&AskRequest::default()), None);
    }

    #[test]
    fn test_edit_target_serializes_tagged() {
        let target = EditTarget::ByFieldAlias {
            aliased_message_id: Uuid::nil(),
        };
        let json = serde_json::to_value(target).unwrap();
        assert_eq!(json["kind"], "byFieldAlias");
        assert!(json.get("aliasedMessageId").is_some());
    }

    #[test]
    fn test_sampling_overrides_and_files() {
        let req = parse(serde_json::json!({
            "text": "hi",
            "temperature": 0.3,
            "topP": 0.8,
            "maxOutputTokens": 512,
            "files": [{ "file_id": "f1" }]
        }));
        let sampling = req.sampling_overrides();
        assert_eq!(sampling.temperature, Some(0.3));
        assert_eq!(sampling.top_p, Some(0.8));
        assert_eq!(sampling.max_tokens, Some(512));
        assert_eq!(req.files[0].file_id, "f1");

        let snake = parse(serde_json::json!({
            "text": "hi",
            "top_p": 0.5,
            "top_k": 40,
            "max_tokens": 256
        }));
        assert_eq!(snake.top_p, Some(0.5));
        assert_eq!(snake.top_k, Some(40));
        assert_eq!(snake.max_output_tokens, Some(256));

        let camel = parse(serde_json::json!({ "text": "hi", "topK": 20 }));
        assert_eq!(camel.top_k, Some(20));
    }
}
