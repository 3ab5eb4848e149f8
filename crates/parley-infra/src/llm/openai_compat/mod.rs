//! OpenAI-compatible LLM provider implementation.
//!
//! A single [`OpenAiCompatibleProvider`] serves OpenAI, Mistral, Gemini and
//! Groq through configurable base URLs (see [`config::preset`]).
//!
//! Uses [`async_openai`] for request/response types and SSE streaming.

pub mod config;
pub mod streaming;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
    ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
    ChatCompletionStreamOptions, CreateChatCompletionRequest, ImageUrl, StopConfiguration,
};
use async_openai::Client;
use futures_util::StreamExt;
use secrecy::ExposeSecret;
use tracing::debug;

use parley_core::llm::provider::{LlmProvider, LlmStream};
use parley_types::llm::{
    CompletionRequest, CompletionResponse, ContentPart, LlmError, MessageContent, MessageRole,
    ProviderType, Usage,
};

use self::config::OpenAiCompatConfig;
use self::streaming::map_openai_stream;

/// Unified provider for any OpenAI-compatible API.
///
/// Does not derive `Debug`: the `async_openai::Client` holds the API key.
pub struct OpenAiCompatibleProvider {
    client: Client<OpenAIConfig>,
    provider_name: String,
    default_model: Option<String>,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.expose_secret())
            .with_api_base(&config.base_url);

        Self {
            client: Client::with_config(openai_config),
            provider_name: config.provider_name,
            default_model: config.default_model,
        }
    }

    /// Build a [`CreateChatCompletionRequest`] from a generic [`CompletionRequest`].
    fn build_request(&self, request: &CompletionRequest, stream: bool) -> CreateChatCompletionRequest {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();

        if let Some(system) = request.system.as_ref().filter(|s| !s.is_empty()) {
            messages.push(system_message(system.clone()));
        }

        for msg in &request.messages {
            let oai_msg = match msg.role {
                MessageRole::System => system_message(msg.content.text()),
                MessageRole::User => {
                    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                        content: user_content(&msg.content),
                        name: None,
                    })
                }
                MessageRole::Assistant => {
                    #[allow(deprecated)]
                    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                        content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                            msg.content.text(),
                        )),
                        refusal: None,
                        name: None,
                        audio: None,
                        tool_calls: None,
                        function_call: None,
                    })
                }
            };
            messages.push(oai_msg);
        }

        let sampling = &request.sampling;
        if sampling.top_k.is_some() {
            debug!(provider = %self.provider_name, "top_k is not supported by chat completions, ignoring");
        }
        if !sampling.extra.is_empty() {
            debug!(
                provider = %self.provider_name,
                keys = ?sampling.extra.keys().collect::<Vec<_>>(),
                "extra sampling parameters are not forwarded"
            );
        }

        let mut req = CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            max_completion_tokens: Some(request.max_tokens()),
            temperature: sampling.temperature.map(|t| t as f32),
            top_p: sampling.top_p.map(|p| p as f32),
            ..Default::default()
        };

        if !sampling.stop_sequences.is_empty() {
            req.stop = Some(StopConfiguration::StringArray(sampling.stop_sequences.clone()));
        }

        if stream {
            req.stream = Some(true);
            req.stream_options = Some(ChatCompletionStreamOptions {
                include_usage: Some(true),
                include_obfuscation: None,
            });
        }

        req
    }
}

fn system_message(text: String) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: ChatCompletionRequestSystemMessageContent::Text(text),
        name: None,
    })
}

/// Images travel as `data:` URLs inside an array of parts.
fn user_content(content: &MessageContent) -> ChatCompletionRequestUserMessageContent {
    match content {
        MessageContent::Text(text) => ChatCompletionRequestUserMessageContent::Text(text.clone()),
        MessageContent::Parts(parts) => ChatCompletionRequestUserMessageContent::Array(
            parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => ChatCompletionRequestUserMessageContentPart::Text(
                        ChatCompletionRequestMessageContentPartText { text: text.clone() },
                    ),
                    ContentPart::Image { media_type, data } => {
                        ChatCompletionRequestUserMessageContentPart::ImageUrl(
                            ChatCompletionRequestMessageContentPartImage {
                                image_url: ImageUrl {
                                    url: format!("data:{media_type};base64,{data}"),
                                    detail: None,
                                },
                            },
                        )
                    }
                })
                .collect(),
        ),
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAi
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let oai_request = self.build_request(request, false);
        debug!(provider = %self.provider_name, model = %oai_request.model, "openai completion");

        let response = self
            .client
            .chat()
            .create(oai_request)
            .await
            .map_err(map_openai_error)?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: response.id,
            content,
            model: response.model,
            usage,
        })
    }

    fn stream(&self, request: CompletionRequest) -> LlmStream {
        let oai_request = self.build_request(&request, true);
        debug!(provider = %self.provider_name, model = %oai_request.model, "openai stream");

        // The stream outlives &self.
        let client = self.client.clone();

        Box::pin(async_stream::try_stream! {
            let oai_stream = client
                .chat()
                .create_stream(oai_request)
                .await
                .map_err(map_openai_error)?;

            let mut inner = map_openai_stream(oai_stream);
            while let Some(event) = inner.next().await {
                yield event?;
            }
        })
    }
}

/// Map an `async_openai::error::OpenAIError` to an [`LlmError`].
pub(crate) fn map_openai_error(err: async_openai::error::OpenAIError) -> LlmError {
    use async_openai::error::OpenAIError;

    match &err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.as_deref().unwrap_or("");
            let error_type = api_err.r#type.as_deref().unwrap_or("");

            if code == "invalid_api_key"
                || error_type == "authentication_error"
                || api_err.message.contains("Incorrect API key")
                || api_err.message.contains("Invalid API key")
            {
                LlmError::AuthenticationFailed(api_err.message.clone())
            } else if code == "rate_limit_exceeded" || error_type == "rate_limit_error" {
                LlmError::RateLimited {
                    retry_after_ms: None,
                }
            } else if code == "context_length_exceeded"
                || code == "model_not_found"
                || error_type == "invalid_request_error"
            {
                LlmError::InvalidRequest(api_err.message.clone())
            } else if code == "server_error" || error_type == "overloaded_error" {
                LlmError::Overloaded(api_err.message.clone())
            } else {
                LlmError::Provider {
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::Reqwest(reqwest_err) => match reqwest_err.status() {
            Some(status) => LlmError::from_status(status.as_u16(), err.to_string()),
            None => LlmError::Network(err.to_string()),
        },
        OpenAIError::JSONDeserialize(_, content) => {
            LlmError::Deserialization(format!("failed to parse response: {content}"))
        }
        OpenAIError::StreamError(stream_err) => LlmError::Network(stream_err.to_string()),
        OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg.clone()),
        _ => LlmError::Provider {
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::llm::{Message, SamplingParams};
    use secrecy::SecretString;

    fn make_provider() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(
            OpenAiCompatConfig::from_preset(config::MISTRAL, SecretString::from("sk-test"))
                .with_default_model(Some("mistral-small-latest".into())),
        )
    }

    fn request(messages: Vec<Message>, sampling: SamplingParams) -> CompletionRequest {
        CompletionRequest {
            model: "mistral-large-latest".to_string(),
            messages,
            system: Some("Be helpful".to_string()),
            sampling,
        }
    }

    #[test]
    fn test_provider_identity() {
        let provider = make_provider();
        assert_eq!(provider.name(), "mistral");
        assert_eq!(provider.provider_type(), ProviderType::OpenAi);
        assert_eq!(provider.default_model(), Some("mistral-small-latest"));
    }

    #[test]
    fn test_build_request_messages() {
        let provider = make_provider();
        let req = provider.build_request(
            &request(
                vec![Message::user("Hello"), Message::assistant("Hi there!")],
                SamplingParams {
                    temperature: Some(0.5),
                    max_tokens: Some(1024),
                    ..Default::default()
                },
            ),
            false,
        );
        assert_eq!(req.model, "mistral-large-latest");
        // system + 2 conversation messages
        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.max_completion_tokens, Some(1024));
        assert_eq!(req.temperature, Some(0.5));
        assert!(req.stream.is_none());
        assert!(req.stream_options.is_none());
        assert!(req.stop.is_none());
    }

    #[test]
    fn test_build_request_streaming_with_stops() {
        let provider = make_provider();
        let req = provider.build_request(
            &request(
                vec![Message::user("Hello")],
                SamplingParams {
                    stop_sequences: vec!["STOP".into()],
                    top_k: Some(20),
                    ..Default::default()
                },
            ),
            true,
        );
        assert_eq!(req.stream, Some(true));
        assert_eq!(req.stream_options.unwrap().include_usage, Some(true));
        assert!(req.stop.is_some());
        assert_eq!(req.max_completion_tokens, Some(CompletionRequest::DEFAULT_MAX_TOKENS));
    }

    #[test]
    fn test_images_become_data_urls() {
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "What is this?".into(),
            },
            ContentPart::Image {
                media_type: "image/png".into(),
                data: "iVBORw0KGgo".into(),
            },
        ]);
        match user_content(&content) {
            ChatCompletionRequestUserMessageContent::Array(parts) => {
                assert_eq!(parts.len(), 2);
                match &parts[1] {
                    ChatCompletionRequestUserMessageContentPart::ImageUrl(image) => {
                        assert_eq!(image.image_url.url, "data:image/png;base64,iVBORw0KGgo");
                    }
                    other => panic!("expected image part, got {other:?}"),
                }
            }
            other => panic!("expected parts, got {other:?}"),
        }
    }

    #[test]
    fn test_map_openai_error_api_auth() {
        use async_openai::error::{ApiError, OpenAIError};
        let api_err = ApiError {
            message: "Incorrect API key provided".to_string(),
            r#type: Some("invalid_request_error".to_string()),
            param: None,
            code: Some("invalid_api_key".to_string()),
        };
        let err = map_openai_error(OpenAIError::ApiError(api_err));
        assert!(matches!(err, LlmError::AuthenticationFailed(_)));
    }

    #[test]
    fn test_map_openai_error_rate_limit() {
        use async_openai::error::{ApiError, OpenAIError};
        let api_err = ApiError {
            message: "Rate limit exceeded".to_string(),
            r#type: Some("rate_limit_error".to_string()),
            param: None,
            code: None,
        };
        let err = map_openai_error(OpenAIError::ApiError(api_err));
        assert!(matches!(err, LlmError::RateLimited { .. }));
    }

    #[test]
    fn test_map_openai_error_invalid_argument() {
        use async_openai::error::OpenAIError;
        let err = map_openai_error(OpenAIError::InvalidArgument("bad arg".to_string()));
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }
}
