//! SSE stream creation and state machine for the Anthropic Messages API.
//!
//! The protocol:
//! 1. `message_start` carries the message object with input usage
//! 2. per block: `content_block_start`, N x `content_block_delta`, `content_block_stop`
//! 3. `message_delta` carries the stop reason and cumulative output usage
//! 4. `message_stop` ends the message
//! 5. `ping` may appear anywhere; `error` may appear mid-stream
//!
//! Only `text_delta` content reaches the client. Thinking and tool-input
//! deltas are dropped.

use futures_util::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, trace};

use parley_core::llm::provider::LlmStream;
use parley_types::llm::{LlmError, StreamEvent, Usage};

use super::types::{
    AnthropicDelta, AnthropicRequest, ContentBlockDeltaPayload, ErrorPayload, MessageDeltaPayload,
    MessageStartPayload,
};

/// Map an Anthropic error `type` to the common taxonomy.
pub(crate) fn map_error_type(error_type: &str, message: String) -> LlmError {
    match error_type {
        "authentication_error" | "permission_error" => LlmError::AuthenticationFailed(message),
        "rate_limit_error" => LlmError::RateLimited {
            retry_after_ms: None,
        },
        "invalid_request_error" | "not_found_error" | "request_too_large" => {
            LlmError::InvalidRequest(message)
        }
        "overloaded_error" => LlmError::Overloaded(message),
        _ => LlmError::Provider {
            message: format!("{error_type}: {message}"),
        },
    }
}

/// Map a non-2xx response to the common taxonomy, preferring the typed body.
pub(crate) fn map_error_response(status: u16, body: String) -> LlmError {
    match serde_json::from_str::<ErrorPayload>(&body) {
        Ok(payload) if status != 429 => map_error_type(&payload.error.error_type, payload.error.message),
        _ => LlmError::from_status(status, body),
    }
}

/// Accumulates usage across events and decides what each event produces.
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    usage: Usage,
    finished: bool,
}

impl StreamState {
    /// Handle one SSE event.
    ///
    /// `Ok(Some(Done))` ends the stream; `Err` ends it with a failure.
    pub(crate) fn on_event(&mut self, event: &str, data: &str) -> Result<Option<StreamEvent>, LlmError> {
        match event {
            "message_start" => {
                let payload: MessageStartPayload = parse(event, data)?;
                trace!(id = %payload.message.id, model = %payload.message.model, "message started");
                if let Some(usage) = payload.message.usage {
                    self.usage.input_tokens = usage.input_tokens;
                    self.usage.output_tokens = usage.output_tokens;
                }
                Ok(None)
            }
            "content_block_delta" => {
                let payload: ContentBlockDeltaPayload = parse(event, data)?;
                match payload.delta {
                    AnthropicDelta::TextDelta { text } if !text.is_empty() => {
                        Ok(Some(StreamEvent::Delta { text }))
                    }
                    _ => Ok(None),
                }
            }
            "message_delta" => {
                let payload: MessageDeltaPayload = parse(event, data)?;
                self.usage.output_tokens = payload.usage.output_tokens;
                if payload.usage.input_tokens > 0 {
                    self.usage.input_tokens = payload.usage.input_tokens;
                }
                trace!(stop_reason = ?payload.delta.stop_reason, "message delta");
                Ok(None)
            }
            "message_stop" => {
                self.finished = true;
                Ok(Some(StreamEvent::Done { usage: self.usage }))
            }
            "error" => {
                let payload: ErrorPayload = parse(event, data)?;
                Err(map_error_type(&payload.error.error_type, payload.error.message))
            }
            // ping, content_block_start, content_block_stop, and future event types
            _ => Ok(None),
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }
}

fn parse<T: serde::de::DeserializeOwned>(event: &str, data: &str) -> Result<T, LlmError> {
    serde_json::from_str(data)
        .map_err(|e| LlmError::Deserialization(format!("invalid {event} payload: {e}")))
}

/// Open a streaming SSE connection to the Anthropic Messages API.
pub fn create_anthropic_stream(
    client: &reqwest::Client,
    url: &str,
    body: AnthropicRequest,
    api_key: &SecretString,
    api_version: &'static str,
) -> LlmStream {
    let builder = client
        .post(url)
        .header("x-api-key", api_key.expose_secret())
        .header("anthropic-version", api_version)
        .header("content-type", "application/json")
        .json(&body);

    Box::pin(async_stream::stream! {
        let mut source = match EventSource::new(builder) {
            Ok(source) => source,
            Err(e) => {
                yield Err(LlmError::InvalidRequest(format!("cannot build stream request: {e}")));
                return;
            }
        };
        let mut state = StreamState::default();

        while let Some(item) = source.next().await {
            match item {
                Ok(Event::Open) => debug!("anthropic stream opened"),
                Ok(Event::Message(message)) => match state.on_event(&message.event, &message.data) {
                    Ok(Some(event)) => {
                        yield Ok(event);
                        if state.is_finished() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                },
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let body = response.text().await.unwrap_or_default();
                    yield Err(map_error_response(status.as_u16(), body));
                    break;
                }
                Err(reqwest_eventsource::Error::Transport(e)) => {
                    yield Err(LlmError::Network(e.to_string()));
                    break;
                }
                Err(e) => {
                    yield Err(LlmError::Provider {
                        message: format!("stream error: {e}"),
                    });
                    break;
                }
            }
        }
        // Stop the built-in reconnect.
        source.close();
    })
}
