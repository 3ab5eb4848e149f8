//! OpenAI SSE stream to [`StreamEvent`] adapter.
//!
//! Maps `async-openai`'s [`ChatCompletionResponseStream`] chunks to the
//! provider-agnostic events. Usage arrives on a final chunk with no choices
//! (requires `stream_options.include_usage`). `Done` is emitted once the
//! upstream stream ends cleanly.

use futures_util::StreamExt;

use async_openai::types::chat::{ChatCompletionResponseStream, CreateChatCompletionStreamResponse};
use tracing::trace;

use parley_core::llm::provider::LlmStream;
use parley_types::llm::{StreamEvent, Usage};

use super::map_openai_error;

/// Text deltas of one chunk; usage, when present, is recorded into `usage`.
pub(crate) fn chunk_deltas(chunk: CreateChatCompletionStreamResponse, usage: &mut Usage) -> Vec<StreamEvent> {
    if let Some(u) = &chunk.usage {
        usage.input_tokens = u.prompt_tokens;
        usage.output_tokens = u.completion_tokens;
    }

    let mut events = Vec::new();
    for choice in chunk.choices {
        if let Some(text) = choice.delta.content {
            if !text.is_empty() {
                events.push(StreamEvent::Delta { text });
            }
        }
        if let Some(reason) = choice.finish_reason {
            trace!(finish_reason = ?reason, "openai choice finished");
        }
    }
    events
}

/// Map an async-openai chunk stream to a stream of [`StreamEvent`]s.
pub fn map_openai_stream(stream: ChatCompletionResponseStream) -> LlmStream {
    Box::pin(async_stream::stream! {
        let mut usage = Usage::default();
        let mut stream = stream;

        while let Some(result) = stream.next().await {
            match result {
                Ok(chunk) => {
                    for event in chunk_deltas(chunk, &mut usage) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    yield Err(map_openai_error(e));
                    return;
                }
            }
        }

        yield Ok(StreamEvent::Done { usage });
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(json: &str) -> CreateChatCompletionStreamResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_content_chunk_yields_delta() {
        let mut usage = Usage::default();
        let events = chunk_deltas(
            chunk(
                r#"{"id":"c1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[{"index":0,"delta":{"role":"assistant","content":"Hi"},"finish_reason":null}]}"#,
            ),
            &mut usage,
        );
        assert_eq!(events, vec![StreamEvent::Delta { text: "Hi".into() }]);
        assert_eq!(usage, Usage::default());
    }

    #[test]
    fn test_usage_chunk_records_usage() {
        let mut usage = Usage::default();
        let events = chunk_deltas(
            chunk(
                r#"{"id":"c1","object":"chat.completion.chunk","created":1,"model":"gpt-4o","choices":[],"usage":{"prompt_tokens":9,"completion_tokens":4,"total_tokens":13}}"#,
            ),
            &mut usage,
        );
        assert!(events.is_empty());
        assert_eq!(
            usage,
            Usage {
                input_tokens: 9,
                output_tokens: 4
            }
        );
    }
}
