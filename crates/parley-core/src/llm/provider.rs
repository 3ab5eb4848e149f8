//! LlmProvider trait definition.
//!
//! This is the core abstraction that all LLM providers implement.
//! Uses RPITIT for `complete`, and `Pin<Box<dyn Stream>>` for `stream`
//! (streams need to be object-safe for the BoxLlmProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use parley_types::llm::{CompletionRequest, CompletionResponse, LlmError, ProviderType, StreamEvent};

/// A live, non-restartable sequence of normalized provider events.
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Trait for LLM provider backends (Anthropic, OpenAI-compatible).
///
/// Implementations live in parley-infra. A well-behaved `stream` yields zero
/// or more `Delta` events and then exactly one `Done`, or ends early with a
/// single `Err`. Dropping the stream aborts the underlying HTTP call.
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "anthropic", "mistral").
    fn name(&self) -> &str;

    fn provider_type(&self) -> ProviderType;

    /// Model used for background calls when the caller has none in mind.
    fn default_model(&self) -> Option<&str>;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    fn stream(&self, request: CompletionRequest) -> LlmStream;
}
