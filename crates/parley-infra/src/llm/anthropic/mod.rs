//! Anthropic Claude provider: the Messages API with SSE streaming.

pub mod client;
pub mod streaming;
pub mod types;

pub use client::AnthropicProvider;
