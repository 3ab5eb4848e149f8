//! LLM provider abstractions for Parley.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch
//! - `ProviderRegistry`: providers keyed by their closed `ProviderType`

pub mod box_provider;
pub mod provider;
pub mod registry;
