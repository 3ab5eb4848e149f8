//! Shared domain types for Parley.
//!
//! This crate contains the core domain types used across the Parley backend:
//! conversations, branching messages, model specs, the client request and
//! server envelope wire shapes, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod attachment;
pub mod config;
pub mod conversation;
pub mod envelope;
pub mod error;
pub mod llm;
pub mod message;
pub mod request;
pub mod spec;
