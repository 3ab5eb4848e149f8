//! Streaming conversation core and port definitions for Parley.
//!
//! This crate defines the "ports" (repository, cache and attachment traits)
//! that the infrastructure layer implements, the provider abstraction, and the
//! orchestration logic that ties them together. It depends only on
//! `parley-types` -- never on `parley-infra` or any database/IO crate.

pub mod chat;
pub mod llm;
pub mod spec;
pub mod title;
