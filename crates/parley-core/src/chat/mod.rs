//! The streaming conversation core.
//!
//! - `repository`: persistence ports for conversations and the message tree
//! - `edit`: edit-target classification over the message tree
//! - `emitter`: normalized provider events to wire envelopes
//! - `session`: per-request streaming state
//! - `orchestrator`: the end-to-end ask/edit flow

pub mod attachments;
pub mod edit;
pub mod emitter;
pub mod orchestrator;
pub mod repository;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
