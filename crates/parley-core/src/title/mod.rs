//! Conversation title generation and the cache handoff.
//!
//! Titles are produced by a background task after the first exchange of a new
//! conversation and parked in a short-lived cache. A later client request
//! collects them with [`task::poll_title`].

pub mod cache;
pub mod generate;
pub mod task;
