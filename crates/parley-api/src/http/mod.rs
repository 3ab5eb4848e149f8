//! HTTP API layer for Parley.
//!
//! Axum routes under `/api/` with API key authentication and SSE streaming.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod router;
