//! Infrastructure layer for Parley.
//!
//! Implementations of the traits defined in `parley-core`: SQLite storage,
//! provider adapters, the in-process title cache, the filesystem attachment
//! store, and the configuration loader.

pub mod cache;
pub mod config;
pub mod files;
pub mod llm;
pub mod sqlite;
