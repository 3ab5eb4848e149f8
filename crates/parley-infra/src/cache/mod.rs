//! Ephemeral caches.

pub mod title;
