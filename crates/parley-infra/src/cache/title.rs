//! In-process title cache with per-entry expiry.
//!
//! Entries are keyed by `(user_id, conversation_id)` and removed on read.
//! Expired entries are dropped lazily on access and by [`MemoryTitleCache::purge_expired`].

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parley_core::title::cache::TitleCache;
use parley_types::error::CacheError;
use tracing::debug;
use uuid::Uuid;

struct CachedTitle {
    title: String,
    expires_at: Instant,
}

/// `TitleCache` backed by a concurrent map.
#[derive(Default)]
pub struct MemoryTitleCache {
    entries: DashMap<(String, Uuid), CachedTitle>,
}

impl MemoryTitleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "purged expired titles");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TitleCache for MemoryTitleCache {
    async fn put(&self, user_id: &str, conversation_id: &Uuid, title: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            (user_id.to_string(), *conversation_id),
            CachedTitle {
                title: title.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn take(&self, user_id: &str, conversation_id: &Uuid) -> Result<Option<String>, CacheError> {
        let Some((_, entry)) = self.entries.remove(&(user_id.to_string(), *conversation_id)) else {
            return Ok(None);
        };
        if entry.expires_at <= Instant::now() {
            debug!(%conversation_id, "cached title expired");
            return Ok(None);
        }
        Ok(Some(entry.title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_take_removes_entry() {
        let cache = MemoryTitleCache::new();
        let convo = Uuid::now_v7();
        cache.put("u1", &convo, "Trip", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.take("u2", &convo).await.unwrap(), None);
        assert_eq!(cache.take("u1", &convo).await.unwrap().as_deref(), Some("Trip"));
        assert_eq!(cache.take("u1", &convo).await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_returned() {
        let cache = MemoryTitleCache::new();
        let convo = Uuid::now_v7();
        cache.put("u1", &convo, "Old", Duration::ZERO).await.unwrap();
        assert_eq!(cache.take("u1", &convo).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryTitleCache::new();
        cache.put("u1", &Uuid::now_v7(), "gone", Duration::ZERO).await.unwrap();
        cache.put("u1", &Uuid::now_v7(), "kept", Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let cache = MemoryTitleCache::new();
        let convo = Uuid::now_v7();
        cache.put("u1", &convo, "first", Duration::from_secs(60)).await.unwrap();
        cache.put("u1", &convo, "second", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.take("u1", &convo).await.unwrap().as_deref(), Some("second"));
    }
}
