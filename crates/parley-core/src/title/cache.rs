//! TitleCache trait definition.

use std::time::Duration;

use parley_types::error::CacheError;
use uuid::Uuid;

/// Key-value cache with per-entry TTL, keyed by `(user_id, conversation_id)`.
///
/// Reads are take-once: a successful `take` removes the entry.
pub trait TitleCache: Send + Sync {
    fn put(
        &self,
        user_id: &str,
        conversation_id: &Uuid,
        title: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), CacheError>> + Send;

    fn take(
        &self,
        user_id: &str,
        conversation_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<String>, CacheError>> + Send;
}
