//! API key authentication extractor.
//!
//! Extracts and verifies API keys from:
//! - `Authorization: Bearer <key>` header
//! - `X-API-Key: <key>` header
//!
//! Keys are SHA-256 hashed and looked up in the `api_keys` table, which maps
//! each key to a stable user id.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

use parley_infra::sqlite::pool::DatabasePool;

use crate::http::error::AppError;
use crate::state::AppState;

/// Prefix of every minted key.
pub const KEY_PREFIX: &str = "pk_";

/// The user behind a verified API key.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let api_key = extract_api_key(parts)?;

        match resolve_user(&state.db_pool, &api_key).await? {
            Some(user_id) => Ok(AuthenticatedUser { user_id }),
            None => Err(AppError::Unauthorized(
                "Invalid API key. Provide a valid key via 'Authorization: Bearer <key>' or 'X-API-Key: <key>' header.".to_string(),
            )),
        }
    }
}

/// Extract the API key from request headers.
fn extract_api_key(parts: &Parts) -> Result<String, AppError> {
    if let Some(auth) = parts.headers.get("authorization") {
        let auth_str = auth.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".to_string())
        })?;
        if let Some(key) = auth_str.strip_prefix("Bearer ") {
            return Ok(key.trim().to_string());
        }
    }

    if let Some(key) = parts.headers.get("x-api-key") {
        let key_str = key
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid X-API-Key header encoding".to_string()))?;
        return Ok(key_str.trim().to_string());
    }

    Err(AppError::Unauthorized(
        "Missing API key. Provide via 'Authorization: Bearer <key>' or 'X-API-Key: <key>' header.".to_string(),
    ))
}

/// Compute SHA-256 hash of an API key (lowercase hex).
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{:x}", digest)
}

/// Look up the user owning `api_key`.
///
/// Updates `last_used_at` on a hit, best effort.
pub async fn resolve_user(pool: &DatabasePool, api_key: &str) -> Result<Option<String>, AppError> {
    let key_hash = hash_api_key(api_key);

    let row: Option<(String, String)> =
        sqlx::query_as("SELECT id, user_id FROM api_keys WHERE key_hash = ?")
            .bind(&key_hash)
            .fetch_optional(&pool.reader)
            .await
            .map_err(|e| AppError::Internal(format!("Database error: {e}")))?;

    let Some((id, user_id)) = row else {
        return Ok(None);
    };

    let now = chrono::Utc::now().to_rfc3339();
    if let Err(e) = sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
        .bind(&now)
        .bind(&id)
        .execute(&pool.writer)
        .await
    {
        debug!(error = %e, "failed to record api key use");
    }

    Ok(Some(user_id))
}

/// Mint a new key for `user_id` and store its hash.
///
/// Returns the plaintext key; it is not recoverable afterwards.
pub async fn create_api_key(pool: &DatabasePool, user_id: &str, name: &str) -> anyhow::Result<String> {
    let mut key_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key_bytes);
    let plaintext_key = format!(
        "{KEY_PREFIX}{}",
        key_bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
    );

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query("INSERT INTO api_keys (id, key_hash, user_id, name, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&id)
        .bind(hash_api_key(&plaintext_key))
        .bind(user_id)
        .bind(name)
        .bind(&now)
        .execute(&pool.writer)
        .await?;

    Ok(plaintext_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use parley_infra::sqlite::pool::database_url;

    fn parts(header: (&str, &str)) -> Parts {
        let (parts, _) = Request::builder()
            .header(header.0, header.1)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let url = database_url(dir.path());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    #[test]
    fn test_extract_bearer_and_header() {
        assert_eq!(
            extract_api_key(&parts(("authorization", "Bearer pk_abc "))).unwrap(),
            "pk_abc"
        );
        assert_eq!(extract_api_key(&parts(("x-api-key", "pk_def"))).unwrap(), "pk_def");
        assert!(matches!(
            extract_api_key(&parts(("accept", "text/event-stream"))),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = hash_api_key("pk_test");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, hash_api_key("pk_test"));
    }

    #[tokio::test]
    async fn test_created_key_resolves_to_user() {
        let pool = test_pool().await;
        let key = create_api_key(&pool, "user-1", "laptop").await.unwrap();
        assert!(key.starts_with(KEY_PREFIX));
        assert_eq!(key.len(), KEY_PREFIX.len() + 64);

        let user = resolve_user(&pool, &key).await.unwrap();
        assert_eq!(user.as_deref(), Some("user-1"));

        let (last_used,): (Option<String>,) =
            sqlx::query_as("SELECT last_used_at FROM api_keys WHERE user_id = 'user-1'")
                .fetch_one(&pool.reader)
                .await
                .unwrap();
        assert!(last_used.is_some());
    }

    #[tokio::test]
    async fn test_unknown_key_is_rejected() {
        let pool = test_pool().await;
        assert_eq!(resolve_user(&pool, "pk_nope").await.unwrap(), None);
    }
}
