use thiserror::Error;

use crate::llm::LlmError;

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by the conversation core.
///
/// Everything except `Provider` is raised before the stream starts and becomes
/// a synchronous HTTP error. `Provider` only ever reaches the client through
/// the error envelope.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Provider(#[from] LlmError),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl ChatError {
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "validation",
            ChatError::NotFound(_) => "not_found",
            ChatError::Conflict(_) => "conflict",
            ChatError::Provider(_) => "provider",
            ChatError::Persistence(_) => "persistence",
        }
    }
}

impl From<RepositoryError> for ChatError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => ChatError::NotFound(err.to_string()),
            RepositoryError::Conflict(msg) => ChatError::Conflict(msg),
            other => ChatError::Persistence(other.to_string()),
        }
    }
}

/// Errors from the attachment store port.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("unsupported file type: {0}")]
    Unsupported(String),

    #[error("io error: {0}")]
    Io(String),
}

/// Errors from the title cache port.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Read side of the title handoff.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TitleError {
    #[error("title not ready")]
    NotReady,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_mapping() {
        assert!(matches!(
            ChatError::from(RepositoryError::NotFound),
            ChatError::NotFound(_)
        ));
        assert!(matches!(
            ChatError::from(RepositoryError::Conflict("dup".into())),
            ChatError::Conflict(m) if m == "dup"
        ));
        assert!(matches!(
            ChatError::from(RepositoryError::Query("locked".into())),
            ChatError::Persistence(_)
        ));
        assert_eq!(ChatError::from(RepositoryError::Connection).kind(), "persistence");
    }

    #[test]
    fn test_provider_error_is_transparent() {
        let err = ChatError::from(LlmError::AuthenticationFailed("bad key".into()));
        assert_eq!(err.to_string(), "authentication failed: bad key");
        assert_eq!(err.kind(), "provider");
    }
}
