//! Conversation management endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthenticatedUser;
use crate::state::AppState;

/// DELETE /api/convos/{id}
///
/// Removes the conversation and every message in it.
pub async fn delete_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let conversation_id =
        Uuid::parse_str(&id).map_err(|_| AppError::Validation(format!("invalid conversation id: '{id}'")))?;

    state
        .orchestrator
        .delete_conversation(&user.user_id, &conversation_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
