//! Title handoff endpoint.
//!
//! POST /api/convos/gen_title
//!
//! Collects the title generated in the background for a new conversation.
//! The title is served once; later calls return 404.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthenticatedUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenTitleRequest {
    pub conversation_id: String,
}

/// POST /api/convos/gen_title
pub async fn gen_title(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<GenTitleRequest>,
) -> Result<Response, AppError> {
    let conversation_id = Uuid::parse_str(body.conversation_id.trim())
        .map_err(|_| AppError::Validation(format!("invalid conversationId: '{}'", body.conversation_id)))?;

    let response = match state.orchestrator.poll_title(&user.user_id, &conversation_id).await {
        Ok(title) => (StatusCode::OK, Json(json!({ "title": title }))).into_response(),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": format!("{e} for conversation {conversation_id}") })),
        )
            .into_response(),
    };
    Ok(response)
}
