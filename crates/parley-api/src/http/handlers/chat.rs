//! SSE streaming endpoints.
//!
//! - `POST /api/ask` sends a new user message
//! - `POST /api/edit` edits a message and regenerates the reply
//!
//! Both return a stream of named SSE events, one per [`ServerEnvelope`]:
//! `created`, then `message` (deltas, then the final record), or `error`.
//! Failures before the stream opens are plain JSON errors.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::StreamExt;
use serde_json::json;
use tokio_stream::Stream;
use tracing::error;

use parley_core::chat::orchestrator::EnvelopeStream;
use parley_types::envelope::ServerEnvelope;
use parley_types::request::AskRequest;

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthenticatedUser;
use crate::state::AppState;

/// Interval of SSE keep-alive comments.
const KEEP_ALIVE: Duration = Duration::from_secs(15);

/// POST /api/ask
pub async fn ask(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let envelopes = state.orchestrator.ask(&user.user_id, body).await?;
    Ok(into_sse(envelopes))
}

/// POST /api/edit
pub async fn edit(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<AskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let envelopes = state.orchestrator.edit(&user.user_id, body).await?;
    Ok(into_sse(envelopes))
}

fn into_sse(envelopes: EnvelopeStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = envelopes.map(|envelope| Ok(to_event(&envelope)));
    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
}

/// Render one envelope as a named SSE event.
pub(crate) fn to_event(envelope: &ServerEnvelope) -> Event {
    match envelope.to_json() {
        Ok(data) => Event::default().event(envelope.event_name()).data(data),
        Err(e) => {
            error!(event = envelope.event_name(), error = %e, "failed to serialize envelope");
            let data = json!({ "error": true, "text": "failed to serialize server event" });
            Event::default().event("error").data(data.to_string())
        }
    }
}
