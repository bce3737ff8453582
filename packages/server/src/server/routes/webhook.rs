use axum::{extract::Extension, Json};

use crate::kernel::{MessageEnvelope, ResponseEnvelope};
use crate::server::app::AppState;

/// Agent webhook endpoint.
///
/// Always answers 200 with one response envelope per event; per-event
/// failures travel as `error` messages inside the body. Structural request
/// errors (malformed JSON) are rejected by the extractor before we get here.
pub async fn webhook_handler(
    Extension(state): Extension<AppState>,
    Json(envelope): Json<MessageEnvelope>,
) -> Json<Vec<ResponseEnvelope>> {
    Json(state.orchestrator.process_envelope(envelope).await)
}
