//! Read-only operator views over registries and queues.

use axum::{extract::Extension, Json};

use crate::kernel::{ClientStatus, ErrorRecord};
use crate::kernel::queue::QueueStats;
use crate::server::app::AppState;

/// Snapshot of every tracked agent.
pub async fn clients_handler(Extension(state): Extension<AppState>) -> Json<Vec<ClientStatus>> {
    Json(state.deps.clients.statuses())
}

/// Queue and dead-letter statistics.
pub async fn queue_stats_handler(Extension(state): Extension<AppState>) -> Json<QueueStats> {
    Json(state.deps.queue.stats())
}

/// Recent error records, newest last.
pub async fn errors_handler(Extension(state): Extension<AppState>) -> Json<Vec<ErrorRecord>> {
    Json(state.deps.errors.history(None, None, false, 100))
}
