//! Auxiliary bot endpoints outside the webhook batch protocol.

use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domains::accounts::ClientAccount;
use crate::domains::orders::ReportedOutcome;
use crate::kernel::clients::TOPIC_CLIENT_HEARTBEAT;
use crate::server::app::AppState;

/// Pre-flight "can I post?" check for a job.
pub async fn confirm_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<i64>,
) -> Json<Value> {
    match state.orders.confirm(job_id).await {
        Ok(confirmation) => Json(json!({
            "can_post": confirmation.can_post,
            "reason": confirmation.reason,
        })),
        Err(e) => Json(json!({ "can_post": false, "reason": format!("{e:#}") })),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub job_id: i64,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub log: Option<String>,
}

/// Job outcome report outside the webhook protocol.
pub async fn report_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<ReportRequest>,
) -> Json<Value> {
    let outcome = ReportedOutcome::parse(request.status.as_deref().unwrap_or("done"));
    let result = state
        .orders
        .report(
            request.job_id,
            outcome,
            request.external_id.as_deref(),
            request.external_url.as_deref(),
            request.log.as_deref(),
        )
        .await;

    match result {
        Ok(report) => Json(json!({
            "success": true,
            "job_id": report.job_id,
            "status": report.outcome,
            "order_completed": report.order_completed,
        })),
        Err(e) => Json(json!({ "success": false, "error": format!("{e:#}") })),
    }
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub client_code: String,
}

/// Registry refresh for agents that ping outside the webhook protocol.
pub async fn heartbeat_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> Json<Value> {
    let platform = match ClientAccount::find_by_code(&request.client_code, &state.deps.db_pool).await
    {
        Ok(Some(client)) => client.platform.as_str().to_string(),
        _ => "unknown".to_string(),
    };
    state.deps.clients.touch(&request.client_code, &platform);
    let _ = ClientAccount::touch_last_seen(&request.client_code, &state.deps.db_pool).await;
    let _ = state.deps.bus.publish(
        TOPIC_CLIENT_HEARTBEAT,
        json!({
            "client_code": request.client_code,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }),
        Some("heartbeat_handler"),
    );
    Json(json!({ "status": "ok" }))
}
