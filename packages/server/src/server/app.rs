//! Application setup and server configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use serde_json::json;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domains::accounts::ClientAccount;
use crate::domains::orders::{OrderBuilder, OrderService};
use crate::kernel::{
    MessageOrchestrator, ServerDeps, WorkerPool, WorkerPoolConfig,
};
use crate::server::routes::{
    clients_handler, confirm_handler, errors_handler, health_handler, heartbeat_handler,
    queue_stats_handler, report_handler, video_base64_handler, video_handler, webhook_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
    pub orchestrator: Arc<MessageOrchestrator>,
    pub orders: Arc<OrderService>,
}

/// Build the axum application router.
///
/// Wires the composition root: bus, registries, order services, queue
/// handlers and the worker pool. Returns the router plus the deps and pool
/// handles needed for graceful shutdown.
pub async fn build_app(
    pool: SqlitePool,
    media_root: PathBuf,
    worker_count: usize,
) -> (Router, Arc<ServerDeps>, Arc<WorkerPool>) {
    let deps = Arc::new(ServerDeps::new(pool.clone(), media_root));
    deps.bus.start_async_worker();

    let builder = Arc::new(OrderBuilder::new(pool.clone(), deps.bus.clone()));
    let orders = Arc::new(OrderService::new(
        pool.clone(),
        deps.bus.clone(),
        builder.clone(),
    ));
    let orchestrator = Arc::new(MessageOrchestrator::new(
        pool.clone(),
        deps.bus.clone(),
        deps.clients.clone(),
        deps.errors.clone(),
        orders.clone(),
    ));

    // Non-webhook order generation goes through the queue
    let job_builder = builder.clone();
    let job_pool = pool.clone();
    deps.queue.register_handler("generate_order", move |job| {
        let builder = job_builder.clone();
        let pool = job_pool.clone();
        async move {
            let client_code = job.payload["client_code"]
                .as_str()
                .ok_or_else(|| anyhow!("generate_order payload is missing client_code"))?
                .to_string();
            let quantity = job.payload["quantity"].as_u64().unwrap_or(10).max(1) as u32;
            let prod_code = job.payload["prod_code"].as_str().map(str::to_string);

            let Some(client) = ClientAccount::find_by_code(&client_code, &pool).await? else {
                bail!("client not found: {client_code}");
            };
            match builder
                .create_order(&client_code, client.platform, quantity, prod_code.as_deref())
                .await
            {
                Some(order) => Ok(json!({
                    "order_id": order.order_id,
                    "item_count": order.items.len(),
                })),
                None => Ok(json!({ "order_id": null, "item_count": 0 })),
            }
        }
    });

    let workers = Arc::new(WorkerPool::with_config(
        deps.queue.clone(),
        deps.bus.clone(),
        WorkerPoolConfig {
            worker_count,
            ..Default::default()
        },
    ));
    workers.start();

    let app_state = AppState {
        deps: deps.clone(),
        orchestrator,
        orders,
    };

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    let router = Router::new()
        // Agent protocol
        .route("/webhook", post(webhook_handler))
        .route("/api/bot/confirm/:job_id", get(confirm_handler))
        .route("/api/bot/report", post(report_handler))
        .route("/api/bot/heartbeat", post(heartbeat_handler))
        // Media delivery
        .route("/api/video/:file_hash", get(video_handler))
        .route("/api/bot/video/:file_hash", get(video_base64_handler))
        // Operator views
        .route("/api/clients", get(clients_handler))
        .route("/api/queue/stats", get(queue_stats_handler))
        .route("/api/errors", get(errors_handler))
        // Health check
        .route("/health", get(health_handler))
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    (router, deps, workers)
}
