//! Shared test harness: in-memory store plus fully wired hub components.
#![allow(dead_code)]

pub mod fixtures;

use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use server_core::domains::orders::{OrderBuilder, OrderService};
use server_core::kernel::{
    ClientRegistry, ErrorHub, EventBus, MessageOrchestrator,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Fresh in-memory database with migrations applied.
///
/// A single pooled connection keeps every query on the same in-memory
/// database instance.
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid sqlite url")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("failed to open in-memory database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations failed");
    pool
}

/// Fully wired hub over a fresh store, with a seeded RNG so payload
/// randomisation is reproducible.
pub struct TestHub {
    pub pool: SqlitePool,
    pub bus: EventBus,
    pub clients: ClientRegistry,
    pub orders: Arc<OrderService>,
    pub orchestrator: MessageOrchestrator,
}

pub async fn test_hub() -> TestHub {
    test_hub_with_seed(7).await
}

pub async fn test_hub_with_seed(seed: u64) -> TestHub {
    let pool = test_pool().await;
    let bus = EventBus::new();
    let clients = ClientRegistry::new(bus.clone());
    let errors = ErrorHub::new(bus.clone());
    let builder = Arc::new(OrderBuilder::with_rng(
        pool.clone(),
        bus.clone(),
        StdRng::seed_from_u64(seed),
    ));
    let orders = Arc::new(OrderService::new(pool.clone(), bus.clone(), builder));
    let orchestrator = MessageOrchestrator::new(
        pool.clone(),
        bus.clone(),
        clients.clone(),
        errors,
        orders.clone(),
    );
    TestHub {
        pool,
        bus,
        clients,
        orders,
        orchestrator,
    }
}
