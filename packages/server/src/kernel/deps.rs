// ServerDeps - core infrastructure with all shared dependencies
//
// Holds the store pool, event bus, registries and queue. Everything that
// used to be a module-level singleton in older revisions is injected from
// the composition root instead.

use std::path::PathBuf;
use std::sync::Arc;

use sqlx::SqlitePool;

use super::clients::ClientRegistry;
use super::errors::ErrorHub;
use super::event_bus::EventBus;
use super::queue::JobQueue;

/// Shared server dependencies
pub struct ServerDeps {
    pub db_pool: SqlitePool,
    /// Shared event bus for all components
    pub bus: EventBus,
    /// Liveness registry for connected agents
    pub clients: ClientRegistry,
    /// Central error sink
    pub errors: ErrorHub,
    /// Background job queue
    pub queue: Arc<JobQueue>,
    /// Root directory for media files
    pub media_root: PathBuf,
}

impl ServerDeps {
    /// Creates a new ServerDeps with the given pool and media root,
    /// wiring the bus into every bus-aware component.
    pub fn new(db_pool: SqlitePool, media_root: PathBuf) -> Self {
        let bus = EventBus::new();
        let clients = ClientRegistry::new(bus.clone());
        let errors = ErrorHub::new(bus.clone());
        let queue = Arc::new(JobQueue::new(bus.clone()));
        Self {
            db_pool,
            bus,
            clients,
            errors,
            queue,
            media_root,
        }
    }
}
