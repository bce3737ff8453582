//! Background job queue: priority ordering, retry with backoff, dead-letter
//! bucket and a worker pool that dispatches to registered handlers.
//!
//! This queue is in-memory and deliberately separate from the agent-facing
//! order items: it serves importers and other non-webhook paths.

pub mod job;
pub mod queue;
pub mod worker;

pub use job::{JobPriority, QueueJobStatus, QueuedJob};
pub use queue::{JobQueue, QueueStats};
pub use worker::{WorkerPool, WorkerPoolConfig};
