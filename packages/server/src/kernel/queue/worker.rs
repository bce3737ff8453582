//! Worker pool that drains the job queue.
//!
//! Each worker repeatedly dequeues and invokes the handler registered for
//! the job's type; a missing handler is a job failure, never a worker crash.
//! Shutdown waits (bounded) for in-flight work; jobs still queued are left
//! untouched and terminal stats are published.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::queue::JobQueue;
use super::QueuedJob;
use crate::kernel::event_bus::EventBus;

pub const TOPIC_WORKER_STARTED: &str = "queue/worker/started";
pub const TOPIC_WORKER_STOPPED: &str = "queue/worker/stopped";

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    /// How long an idle worker waits for a job before re-checking shutdown.
    pub poll_timeout: Duration,
    /// Bounded wait for in-flight handlers during shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            poll_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Pool of workers executing queue jobs.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    bus: EventBus,
    config: WorkerPoolConfig,
    shutdown: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(queue: Arc<JobQueue>, bus: EventBus) -> Self {
        Self::with_config(queue, bus, WorkerPoolConfig::default())
    }

    pub fn with_config(queue: Arc<JobQueue>, bus: EventBus, config: WorkerPoolConfig) -> Self {
        Self {
            queue,
            bus,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the workers. Safe to call once; later calls are no-ops.
    pub fn start(&self) {
        let mut handles = self.handles.lock().expect("worker pool lock poisoned");
        if !handles.is_empty() {
            return;
        }

        for i in 0..self.config.worker_count {
            let queue = self.queue.clone();
            let shutdown = self.shutdown.clone();
            let poll_timeout = self.config.poll_timeout;
            let worker_id = format!("worker-{i}");

            handles.push(tokio::spawn(async move {
                debug!(worker_id, "worker started");
                while !shutdown.load(Ordering::SeqCst) {
                    let Some(job) = queue.dequeue(poll_timeout).await else {
                        continue;
                    };
                    execute_job(&queue, job).await;
                }
                debug!(worker_id, "worker stopped");
            }));
        }

        info!(worker_count = self.config.worker_count, "worker pool started");
        let _ = self.bus.publish(
            TOPIC_WORKER_STARTED,
            json!({ "worker_count": self.config.worker_count }),
            Some("WorkerPool"),
        );
    }

    /// Stop the pool: waits (bounded) for running handlers, leaves queued
    /// jobs where they are, and publishes terminal stats.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().expect("worker pool lock poisoned");
            guard.drain(..).collect()
        };
        let all = futures::future::join_all(handles);
        if tokio::time::timeout(self.config.shutdown_timeout, all)
            .await
            .is_err()
        {
            warn!("worker pool did not drain within the shutdown timeout");
        }

        let stats = self.queue.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            dead = stats.dead,
            "worker pool stopped"
        );
        let _ = self.bus.publish(
            TOPIC_WORKER_STOPPED,
            serde_json::to_value(&stats).unwrap_or_default(),
            Some("WorkerPool"),
        );
    }
}

async fn execute_job(queue: &JobQueue, job: QueuedJob) {
    let Some(handler) = queue.handler(&job.job_type) else {
        queue.fail(
            job.id,
            &format!("no handler registered for job type: {}", job.job_type),
        );
        return;
    };

    let job_id = job.id;
    match handler(job).await {
        Ok(result) => queue.complete(job_id, Some(result)),
        Err(e) => queue.fail(job_id, &format!("{e:#}")),
    }
}
