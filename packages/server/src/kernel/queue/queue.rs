//! Priority job queue with retry and dead-letter handling.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::{JobPriority, QueueJobStatus, QueuedJob};
use crate::kernel::event_bus::EventBus;

pub const TOPIC_JOB_ENQUEUED: &str = "queue/job/enqueued";
pub const TOPIC_JOB_STARTED: &str = "queue/job/started";
pub const TOPIC_JOB_COMPLETED: &str = "queue/job/completed";
pub const TOPIC_JOB_FAILED: &str = "queue/job/failed";
pub const TOPIC_JOB_DEAD: &str = "queue/job/dead";

/// Type-erased async handler; the job is handed in by value.
type BoxedHandler = Arc<
    dyn Fn(QueuedJob) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send>>
        + Send
        + Sync,
>;

/// Heap entry: ordered by (priority rank, insertion sequence), so equal
/// priorities dequeue FIFO.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    rank: u8,
    seq: u64,
    id: Uuid,
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Reverse<QueueEntry>>,
    jobs: HashMap<Uuid, QueuedJob>,
    dead_letter: Vec<Uuid>,
    seq: u64,
}

/// Queue statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead: u64,
    pub queue_size: usize,
    pub dead_letter_size: usize,
    pub registered_handlers: Vec<String>,
}

/// Priority-then-FIFO work queue with typed handler registry.
pub struct JobQueue {
    state: Mutex<QueueState>,
    handlers: RwLock<HashMap<String, BoxedHandler>>,
    notify: Notify,
    enqueued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dead: AtomicU64,
    bus: EventBus,
}

impl JobQueue {
    pub fn new(bus: EventBus) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            handlers: RwLock::new(HashMap::new()),
            notify: Notify::new(),
            enqueued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dead: AtomicU64::new(0),
            bus,
        }
    }

    /// Add a job to the queue.
    pub fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        priority: JobPriority,
        max_attempts: u32,
    ) -> QueuedJob {
        let job = QueuedJob::builder()
            .job_type(job_type)
            .payload(payload)
            .priority(priority)
            .max_attempts(max_attempts)
            .build();

        {
            let mut state = self.state.lock().expect("queue lock poisoned");
            state.seq += 1;
            let entry = QueueEntry {
                rank: priority.rank(),
                seq: state.seq,
                id: job.id,
            };
            state.heap.push(Reverse(entry));
            state.jobs.insert(job.id, job.clone());
        }
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();

        let _ = self
            .bus
            .publish(TOPIC_JOB_ENQUEUED, job.to_event_payload(), Some("JobQueue"));
        debug!(job_id = %job.id, job_type, "job enqueued");

        job
    }

    /// Take the next job, waiting up to `timeout` for one to arrive.
    ///
    /// The returned job is already marked `processing` with its attempt
    /// counter bumped.
    pub async fn dequeue(&self, timeout: Duration) -> Option<QueuedJob> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = self.try_dequeue() {
                return Some(job);
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return self.try_dequeue();
            }
        }
    }

    fn try_dequeue(&self) -> Option<QueuedJob> {
        let job = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            let Reverse(entry) = state.heap.pop()?;
            let job = state.jobs.get_mut(&entry.id)?;
            job.status = QueueJobStatus::Processing;
            job.attempt_count += 1;
            job.clone()
        };

        let _ = self
            .bus
            .publish(TOPIC_JOB_STARTED, job.to_event_payload(), Some("JobQueue"));
        Some(job)
    }

    /// Mark a job as completed.
    pub fn complete(&self, job_id: Uuid, result: Option<serde_json::Value>) {
        let job = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            let Some(job) = state.jobs.get_mut(&job_id) else {
                return;
            };
            job.status = QueueJobStatus::Completed;
            job.clone()
        };
        self.completed.fetch_add(1, Ordering::Relaxed);

        let mut payload = job.to_event_payload();
        payload["result"] = result.unwrap_or(serde_json::Value::Null);
        let _ = self.bus.publish(TOPIC_JOB_COMPLETED, payload, Some("JobQueue"));
        info!(job_id = %job_id, "job completed");
    }

    /// Mark a job as failed.
    ///
    /// Re-enqueues while attempts remain (recording the intended exponential
    /// backoff), otherwise moves the job to the dead-letter bucket.
    pub fn fail(&self, job_id: Uuid, error_message: &str) {
        enum Outcome {
            Retried { job: QueuedJob, backoff_secs: u64 },
            Dead(QueuedJob),
        }

        let outcome = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            let Some(job) = state.jobs.get_mut(&job_id) else {
                return;
            };
            job.error = error_message.to_string();

            if job.attempt_count < job.max_attempts {
                let backoff_secs = 2u64.saturating_pow(job.attempt_count);
                job.status = QueueJobStatus::Pending;
                job.retry_delay_secs = Some(backoff_secs);
                let snapshot = job.clone();

                state.seq += 1;
                let entry = QueueEntry {
                    rank: snapshot.priority.rank(),
                    seq: state.seq,
                    id: job_id,
                };
                state.heap.push(Reverse(entry));
                Outcome::Retried {
                    job: snapshot,
                    backoff_secs,
                }
            } else {
                job.status = QueueJobStatus::Dead;
                let snapshot = job.clone();
                state.dead_letter.push(job_id);
                Outcome::Dead(snapshot)
            }
        };
        self.failed.fetch_add(1, Ordering::Relaxed);

        match outcome {
            Outcome::Retried { job, backoff_secs } => {
                self.notify.notify_one();
                warn!(
                    job_id = %job_id,
                    attempt = job.attempt_count,
                    backoff_secs,
                    "job failed, retrying: {error_message}"
                );
                let mut payload = job.to_event_payload();
                payload["retry_in_secs"] = json!(backoff_secs);
                let _ = self.bus.publish(TOPIC_JOB_FAILED, payload, Some("JobQueue"));
            }
            Outcome::Dead(job) => {
                self.dead.fetch_add(1, Ordering::Relaxed);
                error!(job_id = %job_id, "job moved to dead letter: {error_message}");
                let _ = self
                    .bus
                    .publish(TOPIC_JOB_DEAD, job.to_event_payload(), Some("JobQueue"));
            }
        }
    }

    /// Register the handler for a job type. At most one handler per type;
    /// registering again replaces the previous one.
    pub fn register_handler<F, Fut>(&self, job_type: &str, handler: F)
    where
        F: Fn(QueuedJob) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let boxed: BoxedHandler = Arc::new(move |job| Box::pin(handler(job)));
        self.handlers
            .write()
            .expect("handler lock poisoned")
            .insert(job_type.to_string(), boxed);
        debug!(job_type, "handler registered");
    }

    pub(crate) fn handler(&self, job_type: &str) -> Option<BoxedHandler> {
        self.handlers
            .read()
            .expect("handler lock poisoned")
            .get(job_type)
            .cloned()
    }

    pub fn get_job(&self, job_id: Uuid) -> Option<QueuedJob> {
        self.state
            .lock()
            .expect("queue lock poisoned")
            .jobs
            .get(&job_id)
            .cloned()
    }

    pub fn queue_size(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").heap.len()
    }

    pub fn dead_letter_jobs(&self) -> Vec<QueuedJob> {
        let state = self.state.lock().expect("queue lock poisoned");
        state
            .dead_letter
            .iter()
            .filter_map(|id| state.jobs.get(id).cloned())
            .collect()
    }

    pub fn clear_dead_letter(&self) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        let count = state.dead_letter.len();
        state.dead_letter.clear();
        info!(count, "cleared dead letter jobs");
    }

    pub fn stats(&self) -> QueueStats {
        let handlers = self
            .handlers
            .read()
            .expect("handler lock poisoned")
            .keys()
            .cloned()
            .collect();
        let state = self.state.lock().expect("queue lock poisoned");
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dead: self.dead.load(Ordering::Relaxed),
            queue_size: state.heap.len(),
            dead_letter_size: state.dead_letter.len(),
            registered_handlers: handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> JobQueue {
        JobQueue::new(EventBus::new())
    }

    #[tokio::test]
    async fn priority_then_fifo_ordering() {
        let q = queue();
        for priority in [
            JobPriority::Normal,
            JobPriority::High,
            JobPriority::Normal,
            JobPriority::Low,
            JobPriority::High,
        ] {
            q.enqueue("t", json!({}), priority, 3);
        }

        let mut ranks = Vec::new();
        while let Some(job) = q.dequeue(Duration::from_millis(10)).await {
            ranks.push(job.priority.rank());
        }
        assert_eq!(ranks, vec![1, 1, 5, 5, 10]);
    }

    #[tokio::test]
    async fn equal_priority_is_fifo() {
        let q = queue();
        let first = q.enqueue("t", json!({"n": 1}), JobPriority::Normal, 3);
        let second = q.enqueue("t", json!({"n": 2}), JobPriority::Normal, 3);

        assert_eq!(q.dequeue(Duration::from_millis(10)).await.unwrap().id, first.id);
        assert_eq!(q.dequeue(Duration::from_millis(10)).await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn dequeue_times_out_on_empty_queue() {
        let q = queue();
        assert!(q.dequeue(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn dequeue_marks_processing_and_counts_attempts() {
        let q = queue();
        q.enqueue("t", json!({}), JobPriority::Normal, 3);

        let job = q.dequeue(Duration::from_millis(10)).await.unwrap();
        assert_eq!(job.status, QueueJobStatus::Processing);
        assert_eq!(job.attempt_count, 1);
    }

    #[tokio::test]
    async fn failure_retries_until_dead_letter() {
        let q = queue();
        let job = q.enqueue("t", json!({}), JobPriority::Normal, 3);

        for attempt in 1..=3 {
            let claimed = q.dequeue(Duration::from_millis(10)).await.unwrap();
            assert_eq!(claimed.attempt_count, attempt);
            q.fail(claimed.id, "handler exploded");
        }

        // Third failure exhausted the attempts
        assert!(q.dequeue(Duration::from_millis(10)).await.is_none());
        let dead = q.dead_letter_jobs();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, job.id);
        assert_eq!(dead[0].status, QueueJobStatus::Dead);

        let stats = q.stats();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.dead, 1);
        assert_eq!(stats.dead_letter_size, 1);
    }

    #[tokio::test]
    async fn retry_records_intended_backoff() {
        let q = queue();
        q.enqueue("t", json!({}), JobPriority::Normal, 3);

        let claimed = q.dequeue(Duration::from_millis(10)).await.unwrap();
        q.fail(claimed.id, "transient");
        assert_eq!(q.get_job(claimed.id).unwrap().retry_delay_secs, Some(2));

        let claimed = q.dequeue(Duration::from_millis(10)).await.unwrap();
        q.fail(claimed.id, "transient");
        assert_eq!(q.get_job(claimed.id).unwrap().retry_delay_secs, Some(4));
    }

    #[tokio::test]
    async fn queue_events_reach_the_bus() {
        let bus = EventBus::new();
        let q = JobQueue::new(bus.clone());

        let job = q.enqueue("t", json!({}), JobPriority::High, 1);
        let claimed = q.dequeue(Duration::from_millis(10)).await.unwrap();
        q.fail(claimed.id, "bad");

        assert_eq!(bus.get_history(Some("queue/job/enqueued"), 10).len(), 1);
        assert_eq!(bus.get_history(Some("queue/job/started"), 10).len(), 1);
        let dead = bus.get_history(Some("queue/job/dead"), 10);
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].payload["job_id"], json!(job.id));
    }

    #[tokio::test]
    async fn complete_publishes_result() {
        let bus = EventBus::new();
        let q = JobQueue::new(bus.clone());

        q.enqueue("t", json!({}), JobPriority::Normal, 3);
        let claimed = q.dequeue(Duration::from_millis(10)).await.unwrap();
        q.complete(claimed.id, Some(json!({"order_id": 7})));

        let events = bus.get_history(Some("queue/job/completed"), 10);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["result"]["order_id"], 7);
        assert_eq!(q.get_job(claimed.id).unwrap().status, QueueJobStatus::Completed);
    }
}
