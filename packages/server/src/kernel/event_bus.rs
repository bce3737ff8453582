//! In-process pub/sub bus with MQTT-style topic routing.
//!
//! Topics are slash-delimited strings (`order/created`, `queue/job/failed`).
//! Subscription patterns may use two wildcards:
//! - `*` matches exactly one segment (`order/*` matches `order/created`
//!   but not `order/item/added`)
//! - `#` matches any number of trailing segments (`log/#` matches `log`,
//!   `log/info`, `log/error/critical`)
//!
//! Delivery is synchronous on the publisher for [`EventBus::publish`];
//! [`EventBus::publish_async`] enqueues to an internal FIFO drained by a
//! single background worker, so deliveries stay serialised per subscriber.
//! Subscriber errors are logged and never propagate back to the publisher.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Rolling history buffer size.
const HISTORY_LIMIT: usize = 1000;

/// How long [`EventBus::stop_async_worker`] waits for the worker to exit.
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// A message published to a topic.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// Who published this message
    pub source: Option<String>,
}

/// Subscriber callback. Must not block; long work belongs on the job queue.
pub type Subscriber = Arc<dyn Fn(&BusMessage) -> anyhow::Result<()> + Send + Sync>;

/// Validation errors for topics and patterns.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("wildcards are not allowed in a publish topic: '{0}'")]
    WildcardInTopic(String),
    #[error("'#' is only valid as the final segment of a pattern: '{0}'")]
    MalformedPattern(String),
}

/// Check whether a concrete topic matches a subscription pattern.
///
/// Segment-wise traversal, not a regex translation: the result is
/// deterministic and cheap for the short topics this bus carries.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('/').collect();
    let topic: Vec<&str> = topic.split('/').collect();
    match_segments(&pattern, &topic)
}

fn match_segments(pattern: &[&str], topic: &[&str]) -> bool {
    let Some((head, rest)) = pattern.split_first() else {
        return topic.is_empty();
    };

    if *head == "#" {
        // '#' matches everything remaining, including nothing
        return true;
    }

    let Some((topic_head, topic_rest)) = topic.split_first() else {
        return false;
    };

    if *head == "*" || head == topic_head {
        return match_segments(rest, topic_rest);
    }

    false
}

fn validate_publish_topic(topic: &str) -> Result<(), BusError> {
    if topic.contains('#') || topic.contains('*') {
        return Err(BusError::WildcardInTopic(topic.to_string()));
    }
    Ok(())
}

fn validate_pattern(pattern: &str) -> Result<(), BusError> {
    let segments: Vec<&str> = pattern.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        if *segment == "#" && i != segments.len() - 1 {
            return Err(BusError::MalformedPattern(pattern.to_string()));
        }
    }
    Ok(())
}

struct Subscription {
    pattern: String,
    callback: Subscriber,
}

struct BusInner {
    /// Read lock spans fan-out, write lock spans table mutation, so
    /// subscribe/unsubscribe never interleave with a delivery in progress.
    subscribers: RwLock<Vec<Subscription>>,
    history: Mutex<VecDeque<BusMessage>>,
    /// FIFO for `publish_async`; survives worker restarts.
    pending: Mutex<VecDeque<BusMessage>>,
    notify: Notify,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Topic-routed in-process event bus.
///
/// Cheap to clone; all clones share one subscriber table, history buffer and
/// async queue.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(Vec::new()),
                history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
                pending: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                running: AtomicBool::new(false),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Subscribe a callback to a topic pattern.
    ///
    /// Idempotent per `(pattern, callback)` identity: subscribing the same
    /// `Arc` to the same pattern twice registers it once.
    pub fn subscribe(&self, pattern: &str, callback: Subscriber) -> Result<(), BusError> {
        validate_pattern(pattern)?;

        let mut subscribers = self.inner.subscribers.write().expect("subscriber lock poisoned");
        let already = subscribers
            .iter()
            .any(|s| s.pattern == pattern && Arc::ptr_eq(&s.callback, &callback));
        if !already {
            debug!(pattern, "subscribed");
            subscribers.push(Subscription {
                pattern: pattern.to_string(),
                callback,
            });
        }
        Ok(())
    }

    /// Remove a `(pattern, callback)` registration. No-op if absent.
    pub fn unsubscribe(&self, pattern: &str, callback: &Subscriber) {
        let mut subscribers = self.inner.subscribers.write().expect("subscriber lock poisoned");
        subscribers.retain(|s| !(s.pattern == pattern && Arc::ptr_eq(&s.callback, callback)));
    }

    /// Publish a message, fanning out synchronously on the caller.
    ///
    /// Wildcards are not allowed in a published topic.
    pub fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
        source: Option<&str>,
    ) -> Result<(), BusError> {
        validate_publish_topic(topic)?;
        self.deliver(BusMessage {
            topic: topic.to_string(),
            payload,
            timestamp: Utc::now(),
            source: source.map(str::to_string),
        });
        Ok(())
    }

    /// Queue a message for delivery by the async worker.
    ///
    /// Messages queue up even while the worker is stopped and are delivered
    /// in publish order once it runs.
    pub fn publish_async(
        &self,
        topic: &str,
        payload: serde_json::Value,
        source: Option<&str>,
    ) -> Result<(), BusError> {
        validate_publish_topic(topic)?;
        let message = BusMessage {
            topic: topic.to_string(),
            payload,
            timestamp: Utc::now(),
            source: source.map(str::to_string),
        };
        self.inner
            .pending
            .lock()
            .expect("pending lock poisoned")
            .push_back(message);
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Start the background worker that drains the async queue.
    ///
    /// Safe to call more than once; only one worker runs at a time.
    pub fn start_async_worker(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = self.inner.clone();
        let bus = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let next = inner.pending.lock().expect("pending lock poisoned").pop_front();
                match next {
                    Some(message) => bus.deliver(message),
                    None => {
                        if !inner.running.load(Ordering::SeqCst) {
                            break;
                        }
                        inner.notify.notified().await;
                        if !inner.running.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                }
            }
        });

        *self.inner.worker.lock().expect("worker lock poisoned") = Some(handle);
        info!("event bus async worker started");
    }

    /// Stop the background worker, finishing any in-flight delivery.
    ///
    /// Bounded wait; safe to call more than once.
    pub async fn stop_async_worker(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.notify.notify_one();

        let handle = self.inner.worker.lock().expect("worker lock poisoned").take();
        if let Some(handle) = handle {
            if tokio::time::timeout(WORKER_STOP_TIMEOUT, handle).await.is_err() {
                warn!("event bus async worker did not stop in time");
            } else {
                info!("event bus async worker stopped");
            }
        }
    }

    /// Recent messages, newest last, optionally filtered by a pattern.
    pub fn get_history(&self, topic_filter: Option<&str>, limit: usize) -> Vec<BusMessage> {
        let history = self.inner.history.lock().expect("history lock poisoned");
        let matching: Vec<&BusMessage> = match topic_filter {
            Some(filter) => history
                .iter()
                .filter(|m| topic_matches(filter, &m.topic))
                .collect(),
            None => history.iter().collect(),
        };
        matching
            .into_iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    pub fn clear_history(&self) {
        self.inner.history.lock().expect("history lock poisoned").clear();
    }

    fn deliver(&self, message: BusMessage) {
        {
            let mut history = self.inner.history.lock().expect("history lock poisoned");
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(message.clone());
        }

        let subscribers = self.inner.subscribers.read().expect("subscriber lock poisoned");
        for subscription in subscribers.iter() {
            if topic_matches(&subscription.pattern, &message.topic) {
                if let Err(e) = (subscription.callback)(&message) {
                    error!(
                        pattern = %subscription.pattern,
                        topic = %message.topic,
                        error = %e,
                        "subscriber callback failed"
                    );
                }
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .inner
            .subscribers
            .read()
            .map(|s| s.len())
            .unwrap_or_default();
        f.debug_struct("EventBus")
            .field("subscriber_count", &count)
            .finish()
    }
}
