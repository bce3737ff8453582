//! Queued job model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Priority levels; smaller value dequeues first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl JobPriority {
    /// Numeric rank used for heap ordering (lower = more urgent).
    pub fn rank(&self) -> u8 {
        match self {
            JobPriority::High => 1,
            JobPriority::Normal => 5,
            JobPriority::Low => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueJobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

/// A job waiting in (or finished with) the queue.
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct QueuedJob {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    #[builder(setter(into))]
    pub job_type: String,
    #[builder(default = json!({}))]
    pub payload: serde_json::Value,
    #[builder(default)]
    pub priority: JobPriority,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default)]
    pub status: QueueJobStatus,
    #[builder(default = 0)]
    pub attempt_count: u32,
    #[builder(default = 3)]
    pub max_attempts: u32,
    #[builder(default)]
    pub error: String,
    /// Intended retry delay recorded on the last failure. Retries re-enqueue
    /// immediately; the delay documents what a scheduled queue would honour.
    #[builder(default)]
    pub retry_delay_secs: Option<u64>,
}

impl QueuedJob {
    /// Payload published on `queue/job/*` topics.
    pub fn to_event_payload(&self) -> serde_json::Value {
        json!({
            "job_id": self.id,
            "job_type": self.job_type,
            "priority": self.priority,
            "status": self.status,
            "attempt_count": self.attempt_count,
            "payload": self.payload,
            "error": self.error,
        })
    }
}
