//! Centralised error classification and recording.
//!
//! Every exceptional path funnels through [`ErrorHub::handle_error`], which
//! assigns a monotonically increasing id, appends to a rolling history,
//! logs at a severity-appropriate level and announces the error on the bus
//! (`error/occurred`, or `error/critical` for critical severity).
//! Per-kind recovery hooks can be registered; a successful recovery flips
//! the record to resolved and publishes `error/resolved`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use super::event_bus::EventBus;

pub const TOPIC_ERROR_OCCURRED: &str = "error/occurred";
pub const TOPIC_ERROR_CRITICAL: &str = "error/critical";
pub const TOPIC_ERROR_RESOLVED: &str = "error/resolved";

/// Rolling history size.
const ERROR_HISTORY_LIMIT: usize = 1000;

/// Classification of an error's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Database,
    Network,
    FileIo,
    Validation,
    Authentication,
    PlatformApi,
    Configuration,
    Unknown,
}

impl ErrorKind {
    /// Operator-facing hint carried in the `error/occurred` payload.
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ErrorKind::Database => "Check database connection and file permissions.",
            ErrorKind::Network => "Check network connection and retry.",
            ErrorKind::FileIo => "Verify file path exists and has correct permissions.",
            ErrorKind::Validation => "Check input data format and required fields.",
            ErrorKind::Authentication => "Verify credentials and refresh tokens.",
            ErrorKind::PlatformApi => "Check API rate limits and credentials.",
            ErrorKind::Configuration => "Review configuration for missing/invalid values.",
            ErrorKind::Unknown => "Check logs for more details.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Record of a handled error.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub id: String,
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub context: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    pub resolution_note: Option<String>,
}

/// Recovery hook: returns true when the error was recovered.
pub type RecoveryHook = Arc<dyn Fn(&ErrorRecord) -> bool + Send + Sync>;

struct HubState {
    history: Vec<ErrorRecord>,
    hooks: HashMap<ErrorKind, RecoveryHook>,
}

/// Central error sink shared by all components.
#[derive(Clone)]
pub struct ErrorHub {
    state: Arc<Mutex<HubState>>,
    counter: Arc<AtomicU64>,
    bus: EventBus,
}

impl ErrorHub {
    pub fn new(bus: EventBus) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                history: Vec::new(),
                hooks: HashMap::new(),
            })),
            counter: Arc::new(AtomicU64::new(0)),
            bus,
        }
    }

    /// Classify, record, log and announce an error.
    pub fn handle_error(
        &self,
        err: &anyhow::Error,
        kind: ErrorKind,
        severity: ErrorSeverity,
        context: serde_json::Value,
    ) -> ErrorRecord {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let record = ErrorRecord {
            id: format!("ERR-{seq:06}"),
            kind,
            severity,
            message: format!("{err:#}"),
            context,
            timestamp: Utc::now(),
            resolved: false,
            resolution_note: None,
        };

        {
            let mut state = self.state.lock().expect("error hub lock poisoned");
            state.history.push(record.clone());
            if state.history.len() > ERROR_HISTORY_LIMIT {
                let excess = state.history.len() - ERROR_HISTORY_LIMIT;
                state.history.drain(..excess);
            }
        }

        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => {
                error!(id = %record.id, kind = ?kind, "{err:#}");
            }
            _ => warn!(id = %record.id, kind = ?kind, "{err:#}"),
        }

        let topic = if severity == ErrorSeverity::Critical {
            TOPIC_ERROR_CRITICAL
        } else {
            TOPIC_ERROR_OCCURRED
        };
        let _ = self.bus.publish(
            topic,
            json!({
                "error_id": record.id,
                "kind": record.kind,
                "severity": record.severity,
                "message": record.message,
                "timestamp": record.timestamp.to_rfc3339(),
                "recovery_suggestion": kind.recovery_suggestion(),
            }),
            Some("ErrorHub"),
        );

        record
    }

    /// Register the recovery hook for an error kind (one per kind).
    pub fn register_recovery_hook(&self, kind: ErrorKind, hook: RecoveryHook) {
        self.state
            .lock()
            .expect("error hub lock poisoned")
            .hooks
            .insert(kind, hook);
    }

    /// Run the recovery hook registered for the record's kind.
    ///
    /// On success the stored record is marked resolved and `error/resolved`
    /// is published. Returns false when no hook is registered.
    pub fn attempt_recovery(&self, record: &ErrorRecord) -> bool {
        let hook = {
            let state = self.state.lock().expect("error hub lock poisoned");
            state.hooks.get(&record.kind).cloned()
        };
        let Some(hook) = hook else {
            return false;
        };

        if !hook(record) {
            return false;
        }

        {
            let mut state = self.state.lock().expect("error hub lock poisoned");
            if let Some(stored) = state.history.iter_mut().find(|r| r.id == record.id) {
                stored.resolved = true;
                stored.resolution_note = Some("recovered automatically".to_string());
            }
        }
        let _ = self.bus.publish(
            TOPIC_ERROR_RESOLVED,
            json!({
                "error_id": record.id,
                "kind": record.kind,
                "resolution": "auto_recovered",
            }),
            Some("ErrorHub"),
        );
        true
    }

    /// Filtered view of the rolling history, newest last.
    pub fn history(
        &self,
        kind: Option<ErrorKind>,
        severity: Option<ErrorSeverity>,
        unresolved_only: bool,
        limit: usize,
    ) -> Vec<ErrorRecord> {
        let state = self.state.lock().expect("error hub lock poisoned");
        let matching: Vec<&ErrorRecord> = state
            .history
            .iter()
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .filter(|r| severity.map_or(true, |s| r.severity == s))
            .filter(|r| !unresolved_only || !r.resolved)
            .collect();
        matching
            .into_iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    /// Error counts per kind.
    pub fn stats(&self) -> HashMap<ErrorKind, usize> {
        let state = self.state.lock().expect("error hub lock poisoned");
        let mut stats = HashMap::new();
        for record in &state.history {
            *stats.entry(record.kind).or_insert(0) += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn ids_are_monotonic_and_history_is_kept() {
        let bus = EventBus::new();
        let hub = ErrorHub::new(bus.clone());

        let first = hub.handle_error(
            &anyhow!("db locked"),
            ErrorKind::Database,
            ErrorSeverity::Medium,
            json!({ "op": "insert" }),
        );
        let second = hub.handle_error(
            &anyhow!("timeout"),
            ErrorKind::Network,
            ErrorSeverity::High,
            json!({}),
        );

        assert_eq!(first.id, "ERR-000001");
        assert_eq!(second.id, "ERR-000002");
        assert_eq!(hub.history(None, None, false, 10).len(), 2);
        assert_eq!(hub.history(Some(ErrorKind::Network), None, false, 10).len(), 1);
        assert_eq!(bus.get_history(Some("error/occurred"), 10).len(), 2);
    }

    #[test]
    fn critical_errors_use_their_own_topic() {
        let bus = EventBus::new();
        let hub = ErrorHub::new(bus.clone());

        hub.handle_error(
            &anyhow!("disk gone"),
            ErrorKind::FileIo,
            ErrorSeverity::Critical,
            json!({}),
        );

        assert_eq!(bus.get_history(Some("error/critical"), 10).len(), 1);
        assert!(bus.get_history(Some("error/occurred"), 10).is_empty());
    }

    #[test]
    fn recovery_hook_resolves_record() {
        let bus = EventBus::new();
        let hub = ErrorHub::new(bus.clone());

        hub.register_recovery_hook(ErrorKind::Network, Arc::new(|_| true));
        let record = hub.handle_error(
            &anyhow!("connection reset"),
            ErrorKind::Network,
            ErrorSeverity::Medium,
            json!({}),
        );

        assert!(hub.attempt_recovery(&record));
        let stored = &hub.history(Some(ErrorKind::Network), None, false, 1)[0];
        assert!(stored.resolved);
        assert_eq!(bus.get_history(Some("error/resolved"), 10).len(), 1);

        // No hook registered for this kind
        let other = hub.handle_error(
            &anyhow!("bad sku"),
            ErrorKind::Validation,
            ErrorSeverity::Low,
            json!({}),
        );
        assert!(!hub.attempt_recovery(&other));
    }

    #[test]
    fn history_is_bounded() {
        let hub = ErrorHub::new(EventBus::new());
        for i in 0..(ERROR_HISTORY_LIMIT + 5) {
            hub.handle_error(
                &anyhow!("err {i}"),
                ErrorKind::Unknown,
                ErrorSeverity::Low,
                json!({}),
            );
        }
        assert_eq!(hub.history(None, None, false, usize::MAX).len(), ERROR_HISTORY_LIMIT);
    }
}
