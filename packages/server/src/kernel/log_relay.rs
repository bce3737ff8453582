//! Mirrors log records onto the event bus.
//!
//! Structured logging stays on `tracing`; this relay additionally publishes
//! each record under `log/{level}` so bus consumers (dashboards, monitors)
//! see the same stream without a logging dependency.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::event_bus::EventBus;

pub const TOPIC_LOG_DEBUG: &str = "log/debug";
pub const TOPIC_LOG_INFO: &str = "log/info";
pub const TOPIC_LOG_WARNING: &str = "log/warning";
pub const TOPIC_LOG_ERROR: &str = "log/error";
pub const TOPIC_LOG_CRITICAL: &str = "log/critical";

#[derive(Clone)]
pub struct LogRelay {
    bus: EventBus,
}

impl LogRelay {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    pub fn debug(&self, message: &str, extra: Value) {
        debug!("{message}");
        self.relay("DEBUG", TOPIC_LOG_DEBUG, message, extra);
    }

    pub fn info(&self, message: &str, extra: Value) {
        info!("{message}");
        self.relay("INFO", TOPIC_LOG_INFO, message, extra);
    }

    pub fn warning(&self, message: &str, extra: Value) {
        warn!("{message}");
        self.relay("WARNING", TOPIC_LOG_WARNING, message, extra);
    }

    pub fn error(&self, message: &str, extra: Value) {
        error!("{message}");
        self.relay("ERROR", TOPIC_LOG_ERROR, message, extra);
    }

    pub fn critical(&self, message: &str, extra: Value) {
        error!("{message}");
        self.relay("CRITICAL", TOPIC_LOG_CRITICAL, message, extra);
    }

    /// Relay a record at a level named on the wire (agent `log` events).
    pub fn at_level(&self, level: &str, message: &str, extra: Value) {
        match level.to_ascii_lowercase().as_str() {
            "debug" => self.debug(message, extra),
            "warning" | "warn" => self.warning(message, extra),
            "error" => self.error(message, extra),
            "critical" => self.critical(message, extra),
            _ => self.info(message, extra),
        }
    }

    fn relay(&self, level: &str, topic: &str, message: &str, extra: Value) {
        let mut payload = json!({
            "level": level,
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        });
        if let (Value::Object(target), Value::Object(source)) = (&mut payload, extra) {
            for (key, value) in source {
                target.entry(key).or_insert(value);
            }
        }
        let _ = self.bus.publish(topic, payload, Some("LogRelay"));
    }
}
