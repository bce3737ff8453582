//! In-memory liveness registry for connected agents.
//!
//! Transient state only: the persisted `client_accounts` table is the record
//! of which agents exist; this registry tracks who is online right now and
//! per-agent job counters for the dashboard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::event_bus::EventBus;

pub const TOPIC_CLIENT_CONNECTED: &str = "client/connected";
pub const TOPIC_CLIENT_DISCONNECTED: &str = "client/disconnected";
pub const TOPIC_CLIENT_HEARTBEAT: &str = "client/heartbeat";

/// Status of a connected agent.
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub client_code: String,
    pub platform: String,
    pub last_seen: DateTime<Utc>,
    pub is_online: bool,
    pub current_job_id: Option<i64>,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

/// Process-wide agent registry keyed by `client_code`.
///
/// All mutations run under one exclusive lock. Cheap to clone.
#[derive(Clone)]
pub struct ClientRegistry {
    clients: Arc<Mutex<HashMap<String, ClientStatus>>>,
    bus: EventBus,
}

impl ClientRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            bus,
        }
    }

    /// Upsert an agent on any inbound envelope and refresh `last_seen`.
    ///
    /// First appearance publishes `client/connected`.
    pub fn touch(&self, client_code: &str, platform: &str) {
        let mut clients = self.clients.lock().expect("client registry lock poisoned");
        match clients.get_mut(client_code) {
            Some(status) => {
                status.last_seen = Utc::now();
                status.is_online = true;
            }
            None => {
                clients.insert(
                    client_code.to_string(),
                    ClientStatus {
                        client_code: client_code.to_string(),
                        platform: platform.to_string(),
                        last_seen: Utc::now(),
                        is_online: true,
                        current_job_id: None,
                        jobs_completed: 0,
                        jobs_failed: 0,
                    },
                );
                drop(clients);
                info!(client_code, platform, "new client connected");
                let _ = self.bus.publish(
                    TOPIC_CLIENT_CONNECTED,
                    json!({ "client_code": client_code, "platform": platform }),
                    Some("ClientRegistry"),
                );
            }
        }
    }

    /// Mark an agent offline and publish `client/disconnected`.
    pub fn mark_offline(&self, client_code: &str) {
        let mut clients = self.clients.lock().expect("client registry lock poisoned");
        if let Some(status) = clients.get_mut(client_code) {
            status.is_online = false;
            drop(clients);
            let _ = self.bus.publish(
                TOPIC_CLIENT_DISCONNECTED,
                json!({ "client_code": client_code }),
                Some("ClientRegistry"),
            );
        }
    }

    /// Record the job currently assigned to an agent (or clear it).
    pub fn set_current_job(&self, client_code: &str, job_id: Option<i64>) {
        let mut clients = self.clients.lock().expect("client registry lock poisoned");
        if let Some(status) = clients.get_mut(client_code) {
            status.current_job_id = job_id;
        }
    }

    /// Bump the completed/failed counter after a job report.
    pub fn record_report(&self, client_code: &str, succeeded: bool) {
        let mut clients = self.clients.lock().expect("client registry lock poisoned");
        if let Some(status) = clients.get_mut(client_code) {
            status.current_job_id = None;
            if succeeded {
                status.jobs_completed += 1;
            } else {
                status.jobs_failed += 1;
            }
        }
    }

    pub fn get(&self, client_code: &str) -> Option<ClientStatus> {
        self.clients
            .lock()
            .expect("client registry lock poisoned")
            .get(client_code)
            .cloned()
    }

    /// Snapshot of every tracked agent.
    pub fn statuses(&self) -> Vec<ClientStatus> {
        self.clients
            .lock()
            .expect("client registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn online_clients(&self) -> Vec<String> {
        self.clients
            .lock()
            .expect("client registry lock poisoned")
            .values()
            .filter(|s| s.is_online)
            .map(|s| s.client_code.clone())
            .collect()
    }
}
