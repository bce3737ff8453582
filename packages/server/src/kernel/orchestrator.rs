//! Webhook protocol state machine.
//!
//! Translates one inbound envelope into one response envelope per event,
//! in event order, echoing reply tokens verbatim. Every state change is
//! announced on the bus; every handler error is classified, recorded and
//! answered as an `error` message while the rest of the envelope continues.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::clients::{ClientRegistry, TOPIC_CLIENT_HEARTBEAT};
use super::envelope::{
    Event, EventType, MessageEnvelope, ResponseEnvelope, ResponseMessage,
};
use super::errors::{ErrorHub, ErrorKind, ErrorSeverity};
use super::event_bus::EventBus;
use super::log_relay::LogRelay;
use crate::domains::accounts::ClientAccount;
use crate::domains::orders::{OrderService, ReportedOutcome};

pub const TOPIC_JOB_REQUESTED: &str = "job/requested";
pub const TOPIC_JOB_ASSIGNED: &str = "job/assigned";
pub const TOPIC_JOB_COMPLETED: &str = "job/completed";
pub const TOPIC_JOB_FAILED: &str = "job/failed";

/// Central dispatch hub for agent envelopes.
pub struct MessageOrchestrator {
    pool: SqlitePool,
    bus: EventBus,
    clients: ClientRegistry,
    errors: ErrorHub,
    log: LogRelay,
    orders: Arc<OrderService>,
}

impl MessageOrchestrator {
    pub fn new(
        pool: SqlitePool,
        bus: EventBus,
        clients: ClientRegistry,
        errors: ErrorHub,
        orders: Arc<OrderService>,
    ) -> Self {
        let log = LogRelay::new(bus.clone());
        Self {
            pool,
            bus,
            clients,
            errors,
            log,
            orders,
        }
    }

    /// Process an inbound envelope into one response per event.
    pub async fn process_envelope(&self, envelope: MessageEnvelope) -> Vec<ResponseEnvelope> {
        let client_code = envelope.client_code.as_str();
        debug!(client_code, events = envelope.events.len(), "processing envelope");

        let platform = match ClientAccount::find_by_code(client_code, &self.pool).await {
            Ok(Some(client)) => client.platform.as_str().to_string(),
            _ => "unknown".to_string(),
        };
        self.clients.touch(client_code, &platform);
        let _ = ClientAccount::touch_last_seen(client_code, &self.pool).await;

        let mut responses = Vec::with_capacity(envelope.events.len());
        for event in &envelope.events {
            let response = match self.dispatch(client_code, event).await {
                Ok(response) => response,
                Err(e) => {
                    self.errors.handle_error(
                        &e,
                        ErrorKind::Unknown,
                        ErrorSeverity::Medium,
                        json!({
                            "client_code": client_code,
                            "event_type": event.event_type,
                        }),
                    );
                    ResponseEnvelope::error(&event.reply_token, "PROCESSING_ERROR", &format!("{e:#}"))
                }
            };
            responses.push(response);
        }
        responses
    }

    async fn dispatch(&self, client_code: &str, event: &Event) -> Result<ResponseEnvelope> {
        match event.event_type {
            EventType::RequestJob => self.handle_request_job(client_code, event).await,
            EventType::ReportJob => self.handle_report_job(client_code, event).await,
            EventType::Heartbeat => self.handle_heartbeat(client_code, event),
            EventType::Log => self.handle_log(client_code, event),
            EventType::Unknown => Ok(ResponseEnvelope::error(
                &event.reply_token,
                "UNKNOWN_EVENT",
                "unknown event type",
            )),
        }
    }

    async fn handle_request_job(&self, client_code: &str, event: &Event) -> Result<ResponseEnvelope> {
        info!(client_code, "job request");
        let _ = self.bus.publish(
            TOPIC_JOB_REQUESTED,
            json!({ "client_code": client_code, "payload": event.payload }),
            Some("MessageOrchestrator"),
        );

        let quantity = event.payload["quantity"].as_u64().unwrap_or(1).max(1) as u32;
        let prod_code = event.payload["prod_code"].as_str();

        let jobs = self.orders.next_jobs(client_code, quantity, prod_code).await?;
        if jobs.is_empty() {
            debug!(client_code, "no jobs available");
            return Ok(ResponseEnvelope::text(
                &event.reply_token,
                "Standby - no jobs available",
            ));
        }

        self.clients.set_current_job(client_code, Some(jobs[0].job_id));

        let mut messages = Vec::with_capacity(jobs.len());
        for job in &jobs {
            info!(client_code, job_id = job.job_id, "job assigned");
            let _ = self.bus.publish(
                TOPIC_JOB_ASSIGNED,
                json!({
                    "client_code": client_code,
                    "job_id": job.job_id,
                    "media_id": job.media_id,
                }),
                Some("MessageOrchestrator"),
            );
            messages.push(ResponseMessage::job_assignment(
                job.job_id,
                job.media_url(),
                job.to_message_payload(),
            ));
        }
        Ok(ResponseEnvelope::new(&event.reply_token, messages))
    }

    async fn handle_report_job(&self, client_code: &str, event: &Event) -> Result<ResponseEnvelope> {
        let Some(job_id) = event.payload["job_id"].as_i64() else {
            bail!("report_job payload is missing job_id");
        };
        let status = event.payload["status"].as_str().unwrap_or("done");
        let outcome = ReportedOutcome::parse(status);
        let external_id = event.payload["external_id"].as_str();
        let external_url = event.payload["external_url"].as_str();
        let log_message = event.payload["log"].as_str();

        info!(client_code, job_id, status, "job report");

        let report = self
            .orders
            .report(job_id, outcome, external_id, external_url, log_message)
            .await?;

        self.clients
            .record_report(client_code, outcome == ReportedOutcome::Done);

        let topic = if outcome == ReportedOutcome::Done {
            TOPIC_JOB_COMPLETED
        } else {
            TOPIC_JOB_FAILED
        };
        let _ = self.bus.publish(
            topic,
            json!({
                "client_code": client_code,
                "job_id": job_id,
                "status": report.outcome,
                "order_completed": report.order_completed,
                "log": log_message,
            }),
            Some("MessageOrchestrator"),
        );

        Ok(ResponseEnvelope::ack(&event.reply_token))
    }

    fn handle_heartbeat(&self, client_code: &str, event: &Event) -> Result<ResponseEnvelope> {
        debug!(client_code, "heartbeat");
        let _ = self.bus.publish(
            TOPIC_CLIENT_HEARTBEAT,
            json!({
                "client_code": client_code,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
            Some("MessageOrchestrator"),
        );
        Ok(ResponseEnvelope::ack(&event.reply_token))
    }

    fn handle_log(&self, client_code: &str, event: &Event) -> Result<ResponseEnvelope> {
        let level = event.payload["level"].as_str().unwrap_or("info");
        let message = event.payload["message"].as_str().unwrap_or_default();
        self.log.at_level(
            level,
            &format!("[{client_code}] {message}"),
            json!({ "client_code": client_code }),
        );
        Ok(ResponseEnvelope::ack(&event.reply_token))
    }

    /// Mark an agent offline (idle reaper / operator action).
    pub fn mark_client_offline(&self, client_code: &str) {
        self.clients.mark_offline(client_code);
    }
}
