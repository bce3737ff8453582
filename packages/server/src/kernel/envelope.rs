//! Webhook wire protocol.
//!
//! Agents post one [`MessageEnvelope`] carrying a batch of events; the hub
//! answers with one [`ResponseEnvelope`] per event, in event order, echoing
//! each `replyToken` verbatim. The shape is webhook-batch style: correlation
//! lives in the token, not the transport.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Events an agent can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RequestJob,
    ReportJob,
    Heartbeat,
    Log,
    /// Forward-compatibility: unrecognised types still get a per-event
    /// `error` response instead of failing the whole envelope.
    #[serde(other)]
    Unknown,
}

/// Messages the hub can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    JobAssignment,
    Text,
    Error,
    Ack,
}

fn empty_object() -> Value {
    json!({})
}

/// A single event inside an inbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(rename = "replyToken", default)]
    pub reply_token: String,
    /// Unix epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default = "empty_object")]
    pub payload: Value,
}

/// Inbound envelope: client identity plus a batch of events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub client_code: String,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// A single message inside an outbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default = "empty_object")]
    pub payload: Value,
}

impl ResponseMessage {
    pub fn job_assignment(job_id: i64, media_url: String, payload: Value) -> Self {
        Self {
            message_type: MessageType::JobAssignment,
            job_id: Some(job_id),
            media_url: Some(media_url),
            payload,
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            message_type: MessageType::Text,
            job_id: None,
            media_url: None,
            payload: json!({ "text": text }),
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            message_type: MessageType::Error,
            job_id: None,
            media_url: None,
            payload: json!({ "code": code, "message": message }),
        }
    }

    pub fn ack() -> Self {
        Self {
            message_type: MessageType::Ack,
            job_id: None,
            media_url: None,
            payload: json!({ "status": "received" }),
        }
    }
}

/// Outbound envelope bound to one inbound event's reply token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "replyToken")]
    pub reply_token: String,
    pub messages: Vec<ResponseMessage>,
}

impl ResponseEnvelope {
    pub fn new(reply_token: &str, messages: Vec<ResponseMessage>) -> Self {
        Self {
            reply_token: reply_token.to_string(),
            messages,
        }
    }

    pub fn text(reply_token: &str, text: &str) -> Self {
        Self::new(reply_token, vec![ResponseMessage::text(text)])
    }

    pub fn error(reply_token: &str, code: &str, message: &str) -> Self {
        Self::new(reply_token, vec![ResponseMessage::error(code, message)])
    }

    pub fn ack(reply_token: &str) -> Self {
        Self::new(reply_token, vec![ResponseMessage::ack()])
    }
}

/// Generate an opaque correlation token.
pub fn generate_reply_token() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("rt_{}", &id[..16])
}
