//! End-to-end webhook protocol tests over a fully wired hub.

mod common;

use common::fixtures::{seed_client, seed_media, seed_product};
use common::test_hub;
use serde_json::json;
use server_core::domains::orders::ItemStatus;
use server_core::domains::orders::OrderItem;
use server_core::domains::Platform;
use server_core::kernel::{Event, EventType, MessageEnvelope, MessageType};

fn event(event_type: EventType, reply_token: &str, payload: serde_json::Value) -> Event {
    Event {
        event_type,
        reply_token: reply_token.to_string(),
        timestamp: 1_719_830_000_000,
        payload,
    }
}

fn envelope(client_code: &str, events: Vec<Event>) -> MessageEnvelope {
    MessageEnvelope {
        client_code: client_code.to_string(),
        events,
    }
}

#[tokio::test]
async fn fresh_assignment_then_confirm() {
    let hub = test_hub().await;
    seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;
    let product = seed_product(&hub.pool, "Soap001", &["soap", "bath", "clean", "fresh"]).await;
    let media = seed_media(&hub.pool, Some(product.id), 3, 1).await;

    let responses = hub
        .orchestrator
        .process_envelope(envelope(
            "BOT-YT-001",
            vec![event(EventType::RequestJob, "rt_1", json!({}))],
        ))
        .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].reply_token, "rt_1");
    assert_eq!(responses[0].messages.len(), 1);

    let message = &responses[0].messages[0];
    assert_eq!(message.message_type, MessageType::JobAssignment);
    let job_id = message.job_id.expect("assignment carries a job id");
    let media_url = message.media_url.as_deref().expect("assignment carries a url");
    let known_urls: Vec<String> = media
        .iter()
        .map(|m| format!("/api/video/{}", m.file_hash))
        .collect();
    assert!(known_urls.iter().any(|u| u == media_url));
    assert_eq!(message.payload["privacy"], "unlisted");
    assert!(message.payload["title"].as_str().is_some());

    // Assignment leaves the item new; the confirm pre-flight moves it
    let item = OrderItem::find_by_id(job_id, &hub.pool).await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::New);

    let confirmation = hub.orders.confirm(job_id).await.unwrap();
    assert!(confirmation.can_post);
    let item = OrderItem::find_by_id(job_id, &hub.pool).await.unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Processing);

    // Registry saw the client and the assignment
    let status = hub.clients.get("BOT-YT-001").unwrap();
    assert_eq!(status.current_job_id, Some(job_id));
}

#[tokio::test]
async fn report_done_acks_and_records_history() {
    let hub = test_hub().await;
    let client = seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;
    let product = seed_product(&hub.pool, "Soap001", &["soap"]).await;
    seed_media(&hub.pool, Some(product.id), 1, 2).await;

    let responses = hub
        .orchestrator
        .process_envelope(envelope(
            "BOT-YT-001",
            vec![event(EventType::RequestJob, "rt_a", json!({}))],
        ))
        .await;
    let job_id = responses[0].messages[0].job_id.unwrap();
    hub.orders.confirm(job_id).await.unwrap();

    let responses = hub
        .orchestrator
        .process_envelope(envelope(
            "BOT-YT-001",
            vec![event(
                EventType::ReportJob,
                "rt_b",
                json!({ "job_id": job_id, "status": "done", "external_id": "v123" }),
            )],
        ))
        .await;
    assert_eq!(responses[0].reply_token, "rt_b");
    assert_eq!(responses[0].messages[0].message_type, MessageType::Ack);

    let count: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM posting_history WHERE client_id = ? AND platform = 'youtube'",
    )
    .bind(client.id)
    .fetch_one(&hub.pool)
    .await
    .unwrap();
    assert_eq!(count.0, 1);

    // Counter and current-job bookkeeping
    let status = hub.clients.get("BOT-YT-001").unwrap();
    assert_eq!(status.jobs_completed, 1);
    assert_eq!(status.current_job_id, None);

    // Single-item order is now complete
    assert_eq!(hub.bus.get_history(Some("order/completed"), 10).len(), 1);
}

#[tokio::test]
async fn envelope_preserves_order_and_survives_partial_failure() {
    let hub = test_hub().await;
    seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;

    let responses = hub
        .orchestrator
        .process_envelope(envelope(
            "BOT-YT-001",
            vec![
                event(EventType::Heartbeat, "rt_1", json!({})),
                event(EventType::RequestJob, "rt_2", json!({})),
                event(EventType::ReportJob, "rt_3", json!({ "job_id": 999 })),
            ],
        ))
        .await;

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].reply_token, "rt_1");
    assert_eq!(responses[1].reply_token, "rt_2");
    assert_eq!(responses[2].reply_token, "rt_3");

    assert_eq!(responses[0].messages[0].message_type, MessageType::Ack);
    // No media seeded: benign standby text
    assert_eq!(responses[1].messages[0].message_type, MessageType::Text);
    // Bogus job id: error bound to the originating token
    assert_eq!(responses[2].messages[0].message_type, MessageType::Error);
}

#[tokio::test]
async fn unknown_event_type_gets_error_response() {
    let hub = test_hub().await;
    seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;

    let responses = hub
        .orchestrator
        .process_envelope(envelope(
            "BOT-YT-001",
            vec![event(EventType::Unknown, "rt_x", json!({}))],
        ))
        .await;

    assert_eq!(responses[0].messages[0].message_type, MessageType::Error);
    assert_eq!(responses[0].messages[0].payload["code"], "UNKNOWN_EVENT");
}

#[tokio::test]
async fn request_with_quantity_returns_one_message_per_item() {
    let hub = test_hub().await;
    seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;
    let product = seed_product(&hub.pool, "Soap001", &["soap"]).await;
    seed_media(&hub.pool, Some(product.id), 5, 3).await;

    let responses = hub
        .orchestrator
        .process_envelope(envelope(
            "BOT-YT-001",
            vec![event(EventType::RequestJob, "rt_q", json!({ "quantity": 3 }))],
        ))
        .await;

    let messages = &responses[0].messages;
    assert_eq!(messages.len(), 3);
    assert!(messages
        .iter()
        .all(|m| m.message_type == MessageType::JobAssignment));
}

#[tokio::test]
async fn still_new_items_are_reoffered_before_building_again() {
    let hub = test_hub().await;
    seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;
    let product = seed_product(&hub.pool, "Soap001", &["soap"]).await;
    seed_media(&hub.pool, Some(product.id), 2, 4).await;

    let first = hub.orders.next_jobs("BOT-YT-001", 1, None).await.unwrap();
    assert_eq!(first.len(), 1);

    // Unconfirmed item comes back instead of a fresh order
    let second = hub.orders.next_jobs("BOT-YT-001", 1, None).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].job_id, first[0].job_id);

    let orders: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
        .fetch_one(&hub.pool)
        .await
        .unwrap();
    assert_eq!(orders.0, 1);
}

#[tokio::test]
async fn log_events_are_acked_and_relayed() {
    let hub = test_hub().await;
    seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;

    let responses = hub
        .orchestrator
        .process_envelope(envelope(
            "BOT-YT-001",
            vec![event(
                EventType::Log,
                "rt_l",
                json!({ "level": "warning", "message": "upload slow" }),
            )],
        ))
        .await;

    assert_eq!(responses[0].messages[0].message_type, MessageType::Ack);
    let relayed = hub.bus.get_history(Some("log/warning"), 10);
    assert_eq!(relayed.len(), 1);
    assert!(relayed[0].payload["message"]
        .as_str()
        .unwrap()
        .contains("upload slow"));
}
