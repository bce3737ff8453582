//! Order builder tests: eligibility, non-duplication, payload assembly.

mod common;

use std::collections::HashSet;

use common::fixtures::{seed_client, seed_media, seed_product};
use common::test_hub;
use server_core::domains::orders::{ItemStatus, OrderItem, OrderStatus, PostingHistory};
use server_core::domains::Platform;

#[tokio::test]
async fn order_never_repeats_media_within_itself() {
    let hub = test_hub().await;
    seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;
    let product = seed_product(&hub.pool, "Soap001", &["soap", "bath"]).await;
    seed_media(&hub.pool, Some(product.id), 100, 10).await;

    let order = hub
        .orders
        .builder()
        .create_order("BOT-YT-001", Platform::Youtube, 10, Some("Soap001"))
        .await
        .expect("order should be created");

    assert_eq!(order.items.len(), 10);
    let distinct: HashSet<i64> = order.items.iter().map(|i| i.media_id).collect();
    assert_eq!(distinct.len(), 10);

    // Persisted rows agree with the returned payloads
    let items = OrderItem::for_order(order.order_id, &hub.pool).await.unwrap();
    assert_eq!(items.len(), 10);
    assert!(items.iter().all(|i| i.status == ItemStatus::New));

    let status: (OrderStatus,) = sqlx::query_as("SELECT status FROM orders WHERE id = ?")
        .bind(order.order_id)
        .fetch_one(&hub.pool)
        .await
        .unwrap();
    assert_eq!(status.0, OrderStatus::Pending);
}

#[tokio::test]
async fn already_posted_media_is_subtracted() {
    let hub = test_hub().await;
    let client = seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;
    let product = seed_product(&hub.pool, "Soap001", &["soap"]).await;
    let media = seed_media(&hub.pool, Some(product.id), 5, 20).await;

    PostingHistory::insert(client.id, media[2].id, Platform::Youtube, None, None, &hub.pool)
        .await
        .unwrap();

    let order = hub
        .orders
        .builder()
        .create_order("BOT-YT-001", Platform::Youtube, 5, None)
        .await
        .expect("order should be created");

    assert!(order.items.len() <= 4);
    assert!(order.items.iter().all(|i| i.media_id != media[2].id));
}

#[tokio::test]
async fn posting_on_another_platform_does_not_subtract() {
    let hub = test_hub().await;
    let client = seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;
    let product = seed_product(&hub.pool, "Soap001", &["soap"]).await;
    let media = seed_media(&hub.pool, Some(product.id), 1, 30).await;

    PostingHistory::insert(client.id, media[0].id, Platform::Tiktok, None, None, &hub.pool)
        .await
        .unwrap();

    let order = hub
        .orders
        .builder()
        .create_order("BOT-YT-001", Platform::Youtube, 1, None)
        .await
        .expect("tiktok history must not block youtube");
    assert_eq!(order.items.len(), 1);
}

#[tokio::test]
async fn unknown_client_and_empty_pool_yield_no_order() {
    let hub = test_hub().await;

    let missing_client = hub
        .orders
        .builder()
        .create_order("BOT-GHOST", Platform::Youtube, 5, None)
        .await;
    assert!(missing_client.is_none());

    seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;
    let no_media = hub
        .orders
        .builder()
        .create_order("BOT-YT-001", Platform::Youtube, 5, None)
        .await;
    assert!(no_media.is_none());

    // Unknown product code: empty eligibility set
    seed_media(&hub.pool, None, 2, 40).await;
    let bad_sku = hub
        .orders
        .builder()
        .create_order("BOT-YT-001", Platform::Youtube, 5, Some("NoSuchSku"))
        .await;
    assert!(bad_sku.is_none());
}

#[tokio::test]
async fn prod_code_narrows_the_pool() {
    let hub = test_hub().await;
    seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;
    let soap = seed_product(&hub.pool, "Soap001", &["soap"]).await;
    let lamp = seed_product(&hub.pool, "Lamp001", &["lamp"]).await;
    let soap_media = seed_media(&hub.pool, Some(soap.id), 3, 50).await;
    seed_media(&hub.pool, Some(lamp.id), 3, 60).await;

    let order = hub
        .orders
        .builder()
        .create_order("BOT-YT-001", Platform::Youtube, 10, Some("Soap001"))
        .await
        .expect("order should be created");

    let soap_ids: HashSet<i64> = soap_media.iter().map(|m| m.id).collect();
    assert_eq!(order.items.len(), 3);
    assert!(order.items.iter().all(|i| soap_ids.contains(&i.media_id)));
}

#[tokio::test]
async fn payloads_carry_randomised_copy_with_stable_tag_prefix() {
    let hub = test_hub().await;
    seed_client(&hub.pool, "BOT-YT-001", Platform::Youtube).await;
    let tags = ["kw1", "kw2", "kw3", "extra1", "extra2", "extra3", "extra4", "extra5"];
    let product = seed_product(&hub.pool, "Soap001", &tags).await;
    seed_media(&hub.pool, Some(product.id), 1, 70).await;

    let order = hub
        .orders
        .builder()
        .create_order("BOT-YT-001", Platform::Youtube, 1, None)
        .await
        .expect("order should be created");
    let payload = &order.items[0];

    // Youtube pins the first three tags
    assert_eq!(&payload.tags[..3], &["kw1", "kw2", "kw3"]);
    assert!(payload.tags.len() >= 5);
    assert_eq!(payload.title, "Soap001 name");
    assert!(payload.description.starts_with("Long copy for posting"));

    // Affiliate comes from the shopee profile fallback
    assert!(payload.affiliate_url.starts_with("https://s.example/"));

    // The stored snapshot matches what the agent was given
    let item = OrderItem::find_by_id(payload.job_id, &hub.pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.posting_config.0["title"], "Soap001 name");
    assert_eq!(
        item.posting_config.0["tags"].as_array().unwrap().len(),
        payload.tags.len()
    );
    assert_eq!(item.posting_config.0["platform_config"]["privacy"], "unlisted");
}
