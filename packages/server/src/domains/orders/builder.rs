//! Just-in-time order assembly with anti-pattern-detection randomisation.
//!
//! Eligible media = everything the client has not yet posted to the target
//! platform (optionally narrowed to one product), sampled uniformly at
//! random without replacement. Each sampled clip gets a payload whose tags,
//! affiliate link and description are varied per order so repeated posts do
//! not look machine-stamped. Order plus items land in one transaction.

use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use super::models::{Order, OrderItem};
use super::TOPIC_ORDER_CREATED;
use crate::domains::accounts::ClientAccount;
use crate::domains::catalog::{AffiliateLink, MediaAsset, Product, ProductConfig};
use crate::domains::Platform;
use crate::kernel::event_bus::EventBus;

/// Fewest tags to ship when the configured list allows it.
const MIN_TAGS: usize = 5;
/// Most tags to ship.
const MAX_TAGS: usize = 10;

const DESCRIPTION_EMOJIS: [&str; 6] = ["👇", "⬇️", "🔽", "📌", "✨", "💯"];

/// Everything an agent needs to publish one clip.
#[derive(Debug, Clone)]
pub struct JobPayload {
    pub job_id: i64,
    pub media_id: i64,
    pub media_hash: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub affiliate_url: String,
    pub affiliate_label: String,
    pub platform_config: Value,
}

impl JobPayload {
    pub fn media_url(&self) -> String {
        format!("/api/video/{}", self.media_hash)
    }

    fn privacy(&self) -> String {
        self.platform_config["privacy"]
            .as_str()
            .unwrap_or("public")
            .to_string()
    }

    /// Snapshot persisted on the order item.
    pub fn to_posting_config(&self) -> Value {
        json!({
            "title": self.title,
            "description": self.description,
            "tags": self.tags,
            "affiliate_url": self.affiliate_url,
            "affiliate_label": self.affiliate_label,
            "platform_config": self.platform_config,
        })
    }

    /// Wire payload for a `job_assignment` message.
    pub fn to_message_payload(&self) -> Value {
        json!({
            "title": self.title,
            "description": self.description,
            "tags": self.tags,
            "privacy": self.privacy(),
            "affiliate_url": self.affiliate_url,
            "affiliate_label": self.affiliate_label,
            "platform_config": self.platform_config,
        })
    }

    /// Rebuild a payload from a stored snapshot (re-offer path).
    pub fn from_posting_config(
        job_id: i64,
        media_id: i64,
        media_hash: &str,
        config: &Value,
    ) -> Self {
        let tags = config["tags"]
            .as_array()
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            job_id,
            media_id,
            media_hash: media_hash.to_string(),
            title: config["title"].as_str().unwrap_or_default().to_string(),
            description: config["description"].as_str().unwrap_or_default().to_string(),
            tags,
            affiliate_url: config["affiliate_url"].as_str().unwrap_or_default().to_string(),
            affiliate_label: config["affiliate_label"].as_str().unwrap_or_default().to_string(),
            platform_config: config["platform_config"].clone(),
        }
    }
}

/// Result of order creation.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order_id: i64,
    pub client_code: String,
    pub platform: Platform,
    pub items: Vec<JobPayload>,
    pub created_at: DateTime<Utc>,
}

/// Builds orders at the moment an agent asks for work.
pub struct OrderBuilder {
    pool: SqlitePool,
    bus: EventBus,
    rng: Mutex<StdRng>,
}

impl OrderBuilder {
    pub fn new(pool: SqlitePool, bus: EventBus) -> Self {
        Self::with_rng(pool, bus, StdRng::from_entropy())
    }

    /// Construct with a seeded RNG for deterministic tests.
    pub fn with_rng(pool: SqlitePool, bus: EventBus, rng: StdRng) -> Self {
        Self {
            pool,
            bus,
            rng: Mutex::new(rng),
        }
    }

    // ------------------------------------------------------------------
    // Randomisation primitives
    // ------------------------------------------------------------------

    /// Shuffle tags while pinning the first `keep_first` (the important
    /// keywords) in place.
    pub fn shuffle_tags(&self, tags: &[String], keep_first: usize) -> Vec<String> {
        if tags.len() <= keep_first {
            return tags.to_vec();
        }
        let mut result = tags.to_vec();
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        result[keep_first..].shuffle(&mut *rng);
        result
    }

    /// Shuffled random-size subset: first `keep_first` stable, remainder
    /// permuted, then truncated to a random length between [`MIN_TAGS`]
    /// and [`MAX_TAGS`].
    pub fn select_tags_subset(&self, tags: &[String], keep_first: usize) -> Vec<String> {
        let mut result = self.shuffle_tags(tags, keep_first);
        if result.len() > MIN_TAGS {
            let max = result.len().min(MAX_TAGS);
            let count = self.rng.lock().expect("rng lock poisoned").gen_range(MIN_TAGS..=max);
            result.truncate(count);
        }
        result
    }

    /// Pick an affiliate link: 70% chance of a primary link when one
    /// exists, otherwise a secondary, otherwise whatever is there.
    pub fn pick_affiliate(&self, links: &[AffiliateLink]) -> (String, String) {
        let Some(first) = links.first() else {
            return (String::new(), String::new());
        };

        let primary: Vec<&AffiliateLink> = links.iter().filter(|l| l.is_primary).collect();
        let secondary: Vec<&AffiliateLink> = links.iter().filter(|l| !l.is_primary).collect();

        let mut rng = self.rng.lock().expect("rng lock poisoned");
        let chosen = if !primary.is_empty() && rng.gen_bool(0.7) {
            primary.choose(&mut *rng).copied()
        } else if !secondary.is_empty() {
            secondary.choose(&mut *rng).copied()
        } else if !primary.is_empty() {
            primary.choose(&mut *rng).copied()
        } else {
            Some(first)
        };

        let chosen = chosen.unwrap_or(first);
        (chosen.url.clone(), chosen.label.clone())
    }

    /// Cosmetic variation: sometimes a trailing newline, sometimes a
    /// trailing emoji. Enough to break byte-identical descriptions.
    pub fn vary_description(&self, description: &str) -> String {
        let mut rng = self.rng.lock().expect("rng lock poisoned");
        let mut result = description.to_string();
        if rng.gen_bool(0.5) {
            result = format!("{}\n", result.trim_end());
        }
        if rng.gen_bool(0.3) {
            let emoji = DESCRIPTION_EMOJIS
                .choose(&mut *rng)
                .copied()
                .unwrap_or_default();
            result = format!("{} {}", result.trim_end(), emoji);
        }
        result
    }

    // ------------------------------------------------------------------
    // Order assembly
    // ------------------------------------------------------------------

    /// Materialise one order for `client_code`, or nothing when the client
    /// is unknown, no media is eligible, or the store fails (logged).
    pub async fn create_order(
        &self,
        client_code: &str,
        platform: Platform,
        quantity: u32,
        prod_code: Option<&str>,
    ) -> Option<CreatedOrder> {
        match self.try_create_order(client_code, platform, quantity, prod_code).await {
            Ok(order) => order,
            Err(e) => {
                error!(client_code, error = %format!("{e:#}"), "failed to create order");
                None
            }
        }
    }

    async fn try_create_order(
        &self,
        client_code: &str,
        platform: Platform,
        quantity: u32,
        prod_code: Option<&str>,
    ) -> Result<Option<CreatedOrder>> {
        let Some(client) = ClientAccount::find_by_code(client_code, &self.pool).await? else {
            warn!(client_code, "client not found");
            return Ok(None);
        };

        let product_id = match prod_code {
            Some(code) => match Product::find_by_sku(code, &self.pool).await? {
                Some(product) => Some(product.id),
                None => {
                    warn!(prod_code = code, "product not found");
                    return Ok(None);
                }
            },
            None => None,
        };

        let clips =
            MediaAsset::eligible_for_client(client.id, platform, product_id, quantity, &self.pool)
                .await?;
        if clips.is_empty() {
            info!(client_code, %platform, "no eligible media");
            return Ok(None);
        }

        let mut tx = self.pool.begin().await.context("failed to open transaction")?;
        let order = Order::insert(client.id, platform, 0, &mut *tx).await?;

        let mut items = Vec::with_capacity(clips.len());
        for clip in &clips {
            let config = match clip.product_id {
                Some(product_id) => Product::find_by_id(product_id, &mut *tx)
                    .await?
                    .map(|p| p.posting_config()),
                None => None,
            };
            let payload = self.build_payload(clip, config.as_ref(), platform);

            let item =
                OrderItem::insert(order.id, clip.id, &payload.to_posting_config(), &mut *tx)
                    .await?;
            items.push(JobPayload {
                job_id: item.id,
                ..payload
            });
        }

        tx.commit().await.context("failed to commit order")?;

        info!(
            order_id = order.id,
            client_code,
            item_count = items.len(),
            "order created"
        );
        let _ = self.bus.publish(
            TOPIC_ORDER_CREATED,
            json!({
                "order_id": order.id,
                "client_code": client_code,
                "platform": platform,
                "item_count": items.len(),
            }),
            Some("OrderBuilder"),
        );

        Ok(Some(CreatedOrder {
            order_id: order.id,
            client_code: client_code.to_string(),
            platform,
            items,
            created_at: order.created_at,
        }))
    }

    fn build_payload(
        &self,
        clip: &MediaAsset,
        config: Option<&ProductConfig>,
        platform: Platform,
    ) -> JobPayload {
        let keep_first = platform.keep_first_tags();

        let (title, description, tags, affiliate, platform_config) = match config {
            Some(config) => {
                let title = if config.detail.name.is_empty() {
                    clip.filename.clone()
                } else {
                    config.detail.name.clone()
                };
                let description = self.vary_description(config.description());
                let tags = self.select_tags_subset(&config.detail.tags, keep_first);
                let affiliate = self.pick_affiliate(config.affiliate_links(platform));
                let platform_config = config
                    .platform(platform)
                    .map(|p| p.to_platform_config())
                    .unwrap_or_else(|| json!({ "privacy": "public" }));
                (title, description, tags, affiliate, platform_config)
            }
            None => (
                clip.filename.clone(),
                String::new(),
                Vec::new(),
                (String::new(), String::new()),
                json!({ "privacy": "public" }),
            ),
        };

        JobPayload {
            job_id: 0,
            media_id: clip.id,
            media_hash: clip.file_hash.clone(),
            title,
            description,
            tags,
            affiliate_url: affiliate.0,
            affiliate_label: affiliate.1,
            platform_config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> OrderBuilder {
        // Pool is unused by the randomisation primitives; connect lazily.
        let rt = tokio::runtime::Runtime::new().unwrap();
        let pool = rt.block_on(async { SqlitePool::connect_lazy("sqlite::memory:").unwrap() });
        OrderBuilder::with_rng(pool, EventBus::new(), StdRng::seed_from_u64(42))
    }

    fn tags(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("tag{i}")).collect()
    }

    #[test]
    fn shuffle_keeps_leading_tags_pinned() {
        let builder = builder();
        let input = tags(12);

        for _ in 0..20 {
            let shuffled = builder.shuffle_tags(&input, 3);
            assert_eq!(shuffled.len(), 12);
            assert_eq!(&shuffled[..3], &input[..3]);

            let mut rest: Vec<_> = shuffled[3..].to_vec();
            rest.sort();
            let mut expected: Vec<_> = input[3..].to_vec();
            expected.sort();
            assert_eq!(rest, expected);
        }
    }

    #[test]
    fn shuffle_of_short_list_is_identity() {
        let builder = builder();
        let input = tags(2);
        assert_eq!(builder.shuffle_tags(&input, 3), input);
    }

    #[test]
    fn subset_respects_bounds_and_pinned_prefix() {
        let builder = builder();
        let input = tags(20);

        for _ in 0..50 {
            let subset = builder.select_tags_subset(&input, 2);
            assert!(subset.len() >= MIN_TAGS);
            assert!(subset.len() <= MAX_TAGS);
            assert_eq!(&subset[..2], &input[..2]);
        }

        // A list at or under the minimum is shuffled but never truncated
        let small = tags(4);
        assert_eq!(builder.select_tags_subset(&small, 2).len(), 4);
    }

    #[test]
    fn affiliate_prefers_primary_roughly_seventy_percent() {
        let builder = builder();
        let links = vec![
            AffiliateLink {
                label: "primary".into(),
                url: "https://p".into(),
                is_primary: true,
            },
            AffiliateLink {
                label: "secondary".into(),
                url: "https://s".into(),
                is_primary: false,
            },
        ];

        let samples = 2000;
        let primary_hits = (0..samples)
            .filter(|_| builder.pick_affiliate(&links).1 == "primary")
            .count();
        let fraction = primary_hits as f64 / samples as f64;
        assert!(
            (fraction - 0.7).abs() < 0.05,
            "primary fraction was {fraction}"
        );
    }

    #[test]
    fn affiliate_fallbacks() {
        let builder = builder();
        assert_eq!(builder.pick_affiliate(&[]), (String::new(), String::new()));

        let only_secondary = vec![AffiliateLink {
            label: "s".into(),
            url: "https://s".into(),
            is_primary: false,
        }];
        assert_eq!(builder.pick_affiliate(&only_secondary).1, "s");

        let only_primary = vec![AffiliateLink {
            label: "p".into(),
            url: "https://p".into(),
            is_primary: true,
        }];
        assert_eq!(builder.pick_affiliate(&only_primary).1, "p");
    }

    #[test]
    fn varied_description_keeps_the_copy() {
        let builder = builder();
        for _ in 0..20 {
            let varied = builder.vary_description("Buy this soap now");
            assert!(varied.starts_with("Buy this soap now"));
        }
    }

    #[test]
    fn payload_round_trips_through_posting_config() {
        let builder = builder();
        let clip = MediaAsset {
            id: 9,
            product_id: None,
            filename: "clip.mp4".into(),
            file_path: "/media/clip.mp4".into(),
            file_hash: "ab".repeat(32),
            file_size: 1024,
            mime_type: Some("video/mp4".into()),
            duration: Some(12.5),
            created_at: Utc::now(),
        };
        let payload = builder.build_payload(&clip, None, Platform::Youtube);

        let restored = JobPayload::from_posting_config(
            7,
            clip.id,
            &clip.file_hash,
            &payload.to_posting_config(),
        );
        assert_eq!(restored.job_id, 7);
        assert_eq!(restored.title, "clip.mp4");
        assert_eq!(restored.media_url(), format!("/api/video/{}", clip.file_hash));
        assert_eq!(restored.platform_config["privacy"], "public");
    }
}
