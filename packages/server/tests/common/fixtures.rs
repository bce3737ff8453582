//! Seed data builders for integration tests.

use chrono::Utc;
use server_core::domains::accounts::ClientAccount;
use server_core::domains::catalog::{
    AffiliateLink, MediaAsset, PlatformProfile, Product, ProductConfig, ProductDetail,
};
use server_core::domains::Platform;
use sqlx::types::Json;
use sqlx::SqlitePool;

pub async fn seed_client(pool: &SqlitePool, client_code: &str, platform: Platform) -> ClientAccount {
    ClientAccount::insert(client_code, platform, pool)
        .await
        .expect("failed to seed client")
}

/// Product with a full posting configuration: tags, platform profiles and
/// one primary plus one secondary affiliate link on the shopee profile.
pub async fn seed_product(pool: &SqlitePool, sku: &str, tags: &[&str]) -> Product {
    let config = ProductConfig {
        detail: ProductDetail {
            code: sku.to_string(),
            name: format!("{sku} name"),
            short_description: "Short copy".to_string(),
            long_description: "Long copy for posting".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        },
        platforms: [
            (
                "youtube".to_string(),
                PlatformProfile {
                    enabled: true,
                    privacy: "unlisted".to_string(),
                    ..Default::default()
                },
            ),
            (
                "shopee".to_string(),
                PlatformProfile {
                    enabled: true,
                    aff_urls: vec![
                        AffiliateLink {
                            label: "main store".to_string(),
                            url: "https://s.example/main".to_string(),
                            is_primary: true,
                        },
                        AffiliateLink {
                            label: "backup store".to_string(),
                            url: "https://s.example/backup".to_string(),
                            is_primary: false,
                        },
                    ],
                    ..Default::default()
                },
            ),
        ]
        .into_iter()
        .collect(),
    };

    let product = Product {
        id: 0,
        sku: sku.to_string(),
        name: format!("{sku} name"),
        description: "Long copy for posting".to_string(),
        tags: Json(tags.iter().map(|t| t.to_string()).collect()),
        config: Some(Json(config)),
        category_id: None,
        created_at: Utc::now(),
    };
    product.insert(pool).await.expect("failed to seed product")
}

/// Seed `count` media assets. `base` keeps hashes unique across calls.
pub async fn seed_media(
    pool: &SqlitePool,
    product_id: Option<i64>,
    count: usize,
    base: u64,
) -> Vec<MediaAsset> {
    let mut assets = Vec::with_capacity(count);
    for i in 0..count {
        let asset = MediaAsset {
            id: 0,
            product_id,
            filename: format!("clip_{base}_{i}.mp4"),
            file_path: format!("clips/clip_{base}_{i}.mp4"),
            file_hash: format!("{:064x}", base * 10_000 + i as u64),
            file_size: 1024,
            mime_type: Some("video/mp4".to_string()),
            duration: Some(30.0),
            created_at: Utc::now(),
        };
        assets.push(asset.insert(pool).await.expect("failed to seed media"));
    }
    assets
}
