use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

use crate::domains::catalog::config::{ProductConfig, ProductDetail};

/// Product - SQL persistence layer
///
/// `config` holds the structured posting configuration; products imported
/// without one are still postable through the row-field fallback.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub tags: Json<Vec<String>>,
    pub config: Option<Json<ProductConfig>>,
    pub category_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub async fn find_by_id(
        id: i64,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_sku(
        sku: &str,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM products WHERE sku = ?")
            .bind(sku)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(&self, executor: impl sqlx::SqliteExecutor<'_>) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO products (sku, name, description, tags, config, category_id)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(&self.sku)
        .bind(&self.name)
        .bind(&self.description)
        .bind(&self.tags)
        .bind(&self.config)
        .bind(self.category_id)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn all(executor: impl sqlx::SqliteExecutor<'_>) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM products ORDER BY sku")
            .fetch_all(executor)
            .await
            .map_err(Into::into)
    }

    /// The posting configuration, synthesised from row fields when the
    /// product was imported without one.
    pub fn posting_config(&self) -> ProductConfig {
        match &self.config {
            Some(config) => config.0.clone(),
            None => ProductConfig {
                detail: ProductDetail {
                    code: self.sku.clone(),
                    name: self.name.clone(),
                    short_description: String::new(),
                    long_description: self.description.clone(),
                    tags: self.tags.0.clone(),
                },
                platforms: Default::default(),
            },
        }
    }
}
