use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::domains::Platform;

/// Media asset - SQL persistence layer
///
/// `file_hash` is the content address (SHA-256 hex) and the deduplication
/// key across imports.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct MediaAsset {
    pub id: i64,
    pub product_id: Option<i64>,
    pub filename: String,
    pub file_path: String,
    pub file_hash: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub duration: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl MediaAsset {
    pub async fn find_by_id(
        id: i64,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM media_assets WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_hash(
        file_hash: &str,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM media_assets WHERE file_hash = ?")
            .bind(file_hash)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(&self, executor: impl sqlx::SqliteExecutor<'_>) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO media_assets
                (product_id, filename, file_path, file_hash, file_size, mime_type, duration)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(self.product_id)
        .bind(&self.filename)
        .bind(&self.file_path)
        .bind(&self.file_hash)
        .bind(self.file_size)
        .bind(&self.mime_type)
        .bind(self.duration)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    /// Media the client has NOT yet posted to the platform, in random order.
    ///
    /// The `NOT IN` subtraction against posting_history is what keeps
    /// already-published media out of new orders; `ORDER BY RANDOM()` gives
    /// uniform selection without replacement in one statement.
    pub async fn eligible_for_client(
        client_id: i64,
        platform: Platform,
        product_id: Option<i64>,
        limit: u32,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Vec<Self>> {
        let rows = match product_id {
            Some(product_id) => {
                sqlx::query_as::<_, Self>(
                    "SELECT * FROM media_assets
                     WHERE product_id = ?
                       AND id NOT IN (
                           SELECT media_id FROM posting_history
                           WHERE client_id = ? AND platform = ?
                       )
                     ORDER BY RANDOM()
                     LIMIT ?",
                )
                .bind(product_id)
                .bind(client_id)
                .bind(platform)
                .bind(limit)
                .fetch_all(executor)
                .await?
            }
            None => {
                sqlx::query_as::<_, Self>(
                    "SELECT * FROM media_assets
                     WHERE id NOT IN (
                           SELECT media_id FROM posting_history
                           WHERE client_id = ? AND platform = ?
                       )
                     ORDER BY RANDOM()
                     LIMIT ?",
                )
                .bind(client_id)
                .bind(platform)
                .bind(limit)
                .fetch_all(executor)
                .await?
            }
        };
        Ok(rows)
    }
}
