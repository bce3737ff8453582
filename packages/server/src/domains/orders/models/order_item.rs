use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::domains::Platform;

/// Lifecycle states of an order item (a "job" from the agent's side).
///
/// Legal transitions: `new -> processing -> {done, failed, skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    New,
    Processing,
    Done,
    Failed,
    Skipped,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Failed | ItemStatus::Skipped)
    }
}

/// Order item - SQL persistence layer
///
/// `posting_config` is the payload snapshot computed at order assembly, so
/// the agent sees the same randomised copy on every re-offer.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub media_id: i64,
    pub status: ItemStatus,
    pub posting_config: Json<serde_json::Value>,
    pub attempt_count: i64,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_log: Option<String>,
}

impl OrderItem {
    pub async fn find_by_id(
        id: i64,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM order_items WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(
        order_id: i64,
        media_id: i64,
        posting_config: &serde_json::Value,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO order_items (order_id, media_id, status, posting_config)
             VALUES (?, ?, 'new', ?)
             RETURNING *",
        )
        .bind(order_id)
        .bind(media_id)
        .bind(Json(posting_config))
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn for_order(
        order_id: i64,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM order_items WHERE order_id = ? ORDER BY id")
            .bind(order_id)
            .fetch_all(executor)
            .await
            .map_err(Into::into)
    }

    /// Oldest still-`new` items for a client on a platform, best order first.
    pub async fn next_new_for_client(
        client_id: i64,
        platform: Platform,
        limit: u32,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT oi.* FROM order_items oi
             JOIN orders o ON o.id = oi.order_id
             WHERE o.client_id = ? AND o.target_platform = ? AND oi.status = 'new'
             ORDER BY o.priority DESC, o.created_at ASC, oi.id ASC
             LIMIT ?",
        )
        .bind(client_id)
        .bind(platform)
        .bind(limit)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }

    /// `new -> processing`. Returns false when the item was not `new`.
    pub async fn mark_processing(id: i64, executor: impl sqlx::SqliteExecutor<'_>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE order_items
             SET status = 'processing', attempt_count = attempt_count + 1
             WHERE id = ? AND status = 'new'",
        )
        .bind(id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_done(id: i64, executor: impl sqlx::SqliteExecutor<'_>) -> Result<()> {
        sqlx::query("UPDATE order_items SET status = 'done', completed_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(
        id: i64,
        error_log: &str,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE order_items SET status = 'failed', completed_at = ?, error_log = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(error_log)
        .bind(id)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn mark_skipped(id: i64, executor: impl sqlx::SqliteExecutor<'_>) -> Result<()> {
        sqlx::query("UPDATE order_items SET status = 'skipped', completed_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Stamp the moment the item was handed to an agent.
    pub async fn touch_assigned(id: i64, executor: impl sqlx::SqliteExecutor<'_>) -> Result<()> {
        sqlx::query("UPDATE order_items SET assigned_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }
}
