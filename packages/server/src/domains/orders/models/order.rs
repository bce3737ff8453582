use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domains::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Cancelled,
}

/// Order - SQL persistence layer
///
/// Owns its items (cascade delete). `priority` orders competing orders when
/// an agent asks for work; higher wins.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Order {
    pub id: i64,
    pub client_id: i64,
    pub target_platform: Platform,
    pub status: OrderStatus,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub async fn find_by_id(
        id: i64,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(
        client_id: i64,
        target_platform: Platform,
        priority: i64,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO orders (client_id, target_platform, priority, status)
             VALUES (?, ?, ?, 'pending')
             RETURNING *",
        )
        .bind(client_id)
        .bind(target_platform)
        .bind(priority)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    pub async fn mark_completed(id: i64, executor: impl sqlx::SqliteExecutor<'_>) -> Result<()> {
        sqlx::query("UPDATE orders SET status = 'completed', completed_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Items of this order still awaiting a terminal state.
    pub async fn open_item_count(
        order_id: i64,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM order_items
             WHERE order_id = ? AND status IN ('new', 'processing')",
        )
        .bind(order_id)
        .fetch_one(executor)
        .await?;
        Ok(count.0)
    }

    pub async fn for_client(
        client_id: i64,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM orders WHERE client_id = ? ORDER BY created_at DESC",
        )
        .bind(client_id)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }
}
