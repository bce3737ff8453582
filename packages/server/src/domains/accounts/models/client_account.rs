use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::domains::Platform;

/// Agent account - SQL persistence layer
///
/// One row per remote agent; `client_code` is the stable identity the agent
/// presents on every envelope.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ClientAccount {
    pub id: i64,
    pub client_code: String,
    pub platform: Platform,
    pub is_active: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ClientAccount {
    pub async fn find_by_id(
        id: i64,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM client_accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_code(
        client_code: &str,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM client_accounts WHERE client_code = ?")
            .bind(client_code)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(
        client_code: &str,
        platform: Platform,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO client_accounts (client_code, platform) VALUES (?, ?) RETURNING *",
        )
        .bind(client_code)
        .bind(platform)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    /// Refresh the persisted liveness timestamp.
    pub async fn touch_last_seen(
        client_code: &str,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<()> {
        sqlx::query("UPDATE client_accounts SET last_seen = ? WHERE client_code = ?")
            .bind(Utc::now())
            .bind(client_code)
            .execute(executor)
            .await?;
        Ok(())
    }

    pub async fn all(executor: impl sqlx::SqliteExecutor<'_>) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM client_accounts ORDER BY client_code")
            .fetch_all(executor)
            .await
            .map_err(Into::into)
    }
}
