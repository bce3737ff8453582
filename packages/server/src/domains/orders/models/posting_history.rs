use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::domains::Platform;

/// Posting ledger - SQL persistence layer
///
/// The `uq_posting_history` unique index over (client_id, media_id,
/// platform) is the authoritative duplicate gate. In-memory checks are an
/// optimisation; this constraint is the contract.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct PostingHistory {
    pub id: i64,
    pub client_id: i64,
    pub media_id: i64,
    pub platform: Platform,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    pub posted_at: DateTime<Utc>,
}

impl PostingHistory {
    /// Insert a ledger row. A duplicate (client, media, platform) surfaces
    /// as a unique-violation error; see [`PostingHistory::is_unique_violation`].
    pub async fn insert(
        client_id: i64,
        media_id: i64,
        platform: Platform,
        external_id: Option<&str>,
        external_url: Option<&str>,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO posting_history (client_id, media_id, platform, external_id, external_url)
             VALUES (?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(client_id)
        .bind(media_id)
        .bind(platform)
        .bind(external_id)
        .bind(external_url)
        .fetch_one(executor)
        .await
        .map_err(Into::into)
    }

    /// Whether an error is the `uq_posting_history` constraint firing.
    pub fn is_unique_violation(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    }

    pub async fn exists(
        client_id: i64,
        media_id: i64,
        platform: Platform,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<bool> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM posting_history
             WHERE client_id = ? AND media_id = ? AND platform = ?",
        )
        .bind(client_id)
        .bind(media_id)
        .bind(platform)
        .fetch_one(executor)
        .await?;
        Ok(count.0 > 0)
    }

    pub async fn for_client(
        client_id: i64,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM posting_history WHERE client_id = ? ORDER BY posted_at DESC",
        )
        .bind(client_id)
        .fetch_all(executor)
        .await
        .map_err(Into::into)
    }
}
