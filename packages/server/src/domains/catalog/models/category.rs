use anyhow::Result;
use chrono::{DateTime, Utc};

/// Product category - SQL persistence layer
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub async fn find_by_name(
        name: &str,
        executor: impl sqlx::SqliteExecutor<'_>,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM categories WHERE name = ?")
            .bind(name)
            .fetch_optional(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn insert(name: &str, executor: impl sqlx::SqliteExecutor<'_>) -> Result<Self> {
        sqlx::query_as::<_, Self>("INSERT INTO categories (name) VALUES (?) RETURNING *")
            .bind(name)
            .fetch_one(executor)
            .await
            .map_err(Into::into)
    }

    pub async fn all(executor: impl sqlx::SqliteExecutor<'_>) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM categories ORDER BY name")
            .fetch_all(executor)
            .await
            .map_err(Into::into)
    }
}
