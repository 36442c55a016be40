//! Usage repository
//!
//! Persistent mirror of the Redis usage counters. The unique
//! `(user_id, feature_name)` pair makes the sync an upsert.

use crate::models::UserUsage;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait UsageRepository: Send + Sync + 'static {
    async fn find(&self, user_id: i64, feature: &str) -> Result<Option<UserUsage>>;

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<UserUsage>>;

    /// Insert or overwrite the counter mirror for `(user_id, feature)`.
    async fn upsert(
        &self,
        user_id: i64,
        feature: &str,
        usage_count: i64,
        reset_at: DateTime<Utc>,
    ) -> Result<UserUsage>;

    /// Zero all counters for a user (admin reset).
    async fn reset_all(&self, user_id: i64, reset_at: DateTime<Utc>) -> Result<u64>;
}

/// PostgreSQL implementation of the usage repository
#[derive(Clone)]
pub struct PostgresUsageRepository {
    pool: sqlx::PgPool,
}

impl PostgresUsageRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for PostgresUsageRepository {
    async fn find(&self, user_id: i64, feature: &str) -> Result<Option<UserUsage>> {
        let usage = sqlx::query_as::<_, UserUsage>(
            "SELECT * FROM user_usage WHERE user_id = $1 AND feature_name = $2",
        )
        .bind(user_id)
        .bind(feature)
        .fetch_optional(&self.pool)
        .await?;
        Ok(usage)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<UserUsage>> {
        let usage = sqlx::query_as::<_, UserUsage>(
            "SELECT * FROM user_usage WHERE user_id = $1 ORDER BY feature_name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(usage)
    }

    async fn upsert(
        &self,
        user_id: i64,
        feature: &str,
        usage_count: i64,
        reset_at: DateTime<Utc>,
    ) -> Result<UserUsage> {
        let usage = sqlx::query_as::<_, UserUsage>(
            r#"
            INSERT INTO user_usage (user_id, feature_name, usage_count, reset_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (user_id, feature_name)
            DO UPDATE SET usage_count = EXCLUDED.usage_count,
                          reset_at = EXCLUDED.reset_at,
                          updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(feature)
        .bind(usage_count)
        .bind(reset_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(usage)
    }

    async fn reset_all(&self, user_id: i64, reset_at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE user_usage
            SET usage_count = 0, reset_at = $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(reset_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
