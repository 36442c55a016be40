//! Subscription repository
//!
//! Database operations for subscription lifecycle management and the
//! append-only event trail.

use crate::models::{
    NewSubscriptionEvent, Subscription, SubscriptionEvent, SubscriptionStatus,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync + 'static {
    /// Create a subscription in `pending`.
    async fn create(
        &self,
        user_id: i64,
        plan_id: i32,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Subscription>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subscription>>;

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Subscription>>;

    /// The user's current non-terminal active/trial subscription, if any.
    async fn find_active_by_user(&self, user_id: i64) -> Result<Option<Subscription>>;

    /// A pending subscription for the user, if any.
    async fn find_pending_by_user(&self, user_id: i64) -> Result<Option<Subscription>>;

    async fn update_status(&self, id: Uuid, status: SubscriptionStatus) -> Result<Subscription>;

    async fn update_plan(&self, id: Uuid, plan_id: i32) -> Result<Subscription>;

    async fn update_end_date(&self, id: Uuid, end_date: DateTime<Utc>) -> Result<Subscription>;

    async fn cancel(&self, id: Uuid) -> Result<Subscription>;

    /// Append an audit event.
    async fn append_event(&self, event: NewSubscriptionEvent) -> Result<()>;

    async fn events_for(&self, subscription_id: Uuid) -> Result<Vec<SubscriptionEvent>>;
}

/// PostgreSQL implementation of the subscription repository
#[derive(Clone)]
pub struct PostgresSubscriptionRepository {
    pool: sqlx::PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn create(
        &self,
        user_id: i64,
        plan_id: i32,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_id, status, start_date, end_date, created_at, updated_at
            ) VALUES ($1, $2, $3, 'pending', $4, $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(plan_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(subscription)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subscription>> {
        let subscription =
            sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(subscription)
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Subscription>> {
        let subscriptions = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subscriptions)
    }

    async fn find_active_by_user(&self, user_id: i64) -> Result<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions
            WHERE user_id = $1
              AND status IN ('active', 'trial')
              AND end_date > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription)
    }

    async fn find_pending_by_user(&self, user_id: i64) -> Result<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions
            WHERE user_id = $1 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(subscription)
    }

    async fn update_status(&self, id: Uuid, status: SubscriptionStatus) -> Result<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "UPDATE subscriptions SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(status)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(subscription)
    }

    async fn update_plan(&self, id: Uuid, plan_id: i32) -> Result<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "UPDATE subscriptions SET plan_id = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(plan_id)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(subscription)
    }

    async fn update_end_date(&self, id: Uuid, end_date: DateTime<Utc>) -> Result<Subscription> {
        // GREATEST keeps the end date monotonic under reordered renewals.
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET end_date = GREATEST(end_date, $1), updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(end_date)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(subscription)
    }

    async fn cancel(&self, id: Uuid) -> Result<Subscription> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions
            SET status = 'cancelled', canceled_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(subscription)
    }

    async fn append_event(&self, event: NewSubscriptionEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_events (
                subscription_id, event_type, transaction_id, old_plan_id, new_plan_id,
                effective_at, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            "#,
        )
        .bind(event.subscription_id)
        .bind(&event.event_type)
        .bind(event.transaction_id)
        .bind(event.old_plan_id)
        .bind(event.new_plan_id)
        .bind(event.effective_at)
        .bind(sqlx::types::Json(event.metadata))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn events_for(&self, subscription_id: Uuid) -> Result<Vec<SubscriptionEvent>> {
        let events = sqlx::query_as::<_, SubscriptionEvent>(
            "SELECT * FROM subscription_events WHERE subscription_id = $1 ORDER BY created_at",
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }
}
