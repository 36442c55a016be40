//! Webhook inbox repository

use crate::models::WebhookInbox;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait InboxRepository: Send + Sync + 'static {
    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<WebhookInbox>>;

    /// Insert a new unprocessed row for the event.
    async fn insert(&self, event_id: &str, payload: &Value) -> Result<WebhookInbox>;

    /// Replace the stored payload of an unprocessed row.
    async fn update_payload(&self, id: i64, payload: &Value) -> Result<()>;

    async fn mark_processed(&self, id: i64) -> Result<()>;

    /// Bump the retry count and record the failure.
    async fn record_failure(&self, id: i64, error_message: &str) -> Result<()>;
}

/// PostgreSQL implementation of the inbox repository
#[derive(Clone)]
pub struct PostgresInboxRepository {
    pool: sqlx::PgPool,
}

impl PostgresInboxRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InboxRepository for PostgresInboxRepository {
    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<WebhookInbox>> {
        let row = sqlx::query_as::<_, WebhookInbox>(
            "SELECT * FROM webhook_inbox WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert(&self, event_id: &str, payload: &Value) -> Result<WebhookInbox> {
        let row = sqlx::query_as::<_, WebhookInbox>(
            r#"
            INSERT INTO webhook_inbox (event_id, payload, processed, retry_count, created_at, updated_at)
            VALUES ($1, $2, false, 0, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(sqlx::types::Json(payload))
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_payload(&self, id: i64, payload: &Value) -> Result<()> {
        sqlx::query("UPDATE webhook_inbox SET payload = $1, updated_at = NOW() WHERE id = $2")
            .bind(sqlx::types::Json(payload))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_processed(&self, id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_inbox
            SET processed = true, processed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_failure(&self, id: i64, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE webhook_inbox
            SET retry_count = retry_count + 1, error_message = $1, updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
