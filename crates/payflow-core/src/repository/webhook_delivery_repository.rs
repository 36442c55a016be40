//! Payment-side webhook bookkeeping repository

use crate::models::{GatewayWebhookRequest, WebhookOutboundRequest};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

#[async_trait]
pub trait WebhookDeliveryRepository: Send + Sync + 'static {
    /// Record one delivery attempt for a target URL.
    async fn record_outbound(
        &self,
        event_id: &str,
        target_url: &str,
        response_code: Option<i32>,
        attempts: i32,
        completed: bool,
    ) -> Result<WebhookOutboundRequest>;

    /// Record an inbound gateway event. Returns `None` when an event for
    /// the transaction already exists (unique per transaction).
    async fn record_gateway_event(
        &self,
        transaction_id: Uuid,
        event_type: &str,
        payload: &Value,
    ) -> Result<Option<GatewayWebhookRequest>>;
}

/// PostgreSQL implementation
#[derive(Clone)]
pub struct PostgresWebhookDeliveryRepository {
    pool: sqlx::PgPool,
}

impl PostgresWebhookDeliveryRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookDeliveryRepository for PostgresWebhookDeliveryRepository {
    async fn record_outbound(
        &self,
        event_id: &str,
        target_url: &str,
        response_code: Option<i32>,
        attempts: i32,
        completed: bool,
    ) -> Result<WebhookOutboundRequest> {
        let row = sqlx::query_as::<_, WebhookOutboundRequest>(
            r#"
            INSERT INTO webhook_outbound_requests (
                event_id, target_url, response_code, attempts, completed_at, created_at
            ) VALUES ($1, $2, $3, $4, CASE WHEN $5 THEN NOW() END, NOW())
            RETURNING *
            "#,
        )
        .bind(event_id)
        .bind(target_url)
        .bind(response_code)
        .bind(attempts)
        .bind(completed)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn record_gateway_event(
        &self,
        transaction_id: Uuid,
        event_type: &str,
        payload: &Value,
    ) -> Result<Option<GatewayWebhookRequest>> {
        let row = sqlx::query_as::<_, GatewayWebhookRequest>(
            r#"
            INSERT INTO gateway_webhook_requests (transaction_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (transaction_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(transaction_id)
        .bind(event_type)
        .bind(sqlx::types::Json(payload))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
