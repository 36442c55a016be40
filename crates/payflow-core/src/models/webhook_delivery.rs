//! Payment-side webhook bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Delivery record per outbound target URL; tracks the last response
/// code and how many attempts it took.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookOutboundRequest {
    pub id: i64,
    pub event_id: String,
    pub target_url: String,
    pub response_code: Option<i32>,
    pub attempts: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Inbound gateway event, unique per transaction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GatewayWebhookRequest {
    pub id: i64,
    pub transaction_id: Uuid,
    pub event_type: String,
    pub payload: Json<Value>,
    pub created_at: DateTime<Utc>,
}
