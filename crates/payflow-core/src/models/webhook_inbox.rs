//! Inbound webhook inbox
//!
//! The unique constraint on `event_id` is load-bearing: it is what makes
//! duplicate deliveries (worker retries plus the best-effort immediate
//! POST) collapse into a single processed event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

/// Idempotent ingestion record for a received payment event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookInbox {
    pub id: i64,
    pub event_id: String,
    pub payload: Json<Value>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
