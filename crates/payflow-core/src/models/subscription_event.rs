//! Append-only subscription audit trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted audit row, ordered by creation time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionEvent {
    pub id: i64,
    pub subscription_id: Uuid,
    pub event_type: String,
    pub transaction_id: Option<Uuid>,
    pub old_plan_id: Option<i32>,
    pub new_plan_id: Option<i32>,
    pub effective_at: Option<DateTime<Utc>>,
    pub metadata: Json<Value>,
    pub created_at: DateTime<Utc>,
}

/// Insertion form for a new audit row.
#[derive(Debug, Clone)]
pub struct NewSubscriptionEvent {
    pub subscription_id: Uuid,
    pub event_type: String,
    pub transaction_id: Option<Uuid>,
    pub old_plan_id: Option<i32>,
    pub new_plan_id: Option<i32>,
    pub effective_at: Option<DateTime<Utc>>,
    pub metadata: Value,
}

impl NewSubscriptionEvent {
    pub fn new(subscription_id: Uuid, event_type: impl Into<String>) -> Self {
        Self {
            subscription_id,
            event_type: event_type.into(),
            transaction_id: None,
            old_plan_id: None,
            new_plan_id: None,
            effective_at: Some(Utc::now()),
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_transaction(mut self, transaction_id: Uuid) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn with_plan_change(mut self, old_plan_id: i32, new_plan_id: i32) -> Self {
        self.old_plan_id = Some(old_plan_id);
        self.new_plan_id = Some(new_plan_id);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}
