//! Persistent mirror of the fast-path usage counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row per `(user_id, feature_name)`; the pair is unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserUsage {
    pub id: i64,
    pub user_id: i64,
    pub feature_name: String,
    pub usage_count: i64,
    pub reset_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserUsage {
    /// Whether the current usage window has passed its reset point.
    pub fn is_expired(&self) -> bool {
        self.reset_at <= Utc::now()
    }

    pub fn remaining(&self, limit: i64) -> i64 {
        (limit - self.usage_count).max(0)
    }
}
