//! Usage-sync queue handler

use crate::jobs::{HandlerOutcome, JobEnvelope, JobHandler};
use crate::services::UsageService;
use crate::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub(crate) struct SyncFields {
    pub user_id: i64,
    pub feature_name: String,
    pub usage_count: i64,
    pub reset_at: DateTime<Utc>,
}

pub(crate) fn parse_sync(payload: &Value) -> Result<SyncFields, Error> {
    let user_id = payload
        .get("user_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::validation("usage sync without user_id"))?;

    let feature_name = payload
        .get("feature_name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::validation("usage sync without feature_name"))?
        .to_string();

    let usage_count = payload
        .get("usage_count")
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::validation("usage sync without usage_count"))?;

    let reset_at = payload
        .get("reset_at")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
        .ok_or_else(|| Error::validation("usage sync without valid reset_at"))?;

    Ok(SyncFields {
        user_id,
        feature_name,
        usage_count,
        reset_at,
    })
}

/// Mirrors fast-path counter snapshots into the `user_usage` table.
pub struct UsageSyncHandler {
    usage: Arc<UsageService>,
}

impl UsageSyncHandler {
    pub fn new(usage: Arc<UsageService>) -> Self {
        Self { usage }
    }
}

#[async_trait]
impl JobHandler for UsageSyncHandler {
    async fn handle(&self, envelope: &JobEnvelope) -> HandlerOutcome {
        let fields = match parse_sync(&envelope.payload) {
            Ok(fields) => fields,
            Err(e) => return HandlerOutcome::Fatal(e),
        };

        match self
            .usage
            .sync_to_database(
                fields.user_id,
                &fields.feature_name,
                fields.usage_count,
                fields.reset_at,
            )
            .await
        {
            Ok(row) => {
                debug!(
                    "Usage synced: user_id={}, feature={}, count={}",
                    row.user_id, row.feature_name, row.usage_count
                );
                HandlerOutcome::Success
            }
            Err(e) => HandlerOutcome::from_error(e),
        }
    }
}
