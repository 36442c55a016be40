//! Usage metering
//!
//! The allow/deny decision runs entirely against the atomic Redis
//! counter; the database mirror catches up asynchronously through
//! `q:sub:usage_sync`. Limits come from the user's active subscription's
//! plan; a feature missing from the plan's limit bag denies outright.

use crate::cache::UsageCounter;
use crate::jobs::{JobEnvelope, JobQueue, QUEUE_USAGE_SYNC};
use crate::models::UserUsage;
use crate::repository::{PlanRepository, SubscriptionRepository, UsageRepository};
use crate::{Error, Result};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// First day of the next calendar month at 00:00 UTC.
pub fn first_of_next_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Outcome of a meter call, shaped for the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageCheckResponse {
    pub allowed: bool,
    pub current_usage: i64,
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

/// Per-feature usage report row.
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub feature_name: String,
    pub usage_count: i64,
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

pub struct UsageService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    usage: Arc<dyn UsageRepository>,
    counter: UsageCounter,
    sync_queue: JobQueue,
}

impl UsageService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
        usage: Arc<dyn UsageRepository>,
        counter: UsageCounter,
        sync_queue: JobQueue,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            usage,
            counter,
            sync_queue,
        }
    }

    /// Atomically consume `delta` units of a feature for a user.
    pub async fn use_feature(
        &self,
        user_id: i64,
        feature: &str,
        delta: i64,
    ) -> Result<UsageCheckResponse> {
        let subscription = self
            .subscriptions
            .find_active_by_user(user_id)
            .await?
            .ok_or_else(|| Error::validation(format!("no active subscription for user {}", user_id)))?;

        let plan = self
            .plans
            .find_by_id(subscription.plan_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("plan {} not found", subscription.plan_id)))?;

        let limit = plan
            .feature_limit(feature)
            .filter(|limit| *limit > 0)
            .ok_or_else(|| {
                Error::validation(format!("feature '{}' unavailable in current plan", feature))
            })?;

        let reset_at = first_of_next_month(Utc::now());
        let decision = self
            .counter
            .check_and_increment(user_id, feature, limit, delta, reset_at.timestamp())
            .await?;

        if decision.allowed {
            // The database mirror catches up through the sync queue;
            // enqueue failures only delay the mirror.
            let envelope = JobEnvelope::new(
                "usage_sync",
                json!({
                    "user_id": user_id,
                    "feature_name": feature,
                    "usage_count": decision.current,
                    "reset_at": reset_at,
                }),
            )
            .with_correlation_id(user_id.to_string())
            .with_idempotency_key(format!("usage:{}:{}:{}", user_id, feature, decision.current));

            if let Err(e) = self.sync_queue.enqueue(&envelope).await {
                warn!(
                    "Usage sync enqueue failed: user_id={}, feature={}, error={}",
                    user_id, feature, e
                );
            }
        }

        Ok(UsageCheckResponse {
            allowed: decision.allowed,
            current_usage: decision.current,
            limit: decision.limit,
            remaining: (decision.limit - decision.current).max(0),
            reset_at,
        })
    }

    /// Persist a counter snapshot to the database mirror (worker path).
    pub async fn sync_to_database(
        &self,
        user_id: i64,
        feature: &str,
        usage_count: i64,
        reset_at: DateTime<Utc>,
    ) -> Result<UserUsage> {
        self.usage.upsert(user_id, feature, usage_count, reset_at).await
    }

    /// Usage report across all features the user has touched.
    pub async fn get_user_usage(&self, user_id: i64) -> Result<Vec<UsageReport>> {
        let limits = match self.subscriptions.find_active_by_user(user_id).await? {
            Some(subscription) => self
                .plans
                .find_by_id(subscription.plan_id)
                .await?
                .map(|plan| plan.feature_limits().clone())
                .unwrap_or_default(),
            None => Default::default(),
        };

        let rows = self.usage.list_for_user(user_id).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let limit = limits.get(&row.feature_name).copied().unwrap_or(0);
                UsageReport {
                    remaining: row.remaining(limit),
                    limit,
                    feature_name: row.feature_name,
                    usage_count: row.usage_count,
                    reset_at: row.reset_at,
                }
            })
            .collect())
    }

    /// Zero a user's counters in both the mirror and the fast path
    /// (admin reset).
    pub async fn reset_user_usage(&self, user_id: i64, feature: Option<&str>) -> Result<u64> {
        let reset_at = first_of_next_month(Utc::now());

        match feature {
            Some(feature) => {
                self.usage.upsert(user_id, feature, 0, reset_at).await?;
                self.counter.clear(user_id, feature).await?;
                Ok(1)
            }
            None => {
                let count = self.usage.reset_all(user_id, reset_at).await?;
                for row in self.usage.list_for_user(user_id).await? {
                    self.counter.clear(user_id, &row.feature_name).await?;
                }
                Ok(count)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_first_of_next_month() {
        let mid_march = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).single().unwrap();
        let reset = first_of_next_month(mid_march);
        assert_eq!((reset.year(), reset.month(), reset.day()), (2024, 4, 1));
        assert_eq!((reset.hour(), reset.minute(), reset.second()), (0, 0, 0));
    }

    #[test]
    fn test_first_of_next_month_year_rollover() {
        let december = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).single().unwrap();
        let reset = first_of_next_month(december);
        assert_eq!((reset.year(), reset.month(), reset.day()), (2025, 1, 1));
    }
}
