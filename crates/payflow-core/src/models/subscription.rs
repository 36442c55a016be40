//! Subscription entity and status lifecycle

use super::BillingCycle;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Created, awaiting first-payment outcome
    Pending,
    /// Paid and current
    Active,
    /// Trial period after the nominal trial charge
    Trial,
    /// Renewal payment failed, grace window
    PastDue,
    /// Cancelled by the user
    Cancelled,
    /// Revoked after a failed renewal
    Revoked,
}

impl SubscriptionStatus {
    /// Terminal statuses never transition again; events against them are
    /// recorded but apply no changes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Cancelled | SubscriptionStatus::Revoked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Revoked => "revoked",
        }
    }
}

/// Subscription entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: i64,
    pub plan_id: i32,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Currently usable: active or trial, and not past its end date.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Trial
        ) && self.end_date > Utc::now()
    }

    pub fn is_trial(&self) -> bool {
        self.status == SubscriptionStatus::Trial
    }

    /// End date after one cycle extension. Extensions only ever add days,
    /// so the end date is monotonically non-decreasing under renewals.
    pub fn extended_end_date(&self, cycle: BillingCycle) -> DateTime<Utc> {
        self.end_date + Duration::days(cycle.extension_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(status: SubscriptionStatus) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: Uuid::new_v4(),
            user_id: 1,
            plan_id: 1,
            status,
            start_date: now,
            end_date: now + Duration::days(30),
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(SubscriptionStatus::Cancelled.is_terminal());
        assert!(SubscriptionStatus::Revoked.is_terminal());
        assert!(!SubscriptionStatus::Pending.is_terminal());
        assert!(!SubscriptionStatus::PastDue.is_terminal());
    }

    #[test]
    fn test_active_window() {
        assert!(subscription(SubscriptionStatus::Active).is_active());
        assert!(subscription(SubscriptionStatus::Trial).is_active());
        assert!(!subscription(SubscriptionStatus::Pending).is_active());

        let mut expired = subscription(SubscriptionStatus::Active);
        expired.end_date = Utc::now() - Duration::days(1);
        assert!(!expired.is_active());
    }

    #[test]
    fn test_extension_is_monotonic() {
        let sub = subscription(SubscriptionStatus::Active);
        let monthly = sub.extended_end_date(BillingCycle::Monthly);
        let yearly = sub.extended_end_date(BillingCycle::Yearly);

        assert_eq!(monthly, sub.end_date + Duration::days(30));
        assert_eq!(yearly, sub.end_date + Duration::days(365));
        assert!(monthly > sub.end_date);
    }
}
