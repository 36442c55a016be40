//! Subscription lifecycle service
//!
//! Synchronous persistence plus asynchronous payment initiation: every
//! create/change/renew operation writes its records, appends an audit
//! event, and enqueues an enveloped job for the payment side.

use crate::jobs::{
    JobEnvelope, JobQueue, QUEUE_PAYMENT_INITIATION, QUEUE_TRIAL_PAYMENT,
};
use crate::models::{
    NewSubscriptionEvent, PaymentAction, Plan, Subscription,
};
use crate::repository::{PlanRepository, SubscriptionRepository, UserRepository};
use crate::{Error, Result};
use chrono::{Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// Nominal charge for trial activation; refunded immediately on success.
const TRIAL_CHARGE_AMOUNT: f64 = 1.0;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    #[validate(range(min = 1))]
    pub user_id: i64,

    #[validate(range(min = 1))]
    pub plan_id: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTrialRequest {
    #[validate(range(min = 1))]
    pub user_id: i64,

    #[validate(range(min = 1))]
    pub trial_plan_id: i32,
}

pub struct SubscriptionService {
    users: Arc<dyn UserRepository>,
    plans: Arc<dyn PlanRepository>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    payment_queue: JobQueue,
    trial_queue: JobQueue,
}

/// Hour-bucketed idempotency key: re-submissions of the same operation
/// within the hour collapse onto one key.
fn idempotency_key(subscription_id: Uuid, action: PaymentAction) -> String {
    let bucket = Utc::now().timestamp() / 3600;
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", subscription_id, action, bucket).as_bytes());
    hex::encode(hasher.finalize())
}

impl SubscriptionService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        plans: Arc<dyn PlanRepository>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        pool: crate::cache::RedisPool,
    ) -> Self {
        Self {
            users,
            plans,
            subscriptions,
            payment_queue: JobQueue::new(pool.clone(), QUEUE_PAYMENT_INITIATION),
            trial_queue: JobQueue::new(pool, QUEUE_TRIAL_PAYMENT),
        }
    }

    async fn active_plan(&self, plan_id: i32) -> Result<Plan> {
        let plan = self
            .plans
            .find_by_id(plan_id)
            .await?
            .filter(|plan| plan.is_active)
            .ok_or_else(|| Error::not_found(format!("plan {} not found or inactive", plan_id)))?;
        Ok(plan)
    }

    async fn ensure_user_exists(&self, user_id: i64) -> Result<()> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("user {} not found", user_id)))?;
        Ok(())
    }

    async fn ensure_no_active_subscription(&self, user_id: i64) -> Result<()> {
        if self.subscriptions.find_active_by_user(user_id).await?.is_some() {
            return Err(Error::validation(format!(
                "user {} already has an active subscription",
                user_id
            )));
        }
        Ok(())
    }

    /// Create a subscription in `pending` and queue the first payment.
    pub async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> Result<Subscription> {
        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        self.ensure_user_exists(request.user_id).await?;
        let plan = self.active_plan(request.plan_id).await?;
        self.ensure_no_active_subscription(request.user_id).await?;

        let start_date = Utc::now();
        let end_date = start_date + Duration::days(plan.billing_cycle.extension_days());

        let subscription = self
            .subscriptions
            .create(request.user_id, plan.id, start_date, end_date)
            .await?;

        let amount = plan.price.to_f64().unwrap_or(0.0);
        self.subscriptions
            .append_event(
                NewSubscriptionEvent::new(subscription.id, "created").with_metadata(json!({
                    "plan_name": plan.name,
                    "amount": amount,
                })),
            )
            .await?;

        self.queue_payment_initiation(subscription.id, amount, &plan.currency, PaymentAction::Initial)
            .await?;

        info!(
            "Subscription created: subscription_id={}, user_id={}, plan_id={}",
            subscription.id, request.user_id, plan.id
        );

        Ok(subscription)
    }

    /// Create a trial subscription in `pending` and queue the nominal
    /// trial charge.
    pub async fn create_trial_subscription(
        &self,
        request: &CreateTrialRequest,
    ) -> Result<Subscription> {
        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        self.ensure_user_exists(request.user_id).await?;
        let plan = self.active_plan(request.trial_plan_id).await?;

        if !plan.is_trial_plan() {
            return Err(Error::validation(format!(
                "plan {} is not a trial plan",
                plan.id
            )));
        }

        self.ensure_no_active_subscription(request.user_id).await?;

        if self
            .subscriptions
            .find_pending_by_user(request.user_id)
            .await?
            .is_some()
        {
            return Err(Error::validation(format!(
                "user {} already has a pending subscription",
                request.user_id
            )));
        }

        let start_date = Utc::now();
        let trial_days = plan.trial_period_days();
        let end_date = start_date + Duration::days(trial_days);

        let subscription = self
            .subscriptions
            .create(request.user_id, plan.id, start_date, end_date)
            .await?;

        self.subscriptions
            .append_event(
                NewSubscriptionEvent::new(subscription.id, "trial_started").with_metadata(json!({
                    "trial_days": trial_days,
                    "start_date": start_date,
                    "end_date": end_date,
                })),
            )
            .await?;

        let envelope = JobEnvelope::new(
            PaymentAction::Trial.as_str(),
            json!({
                "subscription_id": subscription.id,
                "amount": TRIAL_CHARGE_AMOUNT,
                "currency": plan.currency,
                "trial": true,
            }),
        )
        .with_correlation_id(subscription.id.to_string())
        .with_idempotency_key(idempotency_key(subscription.id, PaymentAction::Trial));

        self.trial_queue.enqueue(&envelope).await?;

        info!(
            "Trial subscription created: subscription_id={}, user_id={}, trial_days={}",
            subscription.id, request.user_id, trial_days
        );

        Ok(subscription)
    }

    /// Queue an upgrade payment for a plan change.
    pub async fn change_plan(&self, subscription_id: Uuid, new_plan_id: i32) -> Result<Subscription> {
        let subscription = self
            .subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("subscription {} not found", subscription_id)))?;

        if !subscription.is_active() {
            return Err(Error::validation(format!(
                "subscription {} is not active",
                subscription_id
            )));
        }

        let new_plan = self.active_plan(new_plan_id).await?;
        let amount = new_plan.price.to_f64().unwrap_or(0.0);

        let envelope = JobEnvelope::new(
            PaymentAction::Upgrade.as_str(),
            json!({
                "subscription_id": subscription_id,
                "old_plan_id": subscription.plan_id,
                "new_plan_id": new_plan_id,
                "amount": amount,
                "currency": new_plan.currency,
            }),
        )
        .with_correlation_id(subscription_id.to_string())
        .with_idempotency_key(idempotency_key(subscription_id, PaymentAction::Upgrade));

        self.payment_queue.enqueue(&envelope).await?;

        self.subscriptions
            .append_event(
                NewSubscriptionEvent::new(subscription_id, "plan_change_scheduled")
                    .with_plan_change(subscription.plan_id, new_plan_id)
                    .with_metadata(json!({ "amount": amount })),
            )
            .await?;

        info!(
            "Plan change queued: subscription_id={}, old_plan={}, new_plan={}",
            subscription_id, subscription.plan_id, new_plan_id
        );

        Ok(subscription)
    }

    /// Cancel immediately.
    pub async fn cancel_subscription(&self, subscription_id: Uuid) -> Result<Subscription> {
        let subscription = self
            .subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("subscription {} not found", subscription_id)))?;

        if subscription.status.is_terminal() {
            return Err(Error::validation(format!(
                "subscription {} is already terminal",
                subscription_id
            )));
        }

        let cancelled = self.subscriptions.cancel(subscription_id).await?;

        self.subscriptions
            .append_event(
                NewSubscriptionEvent::new(subscription_id, "cancelled").with_metadata(json!({
                    "cancelled_by": "user",
                    "cancellation_reason": "immediate",
                })),
            )
            .await?;

        info!("Subscription cancelled: subscription_id={}", subscription_id);

        Ok(cancelled)
    }

    pub async fn get_subscription(&self, subscription_id: Uuid) -> Result<Option<Subscription>> {
        self.subscriptions.find_by_id(subscription_id).await
    }

    pub async fn get_user_subscriptions(&self, user_id: i64) -> Result<Vec<Subscription>> {
        self.subscriptions.list_by_user(user_id).await
    }

    /// Queue a renewal payment. For trials with a configured renewal
    /// plan the renewal charges that plan's price; the plan switch
    /// itself happens when the payment outcome arrives.
    pub async fn process_renewal(&self, subscription_id: Uuid) -> Result<()> {
        let subscription = self
            .subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("subscription {} not found", subscription_id)))?;

        let plan = self.active_plan(subscription.plan_id).await?;

        let renewal_amount = if subscription.is_trial() {
            match self.plans.find_renewal_plan(plan.id).await? {
                Some(renewal_plan) => renewal_plan.price.to_f64().unwrap_or(0.0),
                None => plan.price.to_f64().unwrap_or(0.0),
            }
        } else {
            plan.price.to_f64().unwrap_or(0.0)
        };

        self.queue_payment_initiation(
            subscription_id,
            renewal_amount,
            &plan.currency,
            PaymentAction::Renewal,
        )
        .await?;

        info!(
            "Subscription renewal queued: subscription_id={}, amount={}",
            subscription_id, renewal_amount
        );

        Ok(())
    }

    async fn queue_payment_initiation(
        &self,
        subscription_id: Uuid,
        amount: f64,
        currency: &str,
        action: PaymentAction,
    ) -> Result<()> {
        let envelope = JobEnvelope::new(
            action.as_str(),
            json!({
                "subscription_id": subscription_id,
                "amount": amount,
                "currency": currency,
                "renewal": action == PaymentAction::Renewal,
            }),
        )
        .with_correlation_id(subscription_id.to_string())
        .with_idempotency_key(idempotency_key(subscription_id, action));

        self.payment_queue.enqueue(&envelope).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_is_stable_within_hour() {
        let id = Uuid::new_v4();
        let first = idempotency_key(id, PaymentAction::Initial);
        let second = idempotency_key(id, PaymentAction::Initial);
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_idempotency_key_varies_by_action() {
        let id = Uuid::new_v4();
        assert_ne!(
            idempotency_key(id, PaymentAction::Initial),
            idempotency_key(id, PaymentAction::Renewal)
        );
    }
}
