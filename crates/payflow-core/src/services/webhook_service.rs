//! Inbound payment webhooks: inbox idempotency and the subscription
//! state machine
//!
//! Every verified event first lands in the inbox keyed by `event_id`. A
//! processed row short-circuits to "duplicate" with no side effects, so
//! redelivery (worker retries plus the producer's best-effort immediate
//! POST) collapses into one state transition. The transition itself is a
//! pure decision over `(status, outcome, action, plan shape)` applied to
//! the repositories afterwards.

use crate::models::{
    NewSubscriptionEvent, PaymentAction, PaymentEventPayload, PaymentOutcome, Plan, Subscription,
    SubscriptionStatus,
};
use crate::repository::{InboxRepository, PlanRepository, SubscriptionRepository};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Response to a webhook POST.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub status: String,
    pub message: String,
    pub event_id: String,
}

impl WebhookResponse {
    fn processed(event_id: &str) -> Self {
        Self {
            status: "processed".to_string(),
            message: "Webhook processed successfully".to_string(),
            event_id: event_id.to_string(),
        }
    }

    fn duplicate(event_id: &str) -> Self {
        Self {
            status: "duplicate".to_string(),
            message: "Event already processed".to_string(),
            event_id: event_id.to_string(),
        }
    }
}

/// Pure state-machine decision for one payment event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub new_status: Option<SubscriptionStatus>,
    pub extend_cycle: bool,
    pub switch_to_renewal_plan: bool,
    pub event_type: &'static str,
}

impl Transition {
    fn record_only(event_type: &'static str) -> Self {
        Self {
            new_status: None,
            extend_cycle: false,
            switch_to_renewal_plan: false,
            event_type,
        }
    }
}

/// Decide the subscription transition for a payment outcome.
pub fn decide_transition(
    current: SubscriptionStatus,
    outcome: PaymentOutcome,
    action: PaymentAction,
    plan_is_trial: bool,
    has_renewal_plan: bool,
) -> Transition {
    if current.is_terminal() {
        return Transition::record_only(match outcome {
            PaymentOutcome::Success => "payment_success",
            PaymentOutcome::Failed => "payment_failed",
        });
    }

    match (current, outcome) {
        (SubscriptionStatus::Pending, PaymentOutcome::Success) => Transition {
            new_status: Some(if plan_is_trial {
                SubscriptionStatus::Trial
            } else {
                SubscriptionStatus::Active
            }),
            extend_cycle: false,
            switch_to_renewal_plan: false,
            event_type: "payment_success",
        },
        (SubscriptionStatus::PastDue, PaymentOutcome::Success) => Transition {
            new_status: Some(SubscriptionStatus::Active),
            extend_cycle: false,
            switch_to_renewal_plan: false,
            event_type: "payment_success",
        },
        (SubscriptionStatus::Active, PaymentOutcome::Success) => Transition {
            new_status: None,
            extend_cycle: true,
            switch_to_renewal_plan: false,
            event_type: "renewed",
        },
        (SubscriptionStatus::Trial, PaymentOutcome::Success) => {
            if action != PaymentAction::Renewal {
                // A late duplicate of the activation payment; the
                // pending->trial row already happened.
                return Transition::record_only("payment_success");
            }
            Transition {
                new_status: has_renewal_plan.then_some(SubscriptionStatus::Active),
                extend_cycle: true,
                switch_to_renewal_plan: has_renewal_plan,
                event_type: "renewed",
            }
        }
        // First payment failed: stay pending, the payment-initiation
        // queue retries per policy.
        (SubscriptionStatus::Pending, PaymentOutcome::Failed) => {
            Transition::record_only("payment_failed")
        }
        (SubscriptionStatus::Active | SubscriptionStatus::Trial, PaymentOutcome::Failed) => {
            Transition {
                new_status: Some(SubscriptionStatus::Revoked),
                extend_cycle: false,
                switch_to_renewal_plan: false,
                event_type: "payment_failed",
            }
        }
        (SubscriptionStatus::PastDue, PaymentOutcome::Failed) => {
            Transition::record_only("payment_failed")
        }
        // Terminal statuses are handled above.
        (SubscriptionStatus::Cancelled | SubscriptionStatus::Revoked, _) => {
            Transition::record_only("payment_failed")
        }
    }
}

pub struct WebhookService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    plans: Arc<dyn PlanRepository>,
    inbox: Arc<dyn InboxRepository>,
}

impl WebhookService {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        plans: Arc<dyn PlanRepository>,
        inbox: Arc<dyn InboxRepository>,
    ) -> Self {
        Self {
            subscriptions,
            plans,
            inbox,
        }
    }

    /// Ingest a verified payment event.
    pub async fn process_payment_webhook(
        &self,
        payload: &PaymentEventPayload,
    ) -> Result<WebhookResponse> {
        let raw = serde_json::to_value(payload)?;

        let inbox_id = match self.inbox.find_by_event_id(&payload.event_id).await? {
            Some(row) if row.processed => {
                info!("Webhook already processed: event_id={}", payload.event_id);
                return Ok(WebhookResponse::duplicate(&payload.event_id));
            }
            Some(row) => {
                self.inbox.update_payload(row.id, &raw).await?;
                row.id
            }
            None => self.inbox.insert(&payload.event_id, &raw).await?.id,
        };

        match self.apply_event(payload).await {
            Ok(()) => {
                self.inbox.mark_processed(inbox_id).await?;
                info!(
                    "Webhook event processed: event_id={}, status={:?}",
                    payload.event_id, payload.status
                );
                Ok(WebhookResponse::processed(&payload.event_id))
            }
            Err(e) => {
                warn!(
                    "Webhook event failed: event_id={}, error={}",
                    payload.event_id, e
                );
                self.inbox
                    .record_failure(inbox_id, &e.to_string())
                    .await?;
                Err(e)
            }
        }
    }

    /// Processing status for an event id (ops surface).
    pub async fn get_webhook_status(
        &self,
        event_id: &str,
    ) -> Result<Option<crate::models::WebhookInbox>> {
        self.inbox.find_by_event_id(event_id).await
    }

    async fn load_subscription(&self, payload: &PaymentEventPayload) -> Result<(Subscription, Plan)> {
        let subscription_id = payload
            .subscription_id
            .ok_or_else(|| Error::validation("payment event without subscription_id"))?;

        let subscription = self
            .subscriptions
            .find_by_id(subscription_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("subscription {} not found", subscription_id)))?;

        let plan = self
            .plans
            .find_by_id(subscription.plan_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("plan {} not found", subscription.plan_id)))?;

        Ok((subscription, plan))
    }

    async fn apply_event(&self, payload: &PaymentEventPayload) -> Result<()> {
        let (subscription, plan) = self.load_subscription(payload).await?;

        let renewal_plan = if plan.is_trial_plan() {
            self.plans.find_renewal_plan(plan.id).await?
        } else {
            None
        };

        let transition = decide_transition(
            subscription.status,
            payload.status,
            payload.action,
            plan.is_trial_plan(),
            renewal_plan.is_some(),
        );

        let mut old_plan_id = None;
        let mut new_plan_id = None;

        if transition.extend_cycle {
            let extended = subscription.extended_end_date(plan.billing_cycle);
            self.subscriptions
                .update_end_date(subscription.id, extended)
                .await?;
        }

        if transition.switch_to_renewal_plan {
            if let Some(renewal_plan) = &renewal_plan {
                self.subscriptions
                    .update_plan(subscription.id, renewal_plan.id)
                    .await?;
                old_plan_id = Some(plan.id);
                new_plan_id = Some(renewal_plan.id);
            }
        }

        let status_change = match transition.new_status {
            Some(new_status) => {
                self.subscriptions
                    .update_status(subscription.id, new_status)
                    .await?;
                format!("{} -> {}", subscription.status.as_str(), new_status.as_str())
            }
            None => format!(
                "{} -> {}",
                subscription.status.as_str(),
                subscription.status.as_str()
            ),
        };

        let mut event =
            NewSubscriptionEvent::new(subscription.id, transition.event_type)
                .with_transaction(payload.transaction_id)
                .with_metadata(json!({
                    "amount": payload.amount,
                    "action": payload.action,
                    "status_change": status_change,
                }));
        if let (Some(old), Some(new)) = (old_plan_id, new_plan_id) {
            event = event.with_plan_change(old, new);
        }

        self.subscriptions.append_event(event).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_success_activates() {
        let t = decide_transition(
            SubscriptionStatus::Pending,
            PaymentOutcome::Success,
            PaymentAction::Initial,
            false,
            false,
        );
        assert_eq!(t.new_status, Some(SubscriptionStatus::Active));
        assert!(!t.extend_cycle);
        assert_eq!(t.event_type, "payment_success");
    }

    #[test]
    fn test_pending_success_on_trial_plan_enters_trial() {
        let t = decide_transition(
            SubscriptionStatus::Pending,
            PaymentOutcome::Success,
            PaymentAction::Trial,
            true,
            true,
        );
        assert_eq!(t.new_status, Some(SubscriptionStatus::Trial));
        assert!(!t.switch_to_renewal_plan);
    }

    #[test]
    fn test_past_due_success_reactivates() {
        let t = decide_transition(
            SubscriptionStatus::PastDue,
            PaymentOutcome::Success,
            PaymentAction::Renewal,
            false,
            false,
        );
        assert_eq!(t.new_status, Some(SubscriptionStatus::Active));
    }

    #[test]
    fn test_active_renewal_extends() {
        let t = decide_transition(
            SubscriptionStatus::Active,
            PaymentOutcome::Success,
            PaymentAction::Renewal,
            false,
            false,
        );
        assert_eq!(t.new_status, None);
        assert!(t.extend_cycle);
        assert_eq!(t.event_type, "renewed");
    }

    #[test]
    fn test_trial_renewal_switches_to_renewal_plan() {
        let t = decide_transition(
            SubscriptionStatus::Trial,
            PaymentOutcome::Success,
            PaymentAction::Renewal,
            true,
            true,
        );
        assert_eq!(t.new_status, Some(SubscriptionStatus::Active));
        assert!(t.extend_cycle);
        assert!(t.switch_to_renewal_plan);
    }

    #[test]
    fn test_trial_renewal_without_renewal_plan_stays_trial() {
        let t = decide_transition(
            SubscriptionStatus::Trial,
            PaymentOutcome::Success,
            PaymentAction::Renewal,
            true,
            false,
        );
        assert_eq!(t.new_status, None);
        assert!(t.extend_cycle);
        assert!(!t.switch_to_renewal_plan);
    }

    #[test]
    fn test_trial_duplicate_activation_records_only() {
        let t = decide_transition(
            SubscriptionStatus::Trial,
            PaymentOutcome::Success,
            PaymentAction::Trial,
            true,
            true,
        );
        assert_eq!(t, Transition::record_only("payment_success"));
    }

    #[test]
    fn test_pending_failure_stays_pending() {
        let t = decide_transition(
            SubscriptionStatus::Pending,
            PaymentOutcome::Failed,
            PaymentAction::Initial,
            false,
            false,
        );
        assert_eq!(t, Transition::record_only("payment_failed"));
    }

    #[test]
    fn test_renewal_failure_revokes() {
        for status in [SubscriptionStatus::Active, SubscriptionStatus::Trial] {
            let t = decide_transition(
                status,
                PaymentOutcome::Failed,
                PaymentAction::Renewal,
                false,
                false,
            );
            assert_eq!(t.new_status, Some(SubscriptionStatus::Revoked));
        }
    }

    #[test]
    fn test_terminal_statuses_record_only() {
        for status in [SubscriptionStatus::Cancelled, SubscriptionStatus::Revoked] {
            let t = decide_transition(
                status,
                PaymentOutcome::Success,
                PaymentAction::Renewal,
                false,
                true,
            );
            assert_eq!(t.new_status, None);
            assert!(!t.extend_cycle);
            assert!(!t.switch_to_renewal_plan);
        }
    }
}
