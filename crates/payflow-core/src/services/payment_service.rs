//! Payment processing
//!
//! Owns the transaction lifecycle around a gateway charge and the
//! downstream notifications: a refund job for trial charges and a
//! subscription-update event for every terminal outcome. The event is
//! enqueued for the delivery worker (authoritative) and additionally
//! POSTed immediately best-effort; the peer's inbox absorbs the
//! duplicate.

use crate::jobs::{JobEnvelope, JobQueue, QUEUE_REFUND_INITIATION, QUEUE_SUBSCRIPTION_UPDATE};
use crate::models::{
    PaymentAction, PaymentEventPayload, PaymentOutcome, Transaction, TransactionMetadata,
    TransactionStatus,
};
use crate::payment::{ChargeRequest, GatewayStatus, PaymentGateway};
use crate::repository::{TransactionRepository, WebhookDeliveryRepository};
use crate::webhook::WebhookClient;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

const WEBHOOK_ENDPOINT: &str = "/v1/webhooks/payment";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaymentRequest {
    pub subscription_id: Option<Uuid>,

    #[validate(range(min = 0.0))]
    pub amount: f64,

    #[validate(length(min = 3, max = 3))]
    pub currency: String,

    #[validate(length(min = 12, max = 19))]
    pub card_number: String,

    #[validate(length(min = 4, max = 7))]
    pub card_expiry: String,

    #[validate(length(min = 3, max = 4))]
    pub card_cvv: String,

    #[validate(length(min = 1, max = 100))]
    pub cardholder_name: String,

    pub action: PaymentAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentResponse {
    pub transaction_id: Uuid,
    pub status: GatewayStatus,
    pub amount: f64,
    pub currency: String,
    pub gateway_reference: String,
    pub processed_at: DateTime<Utc>,
    pub message: String,
}

pub struct PaymentService {
    transactions: Arc<dyn TransactionRepository>,
    deliveries: Arc<dyn WebhookDeliveryRepository>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_client: WebhookClient,
    update_queue: JobQueue,
    refund_queue: JobQueue,
}

impl PaymentService {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        deliveries: Arc<dyn WebhookDeliveryRepository>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_client: WebhookClient,
        pool: crate::cache::RedisPool,
    ) -> Self {
        Self {
            transactions,
            deliveries,
            gateway,
            webhook_client,
            update_queue: JobQueue::new(pool.clone(), QUEUE_SUBSCRIPTION_UPDATE),
            refund_queue: JobQueue::new(pool, QUEUE_REFUND_INITIATION),
        }
    }

    /// Process one payment end to end.
    ///
    /// The gateway is invoked exactly once per transaction; callers must
    /// not re-submit the same transaction on transport failures.
    pub async fn process_payment(&self, request: &PaymentRequest) -> Result<PaymentResponse> {
        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        let amount = Decimal::from_f64(request.amount)
            .ok_or_else(|| Error::validation("amount is not a finite number"))?;

        let metadata = TransactionMetadata {
            trial: request.action == PaymentAction::Trial,
            renewal: request.action == PaymentAction::Renewal,
            card_last_four: Some(last_four(&request.card_number)),
            cardholder_name: Some(request.cardholder_name.clone()),
        };

        let transaction = self
            .transactions
            .create(request.subscription_id, amount, &request.currency, metadata)
            .await?;
        self.transactions.mark_processing(transaction.id).await?;

        let charge = ChargeRequest {
            transaction_id: transaction.id,
            amount: request.amount,
            currency: request.currency.clone(),
            card_number: request.card_number.clone(),
            card_expiry: request.card_expiry.clone(),
            card_cvv: request.card_cvv.clone(),
            cardholder_name: request.cardholder_name.clone(),
        };
        let outcome = self.gateway.charge(&charge).await?;

        let terminal_status = match outcome.status {
            GatewayStatus::Success => TransactionStatus::Success,
            GatewayStatus::Failed => TransactionStatus::Failed,
        };
        let error_message = match outcome.status {
            GatewayStatus::Failed => Some(outcome.message.as_str()),
            GatewayStatus::Success => None,
        };
        let transaction = self
            .transactions
            .mark_terminal(
                transaction.id,
                terminal_status,
                Some(&outcome.gateway_reference),
                error_message,
            )
            .await?;

        if request.action == PaymentAction::Trial && outcome.status == GatewayStatus::Success {
            self.queue_trial_refund(&transaction).await?;
        }

        self.publish_outcome(&transaction, request.action, outcome.status)
            .await?;

        info!(
            "Payment processed: transaction_id={}, status={:?}, amount={}",
            transaction.id, outcome.status, request.amount
        );

        Ok(PaymentResponse {
            transaction_id: transaction.id,
            status: outcome.status,
            amount: request.amount,
            currency: request.currency.clone(),
            gateway_reference: outcome.gateway_reference,
            processed_at: Utc::now(),
            message: outcome.message,
        })
    }

    pub async fn get_transaction(&self, transaction_id: Uuid) -> Result<Option<Transaction>> {
        self.transactions.find_by_id(transaction_id).await
    }

    pub async fn get_subscription_transactions(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<Transaction>> {
        self.transactions.list_by_subscription(subscription_id).await
    }

    /// Manual refund path (API): moves the transaction through
    /// `refund_initiated` with the gateway's reference.
    pub async fn initiate_refund(&self, transaction_id: Uuid) -> Result<Transaction> {
        let transaction = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("transaction {} not found", transaction_id)))?;

        if !transaction.is_successful() {
            return Err(Error::validation(format!(
                "transaction {} is not refundable",
                transaction_id
            )));
        }

        let amount = decimal_to_f64(transaction.amount);
        let refund = self
            .gateway
            .refund(transaction_id, amount, "manual_refund")
            .await?;

        self.transactions
            .mark_refund(
                transaction_id,
                TransactionStatus::RefundInitiated,
                Some(&refund.refund_reference),
            )
            .await
    }

    /// Worker path for trial refunds: the gateway call only, the
    /// original charge keeps its status.
    pub async fn process_trial_refund(&self, transaction_id: Uuid, amount: f64) -> Result<()> {
        let refund = self
            .gateway
            .refund(transaction_id, amount, "trial_refund")
            .await?;

        info!(
            "Trial refund processed: transaction_id={}, amount={}, reference={}",
            transaction_id, amount, refund.refund_reference
        );

        Ok(())
    }

    async fn queue_trial_refund(&self, transaction: &Transaction) -> Result<()> {
        let envelope = JobEnvelope::new(
            "refund",
            json!({
                "transaction_id": transaction.id,
                "amount": decimal_to_f64(transaction.amount),
                "reason": "trial_refund",
            }),
        )
        .with_correlation_id(transaction.id.to_string())
        .with_idempotency_key(format!("refund:{}", transaction.id));

        self.refund_queue.enqueue(&envelope).await?;
        Ok(())
    }

    /// Enqueue the subscription-update event and attempt one immediate
    /// delivery. The worker-driven delivery is authoritative; the
    /// immediate POST only shaves latency and its failure is logged,
    /// never propagated.
    async fn publish_outcome(
        &self,
        transaction: &Transaction,
        action: PaymentAction,
        status: GatewayStatus,
    ) -> Result<()> {
        let occurred_at = Utc::now();
        let payload = PaymentEventPayload {
            event_id: PaymentEventPayload::event_id_for(transaction.id, occurred_at),
            transaction_id: transaction.id,
            subscription_id: transaction.subscription_id,
            status: match status {
                GatewayStatus::Success => PaymentOutcome::Success,
                GatewayStatus::Failed => PaymentOutcome::Failed,
            },
            amount: decimal_to_f64(transaction.amount),
            currency: transaction.currency.clone(),
            occurred_at,
            action,
            metadata: serde_json::to_value(&transaction.metadata.0)?,
        };
        let payload_value = serde_json::to_value(&payload)?;

        let envelope = JobEnvelope::new(action.as_str(), payload_value.clone())
            .with_correlation_id(
                transaction
                    .subscription_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            )
            .with_idempotency_key(payload.event_id.clone());
        self.update_queue.enqueue(&envelope).await?;

        match self
            .webhook_client
            .send(WEBHOOK_ENDPOINT, &payload_value, Some(&payload.event_id))
            .await
        {
            Ok(_) => {
                self.record_delivery(&payload.event_id, Some(200), true).await;
            }
            Err(e) => {
                warn!(
                    "Immediate webhook send failed, worker will retry: event_id={}, error={}",
                    payload.event_id, e
                );
                self.record_delivery(&payload.event_id, None, false).await;
            }
        }

        Ok(())
    }

    async fn record_delivery(&self, event_id: &str, response_code: Option<i32>, completed: bool) {
        let target = format!("{}{}", self.webhook_client.base_url(), WEBHOOK_ENDPOINT);
        if let Err(e) = self
            .deliveries
            .record_outbound(event_id, &target, response_code, 1, completed)
            .await
        {
            warn!("Outbound delivery record failed (ignored): {}", e);
        }
    }
}

fn last_four(card_number: &str) -> String {
    let len = card_number.len();
    card_number.chars().skip(len.saturating_sub(4)).collect()
}

fn decimal_to_f64(amount: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    amount.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_four_masks_card() {
        assert_eq!(last_four("4242424242424242"), "4242");
        assert_eq!(last_four("123"), "123");
    }

    #[test]
    fn test_payment_request_validation() {
        let request = PaymentRequest {
            subscription_id: None,
            amount: 29.0,
            currency: "AED".to_string(),
            card_number: "4242424242424242".to_string(),
            card_expiry: "12/25".to_string(),
            card_cvv: "123".to_string(),
            cardholder_name: "Test User".to_string(),
            action: PaymentAction::Initial,
        };
        assert!(request.validate().is_ok());

        let mut bad = request.clone();
        bad.card_number = "42".to_string();
        assert!(bad.validate().is_err());

        let mut bad = request;
        bad.currency = "DIRHAM".to_string();
        assert!(bad.validate().is_err());
    }
}
