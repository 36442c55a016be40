//! Payment-service queue handlers

use crate::jobs::{HandlerOutcome, JobEnvelope, JobHandler};
use crate::repository::WebhookDeliveryRepository;
use crate::services::PaymentService;
use crate::webhook::WebhookClient;
use crate::Error;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

const WEBHOOK_ENDPOINT: &str = "/v1/webhooks/payment";

/// Delivers subscription-update events to the subscription service.
///
/// A 4xx from the peer means the event itself is malformed and retrying
/// cannot help; everything transport-shaped goes back through the
/// backoff path.
pub struct SubscriptionUpdateHandler {
    client: WebhookClient,
    deliveries: Option<Arc<dyn WebhookDeliveryRepository>>,
}

impl SubscriptionUpdateHandler {
    pub fn new(client: WebhookClient, deliveries: Option<Arc<dyn WebhookDeliveryRepository>>) -> Self {
        Self { client, deliveries }
    }

    async fn record(&self, event_id: &str, response_code: Option<i32>, attempts: u32, completed: bool) {
        if let Some(deliveries) = &self.deliveries {
            let target = format!("{}{}", self.client.base_url(), WEBHOOK_ENDPOINT);
            if let Err(e) = deliveries
                .record_outbound(event_id, &target, response_code, attempts as i32, completed)
                .await
            {
                warn!("Outbound delivery record failed (ignored): {}", e);
            }
        }
    }
}

#[async_trait]
impl JobHandler for SubscriptionUpdateHandler {
    async fn handle(&self, envelope: &JobEnvelope) -> HandlerOutcome {
        let event_id = envelope
            .payload
            .get("event_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| envelope.idempotency_key.clone())
            .unwrap_or_else(|| envelope.id.clone());

        match self
            .client
            .send(WEBHOOK_ENDPOINT, &envelope.payload, Some(&event_id))
            .await
        {
            Ok(_) => {
                self.record(&event_id, Some(200), envelope.attempts + 1, true).await;
                HandlerOutcome::Success
            }
            Err(e) => {
                self.record(&event_id, None, envelope.attempts + 1, false).await;
                HandlerOutcome::from_error(e.into())
            }
        }
    }
}

/// Executes refund-initiation jobs against the gateway.
pub struct RefundInitiationHandler {
    payments: Arc<PaymentService>,
}

impl RefundInitiationHandler {
    pub fn new(payments: Arc<PaymentService>) -> Self {
        Self { payments }
    }
}

pub(crate) fn parse_refund_payload(payload: &Value) -> Result<(Uuid, f64), Error> {
    let transaction_id = payload
        .get("transaction_id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::validation("refund job without transaction_id"))?
        .parse::<Uuid>()
        .map_err(|e| Error::validation(format!("invalid transaction_id: {}", e)))?;

    let amount = payload
        .get("amount")
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::validation("refund job without amount"))?;

    Ok((transaction_id, amount))
}

#[async_trait]
impl JobHandler for RefundInitiationHandler {
    async fn handle(&self, envelope: &JobEnvelope) -> HandlerOutcome {
        let (transaction_id, amount) = match parse_refund_payload(&envelope.payload) {
            Ok(parsed) => parsed,
            Err(e) => return HandlerOutcome::Fatal(e),
        };

        match self.payments.process_trial_refund(transaction_id, amount).await {
            Ok(()) => HandlerOutcome::Success,
            Err(e) => HandlerOutcome::from_error(e),
        }
    }
}
