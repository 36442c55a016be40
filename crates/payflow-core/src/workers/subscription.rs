//! Subscription-service queue handlers

use crate::jobs::{HandlerOutcome, JobEnvelope, JobHandler};
use crate::models::PaymentAction;
use crate::services::AuthService;
use crate::Error;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

// Initiation charges run against the gateway's always-succeeding test
// card; the user's real card never transits the queue.
const INITIATION_CARD: &str = "4242424242424242";
const INITIATION_EXPIRY: &str = "12/25";
const INITIATION_CVV: &str = "123";
const INITIATION_HOLDER: &str = "Initiation User";

#[derive(Debug, PartialEq)]
pub(crate) struct InitiationFields {
    pub subscription_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub action: PaymentAction,
    pub old_plan_id: Option<i64>,
    pub new_plan_id: Option<i64>,
}

pub(crate) fn parse_initiation(envelope: &JobEnvelope) -> Result<InitiationFields, Error> {
    let action: PaymentAction = serde_json::from_value(Value::String(envelope.action.clone()))
        .map_err(|_| Error::validation(format!("unknown payment action '{}'", envelope.action)))?;

    let payload = &envelope.payload;

    let subscription_id = payload
        .get("subscription_id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::validation("payment initiation without subscription_id"))?
        .parse::<Uuid>()
        .map_err(|e| Error::validation(format!("invalid subscription_id: {}", e)))?;

    let amount = payload
        .get("amount")
        .and_then(Value::as_f64)
        .ok_or_else(|| Error::validation("payment initiation without amount"))?;

    let currency = payload
        .get("currency")
        .and_then(Value::as_str)
        .unwrap_or("AED")
        .to_string();

    Ok(InitiationFields {
        subscription_id,
        amount,
        currency,
        action,
        old_plan_id: payload.get("old_plan_id").and_then(Value::as_i64),
        new_plan_id: payload.get("new_plan_id").and_then(Value::as_i64),
    })
}

/// Calls the payment service's internal processing endpoint with a
/// service token. Serves the payment-initiation, trial-payment, and
/// plan-change queues; the envelope action distinguishes them.
pub struct PaymentInitiationHandler {
    http: reqwest::Client,
    payment_service_url: String,
    auth: AuthService,
}

impl PaymentInitiationHandler {
    pub fn new(
        payment_service_url: impl Into<String>,
        auth: AuthService,
        timeout_seconds: u64,
    ) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            http,
            payment_service_url: payment_service_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }
}

#[async_trait]
impl JobHandler for PaymentInitiationHandler {
    async fn handle(&self, envelope: &JobEnvelope) -> HandlerOutcome {
        let fields = match parse_initiation(envelope) {
            Ok(fields) => fields,
            Err(e) => return HandlerOutcome::Fatal(e),
        };

        let token = match self.auth.create_service_token("subscription-service") {
            Ok(token) => token,
            Err(e) => return HandlerOutcome::Fatal(e),
        };

        let body = json!({
            "subscription_id": fields.subscription_id,
            "amount": fields.amount,
            "currency": fields.currency,
            "card_number": INITIATION_CARD,
            "card_expiry": INITIATION_EXPIRY,
            "card_cvv": INITIATION_CVV,
            "cardholder_name": INITIATION_HOLDER,
            "action": fields.action,
            "old_plan_id": fields.old_plan_id,
            "new_plan_id": fields.new_plan_id,
        });

        let url = format!("{}/v1/payments/internal/process", self.payment_service_url);

        match self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!(
                    "Payment initiation dispatched: subscription_id={}, action={}",
                    fields.subscription_id, fields.action
                );
                HandlerOutcome::Success
            }
            Ok(response) if response.status().is_client_error() => {
                // 402 is a gateway decline: the outcome webhook carries
                // it back, nothing to retry here.
                let status = response.status();
                if status.as_u16() == 402 {
                    info!(
                        "Payment initiation declined: subscription_id={}, action={}",
                        fields.subscription_id, fields.action
                    );
                    return HandlerOutcome::Success;
                }
                HandlerOutcome::Fatal(Error::validation(format!(
                    "payment service rejected initiation with {}",
                    status
                )))
            }
            Ok(response) => {
                warn!(
                    "Payment initiation failed: subscription_id={}, status={}",
                    fields.subscription_id,
                    response.status()
                );
                HandlerOutcome::Retry(Error::network(format!(
                    "payment service returned {}",
                    response.status()
                )))
            }
            Err(e) => HandlerOutcome::Retry(Error::Network(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_initiation() {
        let id = Uuid::new_v4();
        let envelope = JobEnvelope::new(
            "renewal",
            json!({
                "subscription_id": id,
                "amount": 49.5,
                "currency": "AED",
                "renewal": true,
            }),
        );

        let fields = parse_initiation(&envelope).unwrap();
        assert_eq!(fields.subscription_id, id);
        assert_eq!(fields.amount, 49.5);
        assert_eq!(fields.action, PaymentAction::Renewal);
        assert_eq!(fields.new_plan_id, None);
    }

    #[test]
    fn test_parse_initiation_upgrade_carries_plan_ids() {
        let envelope = JobEnvelope::new(
            "upgrade",
            json!({
                "subscription_id": Uuid::new_v4(),
                "amount": 99.0,
                "old_plan_id": 1,
                "new_plan_id": 2,
            }),
        );

        let fields = parse_initiation(&envelope).unwrap();
        assert_eq!(fields.action, PaymentAction::Upgrade);
        assert_eq!(fields.old_plan_id, Some(1));
        assert_eq!(fields.new_plan_id, Some(2));
        assert_eq!(fields.currency, "AED");
    }

    #[test]
    fn test_parse_initiation_rejects_unknown_action() {
        let envelope = JobEnvelope::new(
            "mystery",
            json!({"subscription_id": Uuid::new_v4(), "amount": 1.0}),
        );
        assert!(parse_initiation(&envelope).is_err());
    }

    #[test]
    fn test_parse_initiation_rejects_missing_fields() {
        let envelope = JobEnvelope::new("initial", json!({"amount": 1.0}));
        assert!(parse_initiation(&envelope).is_err());

        let envelope =
            JobEnvelope::new("initial", json!({"subscription_id": Uuid::new_v4()}));
        assert!(parse_initiation(&envelope).is_err());
    }
}
