//! Payment event wire payload
//!
//! The payload carried on `q:pay:subscription_update` and POSTed to
//! `/v1/webhooks/payment`. `action` is required: consumers reject events
//! without it rather than inferring the payment kind from flags.

use super::{PaymentAction, PaymentOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentEventPayload {
    pub event_id: String,
    pub transaction_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub status: PaymentOutcome,
    pub amount: f64,
    pub currency: String,
    pub occurred_at: DateTime<Utc>,
    pub action: PaymentAction,
    #[serde(default)]
    pub metadata: Value,
}

impl PaymentEventPayload {
    /// Event id format: `payment_<transaction>_<epoch>`.
    pub fn event_id_for(transaction_id: Uuid, occurred_at: DateTime<Utc>) -> String {
        format!("payment_{}_{}", transaction_id, occurred_at.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_without_action_is_rejected() {
        let raw = r#"{
            "event_id": "payment_x_1",
            "transaction_id": "7f4df01e-93a8-4a3f-9b6f-0e16310158a1",
            "subscription_id": null,
            "status": "success",
            "amount": 29.0,
            "currency": "AED",
            "occurred_at": "2024-01-01T00:00:00Z",
            "metadata": {}
        }"#;

        assert!(serde_json::from_str::<PaymentEventPayload>(raw).is_err());
    }

    #[test]
    fn test_event_roundtrip() {
        let raw = r#"{
            "event_id": "payment_x_1",
            "transaction_id": "7f4df01e-93a8-4a3f-9b6f-0e16310158a1",
            "subscription_id": "2da2e96a-13a2-4e7f-8f64-53d462a3fa2b",
            "status": "failed",
            "amount": 29.0,
            "currency": "AED",
            "occurred_at": "2024-01-01T00:00:00Z",
            "action": "renewal",
            "metadata": {"renewal": true}
        }"#;

        let event: PaymentEventPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(event.status, PaymentOutcome::Failed);
        assert_eq!(event.action, PaymentAction::Renewal);

        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: PaymentEventPayload = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
    }
}
