//! Payment gateway seam
//!
//! The gateway is an external collaborator behind a trait. A charge may
//! block for a few seconds and is NOT idempotent across transport
//! retries: callers must never re-invoke `charge` for the same
//! transaction.

pub mod mock;

pub use mock::MockGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal gateway decision for a charge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Success,
    Failed,
}

/// Charge request handed to the gateway
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub transaction_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub card_number: String,
    pub card_expiry: String,
    pub card_cvv: String,
    pub cardholder_name: String,
}

impl ChargeRequest {
    /// Last four digits for masked metadata.
    pub fn card_last_four(&self) -> String {
        let digits = self.card_number.len();
        self.card_number.chars().skip(digits.saturating_sub(4)).collect()
    }
}

/// Gateway response to a charge
#[derive(Debug, Clone)]
pub struct ChargeOutcome {
    pub gateway_reference: String,
    pub status: GatewayStatus,
    pub message: String,
    pub error_code: Option<String>,
}

/// Gateway response to a refund initiation
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund_reference: String,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> crate::Result<ChargeOutcome>;

    async fn refund(
        &self,
        transaction_id: Uuid,
        amount: f64,
        reason: &str,
    ) -> crate::Result<RefundOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_last_four() {
        let request = ChargeRequest {
            transaction_id: Uuid::new_v4(),
            amount: 29.0,
            currency: "AED".to_string(),
            card_number: "4242424242424242".to_string(),
            card_expiry: "12/25".to_string(),
            card_cvv: "123".to_string(),
            cardholder_name: "Test User".to_string(),
        };
        assert_eq!(request.card_last_four(), "4242");
    }
}
