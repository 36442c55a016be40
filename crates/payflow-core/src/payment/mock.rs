//! Mock payment gateway
//!
//! Simulates gateway behavior for development and testing: a delay
//! window, a tunable success rate, an always-succeeding card, and an
//! always-declining card.

use crate::config::GatewayConfig;
use crate::payment::{ChargeOutcome, ChargeRequest, GatewayStatus, PaymentGateway, RefundOutcome};
use async_trait::async_trait;
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, Duration};
use tracing::info;
use uuid::Uuid;

const DECLINE_CODES: [&str; 4] = [
    "insufficient_funds",
    "card_declined",
    "expired_card",
    "invalid_cvv",
];

pub struct MockGateway {
    config: GatewayConfig,
}

impl MockGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    fn reference(prefix: &str) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let suffix: u16 = rand::thread_rng().gen_range(1000..10000);
        format!("{}_{}{}", prefix, millis, suffix)
    }

    fn simulated_delay(&self, min_ms: u64) -> Duration {
        let max = self.config.max_delay_ms.max(min_ms);
        let ms = rand::thread_rng().gen_range(min_ms..=max);
        Duration::from_millis(ms)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn charge(&self, request: &ChargeRequest) -> crate::Result<ChargeOutcome> {
        // Draw all randomness before suspending.
        let delay = self.simulated_delay(self.config.min_delay_ms);
        let reference = Self::reference("gw");
        let roll: f64 = rand::thread_rng().gen();
        let decline_code = DECLINE_CODES[rand::thread_rng().gen_range(0..DECLINE_CODES.len())];

        sleep(delay).await;

        if request.card_number == self.config.fail_card {
            return Ok(ChargeOutcome {
                gateway_reference: reference,
                status: GatewayStatus::Failed,
                message: "Payment failed: card_declined".to_string(),
                error_code: Some("card_declined".to_string()),
            });
        }

        let success =
            request.card_number == self.config.success_card || roll < self.config.success_rate;

        if success {
            Ok(ChargeOutcome {
                gateway_reference: reference,
                status: GatewayStatus::Success,
                message: "Payment processed successfully".to_string(),
                error_code: None,
            })
        } else {
            Ok(ChargeOutcome {
                gateway_reference: reference,
                status: GatewayStatus::Failed,
                message: format!("Payment failed: {}", decline_code),
                error_code: Some(decline_code.to_string()),
            })
        }
    }

    async fn refund(
        &self,
        transaction_id: Uuid,
        amount: f64,
        reason: &str,
    ) -> crate::Result<RefundOutcome> {
        let delay = self.simulated_delay(self.config.min_delay_ms / 2);
        let reference = Self::reference("rf");

        sleep(delay).await;

        info!(
            "Refund initiated: transaction_id={}, amount={}, reason={}, reference={}",
            transaction_id, amount, reason, reference
        );

        Ok(RefundOutcome {
            refund_reference: reference,
            status: "initiated".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config(success_rate: f64) -> GatewayConfig {
        GatewayConfig {
            min_delay_ms: 0,
            max_delay_ms: 1,
            success_rate,
            ..GatewayConfig::default()
        }
    }

    fn charge_request(card: &str) -> ChargeRequest {
        ChargeRequest {
            transaction_id: Uuid::new_v4(),
            amount: 29.0,
            currency: "AED".to_string(),
            card_number: card.to_string(),
            card_expiry: "12/25".to_string(),
            card_cvv: "123".to_string(),
            cardholder_name: "Test User".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fail_card_always_declines() {
        let gateway = MockGateway::new(fast_config(1.0));

        let outcome = gateway
            .charge(&charge_request("4000000000000002"))
            .await
            .unwrap();

        assert_eq!(outcome.status, GatewayStatus::Failed);
        assert_eq!(outcome.error_code.as_deref(), Some("card_declined"));
        assert!(outcome.gateway_reference.starts_with("gw_"));
    }

    #[tokio::test]
    async fn test_success_card_always_succeeds() {
        let gateway = MockGateway::new(fast_config(0.0));

        let outcome = gateway
            .charge(&charge_request("4242424242424242"))
            .await
            .unwrap();

        assert_eq!(outcome.status, GatewayStatus::Success);
        assert_eq!(outcome.error_code, None);
    }

    #[tokio::test]
    async fn test_other_cards_fail_at_zero_success_rate() {
        let gateway = MockGateway::new(fast_config(0.0));

        let outcome = gateway
            .charge(&charge_request("5555444433332222"))
            .await
            .unwrap();

        assert_eq!(outcome.status, GatewayStatus::Failed);
        assert!(outcome.error_code.is_some());
    }

    #[tokio::test]
    async fn test_refund_initiates() {
        let gateway = MockGateway::new(fast_config(1.0));

        let outcome = gateway
            .refund(Uuid::new_v4(), 1.0, "trial_refund")
            .await
            .unwrap();

        assert_eq!(outcome.status, "initiated");
        assert!(outcome.refund_reference.starts_with("rf_"));
    }
}
