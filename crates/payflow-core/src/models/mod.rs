//! Data model for the billing pipeline

pub mod job_log;
pub mod payment_event;
pub mod plan;
pub mod subscription;
pub mod subscription_event;
pub mod transaction;
pub mod user;
pub mod user_usage;
pub mod webhook_delivery;
pub mod webhook_inbox;

pub use job_log::{JobLog, JobLogStatus, NewJobLog};
pub use payment_event::PaymentEventPayload;
pub use plan::{Plan, PlanFeatures};
pub use subscription::{Subscription, SubscriptionStatus};
pub use subscription_event::{NewSubscriptionEvent, SubscriptionEvent};
pub use transaction::{Transaction, TransactionMetadata, TransactionStatus};
pub use user::User;
pub use user_usage::UserUsage;
pub use webhook_delivery::{GatewayWebhookRequest, WebhookOutboundRequest};
pub use webhook_inbox::WebhookInbox;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Billing cycle of a plan
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "billing_cycle", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    /// Days added to a subscription period on renewal.
    pub fn extension_days(&self) -> i64 {
        match self {
            BillingCycle::Monthly => 30,
            BillingCycle::Yearly => 365,
        }
    }
}

/// What a payment was for. Required on the wire; events without it are
/// rejected rather than inferred from payload flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAction {
    Trial,
    Initial,
    Renewal,
    Upgrade,
}

impl PaymentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentAction::Trial => "trial",
            PaymentAction::Initial => "initial",
            PaymentAction::Renewal => "renewal",
            PaymentAction::Upgrade => "upgrade",
        }
    }
}

impl fmt::Display for PaymentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal gateway outcome carried on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Success,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_cycle_extension() {
        assert_eq!(BillingCycle::Monthly.extension_days(), 30);
        assert_eq!(BillingCycle::Yearly.extension_days(), 365);
    }

    #[test]
    fn test_payment_action_wire_format() {
        let json = serde_json::to_string(&PaymentAction::Renewal).unwrap();
        assert_eq!(json, "\"renewal\"");
        let action: PaymentAction = serde_json::from_str("\"upgrade\"").unwrap();
        assert_eq!(action, PaymentAction::Upgrade);
    }
}
