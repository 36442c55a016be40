//! Payment transactions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Transaction status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Success,
    Failed,
    RefundInitiated,
    RefundComplete,
    RefundError,
}

impl TransactionStatus {
    /// A transaction reaches a terminal state at most once; terminal
    /// transitions are never reverted.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            TransactionStatus::Pending | TransactionStatus::Processing
        )
    }

    pub fn is_refund(&self) -> bool {
        matches!(
            self,
            TransactionStatus::RefundInitiated
                | TransactionStatus::RefundComplete
                | TransactionStatus::RefundError
        )
    }
}

/// Typed metadata bag stored as JSONB on the transaction row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransactionMetadata {
    #[serde(default)]
    pub trial: bool,

    #[serde(default)]
    pub renewal: bool,

    #[serde(default)]
    pub card_last_four: Option<String>,

    #[serde(default)]
    pub cardholder_name: Option<String>,
}

/// Transaction entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub gateway_reference: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Json<TransactionMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_successful(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    pub fn is_trial(&self) -> bool {
        self.metadata.trial
    }

    pub fn is_renewal(&self) -> bool {
        self.metadata.renewal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
        assert!(TransactionStatus::Success.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::RefundComplete.is_terminal());
    }

    #[test]
    fn test_refund_statuses() {
        assert!(TransactionStatus::RefundInitiated.is_refund());
        assert!(!TransactionStatus::Success.is_refund());
    }

    #[test]
    fn test_metadata_defaults() {
        let metadata: TransactionMetadata = serde_json::from_str("{}").unwrap();
        assert!(!metadata.trial);
        assert!(!metadata.renewal);
        assert_eq!(metadata.card_last_four, None);
    }
}
