//! Transaction repository
//!
//! Terminal transitions are enforced here: the UPDATE statements filter on
//! the allowed prior status, so a transaction can reach a terminal state at
//! most once and terminal transitions are never reverted.

use crate::models::{Transaction, TransactionMetadata, TransactionStatus};
use crate::{Error, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

#[async_trait]
pub trait TransactionRepository: Send + Sync + 'static {
    /// Create a transaction in `pending`.
    async fn create(
        &self,
        subscription_id: Option<Uuid>,
        amount: Decimal,
        currency: &str,
        metadata: TransactionMetadata,
    ) -> Result<Transaction>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>>;

    async fn list_by_subscription(&self, subscription_id: Uuid) -> Result<Vec<Transaction>>;

    /// `pending` -> `processing`.
    async fn mark_processing(&self, id: Uuid) -> Result<Transaction>;

    /// `processing` -> `success` | `failed`, recording the gateway
    /// reference and error message. Fails with an invariant error when
    /// the transaction already left the in-flight states.
    async fn mark_terminal(
        &self,
        id: Uuid,
        status: TransactionStatus,
        gateway_reference: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<Transaction>;

    /// Refund transitions: `success` -> `refund_initiated` ->
    /// `refund_complete` | `refund_error`.
    async fn mark_refund(
        &self,
        id: Uuid,
        status: TransactionStatus,
        gateway_reference: Option<&str>,
    ) -> Result<Transaction>;
}

/// PostgreSQL implementation of the transaction repository
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: sqlx::PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn create(
        &self,
        subscription_id: Option<Uuid>,
        amount: Decimal,
        currency: &str,
        metadata: TransactionMetadata,
    ) -> Result<Transaction> {
        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (
                id, subscription_id, amount, currency, status, metadata, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, 'pending', $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(subscription_id)
        .bind(amount)
        .bind(currency)
        .bind(sqlx::types::Json(metadata))
        .fetch_one(&self.pool)
        .await?;

        Ok(transaction)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        let transaction =
            sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(transaction)
    }

    async fn list_by_subscription(&self, subscription_id: Uuid) -> Result<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE subscription_id = $1 ORDER BY created_at DESC",
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }

    async fn mark_processing(&self, id: Uuid) -> Result<Transaction> {
        let updated = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| {
            Error::invariant(format!("transaction {} is not pending", id))
        })
    }

    async fn mark_terminal(
        &self,
        id: Uuid,
        status: TransactionStatus,
        gateway_reference: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<Transaction> {
        if !matches!(
            status,
            TransactionStatus::Success | TransactionStatus::Failed
        ) {
            return Err(Error::validation(format!(
                "{:?} is not a charge outcome",
                status
            )));
        }

        let updated = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = $2,
                gateway_reference = COALESCE($3, gateway_reference),
                error_message = COALESCE($4, error_message),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(gateway_reference)
        .bind(error_message)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| {
            Error::invariant(format!("transaction {} already reached a terminal state", id))
        })
    }

    async fn mark_refund(
        &self,
        id: Uuid,
        status: TransactionStatus,
        gateway_reference: Option<&str>,
    ) -> Result<Transaction> {
        let required_prior = match status {
            TransactionStatus::RefundInitiated => TransactionStatus::Success,
            TransactionStatus::RefundComplete | TransactionStatus::RefundError => {
                TransactionStatus::RefundInitiated
            }
            _ => {
                return Err(Error::validation(format!(
                    "{:?} is not a refund status",
                    status
                )))
            }
        };

        let updated = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = $2,
                gateway_reference = COALESCE($3, gateway_reference),
                updated_at = NOW()
            WHERE id = $1 AND status = $4
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(gateway_reference)
        .bind(required_prior)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| {
            Error::invariant(format!(
                "transaction {} is not eligible for {:?}",
                id, status
            ))
        })
    }
}
