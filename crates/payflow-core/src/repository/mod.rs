//! Database access layer
//!
//! One repository trait per aggregate with a PostgreSQL implementation.
//! Services depend on the traits, which keeps handlers testable without a
//! database.

pub mod inbox_repository;
pub mod job_log_repository;
pub mod plan_repository;
pub mod subscription_repository;
pub mod transaction_repository;
pub mod usage_repository;
pub mod user_repository;
pub mod webhook_delivery_repository;

pub use inbox_repository::{InboxRepository, PostgresInboxRepository};
pub use job_log_repository::{JobLogRepository, PostgresJobLogRepository};
pub use plan_repository::{PlanRepository, PostgresPlanRepository};
pub use subscription_repository::{PostgresSubscriptionRepository, SubscriptionRepository};
pub use transaction_repository::{PostgresTransactionRepository, TransactionRepository};
pub use usage_repository::{PostgresUsageRepository, UsageRepository};
pub use user_repository::{PostgresUserRepository, UserRepository};
pub use webhook_delivery_repository::{
    PostgresWebhookDeliveryRepository, WebhookDeliveryRepository,
};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> crate::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}
