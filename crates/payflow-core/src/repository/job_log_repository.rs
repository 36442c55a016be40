//! Job log repository

use crate::models::{JobLog, NewJobLog};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait JobLogRepository: Send + Sync + 'static {
    async fn record(&self, entry: NewJobLog) -> Result<()>;

    async fn list_for_message(&self, message_id: &str) -> Result<Vec<JobLog>>;
}

/// PostgreSQL implementation of the job log repository
#[derive(Clone)]
pub struct PostgresJobLogRepository {
    pool: sqlx::PgPool,
}

impl PostgresJobLogRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobLogRepository for PostgresJobLogRepository {
    async fn record(&self, entry: NewJobLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job_logs (
                service, queue, message_id, correlation_id, idempotency_key,
                action, status, attempts, last_error, next_retry_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            "#,
        )
        .bind(&entry.service)
        .bind(&entry.queue)
        .bind(&entry.message_id)
        .bind(&entry.correlation_id)
        .bind(&entry.idempotency_key)
        .bind(&entry.action)
        .bind(entry.status)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.next_retry_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_message(&self, message_id: &str) -> Result<Vec<JobLog>> {
        let entries = sqlx::query_as::<_, JobLog>(
            "SELECT * FROM job_logs WHERE message_id = $1 ORDER BY created_at",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
