//! Durable job lifecycle log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "job_log_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobLogStatus {
    Received,
    Processing,
    Success,
    Retry,
    Failed,
    Dead,
}

/// One row per job state change. Writes are best-effort: logging
/// failures never block job progress.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobLog {
    pub id: i64,
    pub service: String,
    pub queue: String,
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub action: Option<String>,
    pub status: JobLogStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insertion form built by the worker skeleton.
#[derive(Debug, Clone)]
pub struct NewJobLog {
    pub service: String,
    pub queue: String,
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub action: Option<String>,
    pub status: JobLogStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}
