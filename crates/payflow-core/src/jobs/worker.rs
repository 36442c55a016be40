//! Worker skeleton
//!
//! The claim/lock/dispatch/disposition contract lives here so handlers
//! stay pure. Per poll: claim with a short lease, take the idempotency
//! lock, dispatch to the handler registered for the envelope's action,
//! then ack, delay-retry, or dead-letter based on the handler outcome.
//! The lock is released on every exit path after acquisition.

use crate::jobs::{
    HandlerOutcome, IdempotencyLock, JobEnvelope, JobHandler, JobQueue, QueuePolicy,
};
use crate::models::{JobLogStatus, NewJobLog};
use crate::repository::JobLogRepository;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Best-effort durable job lifecycle log.
///
/// Every state change in the worker writes one row; failures are
/// swallowed because audit logging must never block job progress.
#[derive(Clone)]
pub struct JobLogger {
    service: String,
    repo: Option<Arc<dyn JobLogRepository>>,
}

impl JobLogger {
    pub fn new(service: impl Into<String>, repo: Arc<dyn JobLogRepository>) -> Self {
        Self {
            service: service.into(),
            repo: Some(repo),
        }
    }

    /// Logger that only emits tracing events (tests, tools).
    pub fn disabled(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            repo: None,
        }
    }

    pub async fn record(
        &self,
        queue: &str,
        envelope: Option<&JobEnvelope>,
        status: JobLogStatus,
        attempts: u32,
        last_error: Option<String>,
        next_retry_in_seconds: Option<u64>,
    ) {
        debug!(
            "Job event: service={}, queue={}, status={:?}, message_id={}, attempts={}",
            self.service,
            queue,
            status,
            envelope.map(|e| e.id.as_str()).unwrap_or("-"),
            attempts
        );

        let repo = match &self.repo {
            Some(repo) => repo,
            None => return,
        };

        let entry = NewJobLog {
            service: self.service.clone(),
            queue: queue.to_string(),
            message_id: envelope.map(|e| e.id.clone()),
            correlation_id: envelope.and_then(|e| e.correlation_id.clone()),
            idempotency_key: envelope.and_then(|e| e.idempotency_key.clone()),
            action: envelope.map(|e| e.action.clone()),
            status,
            attempts: attempts as i32,
            last_error,
            next_retry_at: next_retry_in_seconds
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs as i64)),
        };

        if let Err(e) = repo.record(entry).await {
            warn!("Job log write failed (ignored): {}", e);
        }
    }
}

/// Result of one worker poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing became available within the lease timeout
    NoMessage,

    /// Handler succeeded and the message was acked
    Completed,

    /// Handler reported an inbox/idempotency hit; acked without effects
    Duplicate,

    /// Another worker holds the lock; message went back to the queue
    LockBusy,

    /// Handler failed; message re-queued through the delayed set
    Retried,

    /// Message moved to the dead-letter list
    DeadLettered,
}

/// One worker loop bound to a queue.
pub struct Worker {
    queue: JobQueue,
    policy: QueuePolicy,
    lock: IdempotencyLock,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    fallback: Option<Arc<dyn JobHandler>>,
    job_log: JobLogger,
    idle_sleep: Duration,
}

impl Worker {
    pub fn new(
        queue: JobQueue,
        policy: QueuePolicy,
        lock: IdempotencyLock,
        job_log: JobLogger,
    ) -> Self {
        Self {
            queue,
            policy,
            lock,
            handlers: HashMap::new(),
            fallback: None,
            job_log,
            idle_sleep: Duration::from_millis(100),
        }
    }

    /// Register a handler for one envelope action.
    pub fn register(mut self, action: impl Into<String>, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(action.into(), handler);
        self
    }

    /// Handler for actions without a specific registration.
    pub fn with_fallback(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.fallback = Some(handler);
        self
    }

    pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.idle_sleep = idle_sleep;
        self
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// One full claim/lock/dispatch cycle.
    pub async fn poll_once(&self) -> crate::Result<PollOutcome> {
        let raw = match self.queue.claim(1).await? {
            Some(raw) => raw,
            None => return Ok(PollOutcome::NoMessage),
        };

        let envelope = match JobEnvelope::decode(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Undecodable messages cannot be retried meaningfully.
                warn!(
                    "Dead-lettering undecodable message: queue={}, error={}",
                    self.queue.name(),
                    e
                );
                self.queue.ack(&raw).await?;
                self.queue.dead_letter(&raw).await?;
                self.job_log
                    .record(
                        self.queue.name(),
                        None,
                        JobLogStatus::Dead,
                        0,
                        Some(e.to_string()),
                        None,
                    )
                    .await;
                return Ok(PollOutcome::DeadLettered);
            }
        };

        self.job_log
            .record(
                self.queue.name(),
                Some(&envelope),
                JobLogStatus::Received,
                envelope.attempts,
                None,
                None,
            )
            .await;

        let acquired = self
            .lock
            .acquire(
                self.queue.name(),
                &envelope.id,
                self.policy.lock_ttl_seconds,
            )
            .await?;

        if !acquired {
            // Someone else is processing this message; put it back.
            self.queue.ack(&raw).await?;
            self.queue.enqueue_raw(&raw).await?;
            self.job_log
                .record(
                    self.queue.name(),
                    Some(&envelope),
                    JobLogStatus::Retry,
                    envelope.attempts,
                    Some("lock_unavailable".to_string()),
                    None,
                )
                .await;
            return Ok(PollOutcome::LockBusy);
        }

        let result = self.dispatch(&raw, &envelope).await;
        self.lock.release(self.queue.name(), &envelope.id).await;
        result
    }

    async fn dispatch(&self, raw: &str, envelope: &JobEnvelope) -> crate::Result<PollOutcome> {
        self.job_log
            .record(
                self.queue.name(),
                Some(envelope),
                JobLogStatus::Processing,
                envelope.attempts,
                None,
                None,
            )
            .await;

        let handler = self
            .handlers
            .get(&envelope.action)
            .or(self.fallback.as_ref());

        let outcome = match handler {
            Some(handler) => handler.handle(envelope).await,
            None => HandlerOutcome::Fatal(crate::Error::validation(format!(
                "no handler registered for action '{}'",
                envelope.action
            ))),
        };

        match outcome {
            HandlerOutcome::Success => {
                self.queue.ack(raw).await?;
                self.job_log
                    .record(
                        self.queue.name(),
                        Some(envelope),
                        JobLogStatus::Success,
                        envelope.attempts,
                        None,
                        None,
                    )
                    .await;
                Ok(PollOutcome::Completed)
            }
            HandlerOutcome::Duplicate => {
                self.queue.ack(raw).await?;
                self.job_log
                    .record(
                        self.queue.name(),
                        Some(envelope),
                        JobLogStatus::Success,
                        envelope.attempts,
                        Some("duplicate".to_string()),
                        None,
                    )
                    .await;
                Ok(PollOutcome::Duplicate)
            }
            HandlerOutcome::Fatal(e) => {
                error!(
                    "Non-retryable failure, dead-lettering: queue={}, message_id={}, error={}",
                    self.queue.name(),
                    envelope.id,
                    e
                );
                self.queue.ack(raw).await?;
                self.queue.dead_letter(raw).await?;
                self.job_log
                    .record(
                        self.queue.name(),
                        Some(envelope),
                        JobLogStatus::Dead,
                        envelope.attempts,
                        Some(e.to_string()),
                        None,
                    )
                    .await;
                Ok(PollOutcome::DeadLettered)
            }
            HandlerOutcome::Retry(e) => {
                let attempts_next = envelope.attempts + 1;
                let max_attempts = envelope.effective_max_attempts(self.policy.max_retries);
                self.queue.ack(raw).await?;

                if attempts_next <= max_attempts {
                    let delay = self.policy.backoff_delay(attempts_next);
                    let retry = envelope.clone_for_retry(attempts_next);
                    self.queue.delay_enqueue(&retry, delay).await?;
                    warn!(
                        "Retrying: queue={}, message_id={}, attempt={}/{}, delay={}s, error={}",
                        self.queue.name(),
                        envelope.id,
                        attempts_next,
                        max_attempts,
                        delay,
                        e
                    );
                    self.job_log
                        .record(
                            self.queue.name(),
                            Some(envelope),
                            JobLogStatus::Retry,
                            attempts_next,
                            Some(e.to_string()),
                            Some(delay),
                        )
                        .await;
                    Ok(PollOutcome::Retried)
                } else {
                    error!(
                        "Retry ceiling exceeded, dead-lettering: queue={}, message_id={}, attempts={}",
                        self.queue.name(),
                        envelope.id,
                        attempts_next
                    );
                    self.queue.dead_letter(raw).await?;
                    self.job_log
                        .record(
                            self.queue.name(),
                            Some(envelope),
                            JobLogStatus::Failed,
                            attempts_next,
                            Some(e.to_string()),
                            None,
                        )
                        .await;
                    Ok(PollOutcome::DeadLettered)
                }
            }
        }
    }

    /// Poll until shutdown is signalled. An in-flight handler always
    /// finishes; the claim lease and sweeper cover anything that
    /// outlives the grace period.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Worker started: queue={}", self.queue.name());

        while !*shutdown.borrow() {
            match self.poll_once().await {
                Ok(PollOutcome::NoMessage) => {
                    tokio::select! {
                        _ = sleep(self.idle_sleep) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(
                        "Worker poll failed: queue={}, error={}",
                        self.queue.name(),
                        e
                    );
                    tokio::select! {
                        _ = sleep(Duration::from_secs(1)) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        info!("Worker stopped: queue={}", self.queue.name());
    }
}
