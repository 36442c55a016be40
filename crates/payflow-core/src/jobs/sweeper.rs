//! Visibility sweeper
//!
//! A worker that crashes between claim and ack leaves its message in
//! `Q:processing` with no live idempotency lock once the TTL runs out.
//! The sweeper reconciles the processing list against the lock keys:
//! entries with a live lock are left alone; orphans get their attempt
//! count bumped and go back through the delayed set, or to the
//! dead-letter list past the retry ceiling.

use crate::cache::{CacheResult, RedisPool};
use crate::jobs::{content_hash, policy_for, IdempotencyLock, JobEnvelope, JobQueue};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

// Dead-letter lists are capped during sweeps.
const FAILED_LIST_CAP: u64 = 1000;
const FAILED_LIST_KEEP: u64 = 100;

pub struct VisibilitySweeper {
    queues: Vec<JobQueue>,
    lock: IdempotencyLock,
    interval: Duration,
}

impl VisibilitySweeper {
    pub fn new<I, S>(pool: RedisPool, queue_names: I, interval: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queues = queue_names
            .into_iter()
            .map(|name| JobQueue::new(pool.clone(), name))
            .collect();
        Self {
            queues,
            lock: IdempotencyLock::new(pool),
            interval,
        }
    }

    /// Sweep all queues once; returns per-queue orphan counts.
    pub async fn run_once(&self) -> Vec<(String, u64)> {
        let mut results = Vec::with_capacity(self.queues.len());

        for queue in &self.queues {
            match self.sweep_queue(queue).await {
                Ok(swept) => {
                    if swept > 0 {
                        info!("Reclaimed orphans: queue={}, swept={}", queue.name(), swept);
                    }
                    results.push((queue.name().to_string(), swept));
                }
                Err(e) => {
                    error!("Sweep failed: queue={}, error={}", queue.name(), e);
                    results.push((queue.name().to_string(), 0));
                }
            }
        }

        results
    }

    async fn sweep_queue(&self, queue: &JobQueue) -> CacheResult<u64> {
        let policy = policy_for(queue.name());
        let mut swept = 0u64;

        for raw in queue.processing_entries().await? {
            let envelope = JobEnvelope::decode(&raw).ok();
            let message_id = envelope
                .as_ref()
                .map(|e| e.id.clone())
                .unwrap_or_else(|| content_hash(&raw));

            if self.lock.exists(queue.name(), &message_id).await? {
                // A live lock means a worker still owns the message.
                continue;
            }

            let removed = queue.ack(&raw).await?;
            if removed == 0 {
                // The owning worker acked between our scan and now.
                continue;
            }

            match envelope {
                Some(envelope) => {
                    let attempts_next = envelope.attempts + 1;
                    let max_attempts = envelope.effective_max_attempts(policy.max_retries);

                    if attempts_next <= max_attempts {
                        let delay = policy.backoff_delay(attempts_next);
                        let retry = envelope.clone_for_retry(attempts_next);
                        queue.delay_enqueue(&retry, delay).await?;
                        warn!(
                            "Orphan rescheduled: queue={}, message_id={}, attempt={}/{}, delay={}s",
                            queue.name(),
                            message_id,
                            attempts_next,
                            max_attempts,
                            delay
                        );
                    } else {
                        queue.dead_letter(&raw).await?;
                        warn!(
                            "Orphan dead-lettered: queue={}, message_id={}, attempts={}",
                            queue.name(),
                            message_id,
                            attempts_next
                        );
                    }
                }
                None => {
                    queue.dead_letter(&raw).await?;
                    warn!(
                        "Undecodable orphan dead-lettered: queue={}, message_id={}",
                        queue.name(),
                        message_id
                    );
                }
            }

            swept += 1;
        }

        let trimmed = queue.trim_failed(FAILED_LIST_CAP, FAILED_LIST_KEEP).await?;
        if trimmed > 0 {
            info!(
                "Trimmed dead-letter list: queue={}, dropped={}",
                queue.name(),
                trimmed
            );
        }

        Ok(swept)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Visibility sweeper started: interval={:?}", self.interval);

        while !*shutdown.borrow() {
            self.run_once().await;

            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("Visibility sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_sweeper_reclaims_orphan_to_delayed() {
        let config = RedisConfig::default();
        if let Ok(pool) = RedisPool::connect(config).await {
            let queue = JobQueue::new(pool.clone(), "q:test:sweep_orphan");
            queue.clear().await.unwrap();

            // Claim without acking and without a lock: a crashed worker.
            let envelope = JobEnvelope::new("initial", json!({"n": 1}));
            queue.enqueue(&envelope).await.unwrap();
            let _raw = queue.claim(1).await.unwrap().unwrap();
            assert_eq!(queue.len_processing().await.unwrap(), 1);

            let sweeper = VisibilitySweeper::new(
                pool,
                ["q:test:sweep_orphan"],
                Duration::from_secs(20),
            );
            let results = sweeper.run_once().await;

            assert_eq!(results[0].1, 1);
            assert_eq!(queue.len_processing().await.unwrap(), 0);
            assert_eq!(queue.len_delayed().await.unwrap(), 1);

            queue.clear().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_sweeper_leaves_locked_messages_alone() {
        let config = RedisConfig::default();
        if let Ok(pool) = RedisPool::connect(config).await {
            let queue = JobQueue::new(pool.clone(), "q:test:sweep_locked");
            queue.clear().await.unwrap();

            let envelope = JobEnvelope::new("initial", json!({"n": 1}));
            queue.enqueue(&envelope).await.unwrap();
            let _raw = queue.claim(1).await.unwrap().unwrap();

            let lock = IdempotencyLock::new(pool.clone());
            assert!(lock
                .acquire("q:test:sweep_locked", &envelope.id, 60)
                .await
                .unwrap());

            let sweeper = VisibilitySweeper::new(
                pool,
                ["q:test:sweep_locked"],
                Duration::from_secs(20),
            );
            let results = sweeper.run_once().await;

            assert_eq!(results[0].1, 0);
            assert_eq!(queue.len_processing().await.unwrap(), 1);

            lock.release("q:test:sweep_locked", &envelope.id).await;
            queue.clear().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_sweeper_dead_letters_past_ceiling() {
        let config = RedisConfig::default();
        if let Ok(pool) = RedisPool::connect(config).await {
            let queue = JobQueue::new(pool.clone(), "q:test:sweep_ceiling");
            queue.clear().await.unwrap();

            let mut envelope = JobEnvelope::new("initial", json!({})).with_max_attempts(1);
            envelope.attempts = 1;
            queue.enqueue(&envelope).await.unwrap();
            let _raw = queue.claim(1).await.unwrap().unwrap();

            let sweeper = VisibilitySweeper::new(
                pool,
                ["q:test:sweep_ceiling"],
                Duration::from_secs(20),
            );
            sweeper.run_once().await;

            assert_eq!(queue.len_processing().await.unwrap(), 0);
            assert_eq!(queue.len_failed().await.unwrap(), 1);
            assert_eq!(queue.len_delayed().await.unwrap(), 0);

            queue.clear().await.unwrap();
        }
    }
}
