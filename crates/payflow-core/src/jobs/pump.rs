//! Delayed-queue pump
//!
//! Promotes due entries from every registered queue's delayed set back to
//! the main list. Promotion is idempotent, so overlapping invocations are
//! harmless.

use crate::cache::RedisPool;
use crate::jobs::JobQueue;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

pub struct DelayedQueuePump {
    queues: Vec<JobQueue>,
    interval: Duration,
}

impl DelayedQueuePump {
    pub fn new<I, S>(pool: RedisPool, queue_names: I, interval: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queues = queue_names
            .into_iter()
            .map(|name| JobQueue::new(pool.clone(), name))
            .collect();
        Self { queues, interval }
    }

    /// Promote due entries once across all queues; returns per-queue
    /// moved counts.
    pub async fn run_once(&self) -> Vec<(String, u64)> {
        let mut results = Vec::with_capacity(self.queues.len());

        for queue in &self.queues {
            match queue.promote_due().await {
                Ok(moved) => {
                    if moved > 0 {
                        info!("Promoted delayed messages: queue={}, moved={}", queue.name(), moved);
                    }
                    results.push((queue.name().to_string(), moved));
                }
                Err(e) => {
                    error!("Delayed promotion failed: queue={}, error={}", queue.name(), e);
                    results.push((queue.name().to_string(), 0));
                }
            }
        }

        results
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Delayed-queue pump started: interval={:?}", self.interval);

        while !*shutdown.borrow() {
            self.run_once().await;

            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("Delayed-queue pump stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;
    use crate::jobs::JobEnvelope;
    use serde_json::json;

    #[tokio::test]
    async fn test_pump_promotes_across_queues() {
        let config = RedisConfig::default();
        if let Ok(pool) = RedisPool::connect(config).await {
            let first = JobQueue::new(pool.clone(), "q:test:pump_a");
            let second = JobQueue::new(pool.clone(), "q:test:pump_b");
            first.clear().await.unwrap();
            second.clear().await.unwrap();

            first
                .delay_enqueue(&JobEnvelope::new("x", json!({})), 0)
                .await
                .unwrap();
            second
                .delay_enqueue(&JobEnvelope::new("y", json!({})), 3600)
                .await
                .unwrap();

            let pump = DelayedQueuePump::new(
                pool,
                ["q:test:pump_a", "q:test:pump_b"],
                Duration::from_secs(5),
            );

            let results = pump.run_once().await;
            assert_eq!(results[0], ("q:test:pump_a".to_string(), 1));
            assert_eq!(results[1], ("q:test:pump_b".to_string(), 0));
            assert_eq!(first.len_active().await.unwrap(), 1);

            first.clear().await.unwrap();
            second.clear().await.unwrap();
        }
    }
}
