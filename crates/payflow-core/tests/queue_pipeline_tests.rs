//! End-to-end pipeline tests over a live Redis
//!
//! Skipped silently when no local Redis is reachable, matching the rest
//! of the Redis-dependent suite.

use payflow_core::cache::RedisPool;
use payflow_core::config::RedisConfig;
use payflow_core::jobs::{
    DelayedQueuePump, HandlerOutcome, IdempotencyLock, JobEnvelope, JobHandler, JobLogger,
    JobQueue, PollOutcome, QueuePolicy, Worker, DEFAULT_POLICY,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct CountingHandler {
    succeed_after: usize,
    calls: AtomicUsize,
}

impl CountingHandler {
    fn new(succeed_after: usize) -> Arc<Self> {
        Arc::new(Self {
            succeed_after,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl JobHandler for CountingHandler {
    async fn handle(&self, _envelope: &JobEnvelope) -> HandlerOutcome {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if calls >= self.succeed_after {
            HandlerOutcome::Success
        } else {
            HandlerOutcome::Retry(payflow_core::Error::network("induced failure"))
        }
    }
}

async fn pool() -> Option<RedisPool> {
    RedisPool::connect(RedisConfig::default()).await.ok()
}

/// Every enqueued message ends up accounted for: acked, delayed,
/// processing, active, or dead-lettered.
#[tokio::test]
async fn test_message_conservation() {
    let Some(pool) = pool().await else { return };

    let queue = JobQueue::new(pool.clone(), "q:test:conservation");
    queue.clear().await.unwrap();

    let total = 5u64;
    for n in 0..total {
        queue
            .enqueue(&JobEnvelope::new("initial", json!({ "n": n })))
            .await
            .unwrap();
    }

    let handler = CountingHandler::new(0);
    let worker = Worker::new(
        queue.clone(),
        DEFAULT_POLICY,
        IdempotencyLock::new(pool),
        JobLogger::disabled("test"),
    )
    .register("initial", handler);

    let mut acked = 0u64;
    for _ in 0..total {
        if worker.poll_once().await.unwrap() == PollOutcome::Completed {
            acked += 1;
        }
    }

    let remaining = queue.len_active().await.unwrap()
        + queue.len_delayed().await.unwrap()
        + queue.len_processing().await.unwrap()
        + queue.len_failed().await.unwrap();

    assert_eq!(acked + remaining, total);
    assert_eq!(acked, total);

    queue.clear().await.unwrap();
}

/// A failing message travels main -> delayed -> (pump) -> main -> acked.
#[tokio::test]
async fn test_retry_roundtrip_through_pump() {
    let Some(pool) = pool().await else { return };

    let queue = JobQueue::new(pool.clone(), "q:test:retry_roundtrip");
    queue.clear().await.unwrap();

    // Zero-delay policy so the retry is promotable immediately.
    let policy = QueuePolicy {
        base_delay_seconds: 0,
        jitter_seconds: 0,
        ..DEFAULT_POLICY
    };

    let handler = CountingHandler::new(2);
    let worker = Worker::new(
        queue.clone(),
        policy,
        IdempotencyLock::new(pool.clone()),
        JobLogger::disabled("test"),
    )
    .register("renewal", handler.clone());

    queue
        .enqueue(&JobEnvelope::new("renewal", json!({})))
        .await
        .unwrap();

    // First attempt fails into the delayed set.
    assert_eq!(worker.poll_once().await.unwrap(), PollOutcome::Retried);
    assert_eq!(queue.len_delayed().await.unwrap(), 1);

    // The pump promotes it back; the second attempt succeeds.
    let pump = DelayedQueuePump::new(
        pool,
        ["q:test:retry_roundtrip"],
        std::time::Duration::from_secs(5),
    );
    let moved: u64 = pump.run_once().await.iter().map(|(_, n)| n).sum();
    assert_eq!(moved, 1);

    assert_eq!(worker.poll_once().await.unwrap(), PollOutcome::Completed);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);

    let decoded_attempts = queue.len_active().await.unwrap()
        + queue.len_delayed().await.unwrap()
        + queue.len_processing().await.unwrap()
        + queue.len_failed().await.unwrap();
    assert_eq!(decoded_attempts, 0);

    queue.clear().await.unwrap();
}
