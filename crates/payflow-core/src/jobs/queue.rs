//! Redis-backed queue substrate
//!
//! Each logical queue `Q` is four physical structures: the main list `Q`,
//! the delayed zset `Q:delayed` scored by ready-at epoch, the in-flight
//! list `Q:processing`, and the dead-letter list `Q:failed`. Claiming is a
//! single BRPOPLPUSH so a worker crash between claim and ack leaves the
//! message recoverable in `Q:processing`.

use crate::cache::{CacheError, CacheResult, RedisPool};
use crate::jobs::JobEnvelope;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Handle to one named queue and its sibling structures.
#[derive(Clone)]
pub struct JobQueue {
    pool: RedisPool,
    name: String,
}

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl JobQueue {
    pub fn new(pool: RedisPool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn delayed_key(&self) -> String {
        format!("{}:delayed", self.name)
    }

    fn processing_key(&self) -> String {
        format!("{}:processing", self.name)
    }

    fn failed_key(&self) -> String {
        format!("{}:failed", self.name)
    }

    /// Append a message to the queue.
    pub async fn enqueue(&self, envelope: &JobEnvelope) -> CacheResult<()> {
        let raw = envelope
            .encode()
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        self.enqueue_raw(&raw).await
    }

    /// Append an already-serialized message to the queue.
    pub async fn enqueue_raw(&self, raw: &str) -> CacheResult<()> {
        redis::cmd("LPUSH")
            .arg(&self.name)
            .arg(raw)
            .query_async::<_, ()>(&mut self.pool.connection())
            .await?;
        debug!("Message enqueued: queue={}", self.name);
        Ok(())
    }

    /// Atomically move the oldest message onto the processing list and
    /// return it, blocking up to `timeout_seconds`. `None` when nothing
    /// became available (a missing queue looks the same).
    pub async fn claim(&self, timeout_seconds: u64) -> CacheResult<Option<String>> {
        let claimed: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.name)
            .arg(self.processing_key())
            .arg(timeout_seconds)
            .query_async(&mut self.pool.connection())
            .await?;
        Ok(claimed)
    }

    /// Remove the first occurrence of this exact serialized form from the
    /// processing list. Returns how many entries were removed.
    pub async fn ack(&self, raw: &str) -> CacheResult<u64> {
        let removed: u64 = redis::cmd("LREM")
            .arg(self.processing_key())
            .arg(1)
            .arg(raw)
            .query_async(&mut self.pool.connection())
            .await?;
        Ok(removed)
    }

    /// Insert into the delayed set, ready at `now + delay_seconds`.
    pub async fn delay_enqueue(
        &self,
        envelope: &JobEnvelope,
        delay_seconds: u64,
    ) -> CacheResult<()> {
        let raw = envelope
            .encode()
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        self.delay_enqueue_raw(&raw, delay_seconds).await
    }

    pub async fn delay_enqueue_raw(&self, raw: &str, delay_seconds: u64) -> CacheResult<()> {
        let score = epoch_now() + delay_seconds;
        redis::cmd("ZADD")
            .arg(self.delayed_key())
            .arg(score)
            .arg(raw)
            .query_async::<_, ()>(&mut self.pool.connection())
            .await?;
        debug!(
            "Delayed message queued: queue={}, delay={}s",
            self.name, delay_seconds
        );
        Ok(())
    }

    /// Move every delayed entry whose score has passed back onto the main
    /// queue. Safe to call from overlapping invocations; returns the
    /// number moved.
    pub async fn promote_due(&self) -> CacheResult<u64> {
        let now = epoch_now();
        let mut conn = self.pool.connection();

        let ready: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(self.delayed_key())
            .arg(0)
            .arg(now)
            .query_async(&mut conn)
            .await?;

        if ready.is_empty() {
            return Ok(0);
        }

        let mut moved = 0u64;
        for raw in &ready {
            // ZREM first so a concurrent pump cannot promote the same
            // entry twice.
            let removed: u64 = redis::cmd("ZREM")
                .arg(self.delayed_key())
                .arg(raw)
                .query_async(&mut conn)
                .await?;
            if removed > 0 {
                redis::cmd("LPUSH")
                    .arg(&self.name)
                    .arg(raw)
                    .query_async::<_, ()>(&mut conn)
                    .await?;
                moved += 1;
            }
        }

        Ok(moved)
    }

    /// Append to the dead-letter list.
    pub async fn dead_letter(&self, raw: &str) -> CacheResult<()> {
        redis::cmd("LPUSH")
            .arg(self.failed_key())
            .arg(raw)
            .query_async::<_, ()>(&mut self.pool.connection())
            .await?;
        Ok(())
    }

    pub async fn len_active(&self) -> CacheResult<u64> {
        let len: u64 = redis::cmd("LLEN")
            .arg(&self.name)
            .query_async(&mut self.pool.connection())
            .await?;
        Ok(len)
    }

    pub async fn len_delayed(&self) -> CacheResult<u64> {
        let len: u64 = redis::cmd("ZCARD")
            .arg(self.delayed_key())
            .query_async(&mut self.pool.connection())
            .await?;
        Ok(len)
    }

    pub async fn len_processing(&self) -> CacheResult<u64> {
        let len: u64 = redis::cmd("LLEN")
            .arg(self.processing_key())
            .query_async(&mut self.pool.connection())
            .await?;
        Ok(len)
    }

    pub async fn len_failed(&self) -> CacheResult<u64> {
        let len: u64 = redis::cmd("LLEN")
            .arg(self.failed_key())
            .query_async(&mut self.pool.connection())
            .await?;
        Ok(len)
    }

    /// Everything currently sitting in the processing list.
    pub async fn processing_entries(&self) -> CacheResult<Vec<String>> {
        let entries: Vec<String> = redis::cmd("LRANGE")
            .arg(self.processing_key())
            .arg(0)
            .arg(-1)
            .query_async(&mut self.pool.connection())
            .await?;
        Ok(entries)
    }

    /// Cap the dead-letter list, keeping the newest `keep` entries once
    /// it grows past `cap`.
    pub async fn trim_failed(&self, cap: u64, keep: u64) -> CacheResult<u64> {
        let len = self.len_failed().await?;
        if len <= cap {
            return Ok(0);
        }

        redis::cmd("LTRIM")
            .arg(self.failed_key())
            .arg(0)
            .arg(keep as i64 - 1)
            .query_async::<_, ()>(&mut self.pool.connection())
            .await?;

        Ok(len - keep)
    }

    /// Delete all four structures (test helper).
    pub async fn clear(&self) -> CacheResult<()> {
        redis::cmd("DEL")
            .arg(&self.name)
            .arg(self.delayed_key())
            .arg(self.processing_key())
            .arg(self.failed_key())
            .query_async::<_, ()>(&mut self.pool.connection())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;
    use serde_json::json;

    async fn test_queue(name: &str) -> Option<JobQueue> {
        let pool = RedisPool::connect(RedisConfig::default()).await.ok()?;
        let queue = JobQueue::new(pool, name);
        queue.clear().await.ok()?;
        Some(queue)
    }

    #[tokio::test]
    async fn test_enqueue_claim_ack() {
        if let Some(queue) = test_queue("q:test:basic").await {
            let envelope = JobEnvelope::new("initial", json!({"n": 1}));
            queue.enqueue(&envelope).await.unwrap();
            assert_eq!(queue.len_active().await.unwrap(), 1);

            let raw = queue.claim(1).await.unwrap().unwrap();
            assert_eq!(queue.len_active().await.unwrap(), 0);
            assert_eq!(queue.len_processing().await.unwrap(), 1);

            let decoded = JobEnvelope::decode(&raw).unwrap();
            assert_eq!(decoded.id, envelope.id);

            assert_eq!(queue.ack(&raw).await.unwrap(), 1);
            assert_eq!(queue.len_processing().await.unwrap(), 0);

            queue.clear().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_claim_order_matches_enqueue_order() {
        if let Some(queue) = test_queue("q:test:fifo").await {
            let first = JobEnvelope::new("initial", json!({"n": 1}));
            let second = JobEnvelope::new("initial", json!({"n": 2}));
            queue.enqueue(&first).await.unwrap();
            queue.enqueue(&second).await.unwrap();

            let raw = queue.claim(1).await.unwrap().unwrap();
            assert_eq!(JobEnvelope::decode(&raw).unwrap().id, first.id);

            queue.clear().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_promote_due_moves_ready_entries() {
        if let Some(queue) = test_queue("q:test:delayed").await {
            let ready = JobEnvelope::new("renewal", json!({"n": 1}));
            let future = JobEnvelope::new("renewal", json!({"n": 2}));

            queue.delay_enqueue(&ready, 0).await.unwrap();
            queue.delay_enqueue(&future, 3600).await.unwrap();

            let moved = queue.promote_due().await.unwrap();
            assert_eq!(moved, 1);
            assert_eq!(queue.len_active().await.unwrap(), 1);
            assert_eq!(queue.len_delayed().await.unwrap(), 1);

            // Idempotent: nothing further is due.
            assert_eq!(queue.promote_due().await.unwrap(), 0);

            queue.clear().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_dead_letter_and_trim() {
        if let Some(queue) = test_queue("q:test:failed").await {
            for n in 0..5 {
                let raw = JobEnvelope::new("x", json!({ "n": n })).encode().unwrap();
                queue.dead_letter(&raw).await.unwrap();
            }
            assert_eq!(queue.len_failed().await.unwrap(), 5);

            let dropped = queue.trim_failed(3, 2).await.unwrap();
            assert_eq!(dropped, 3);
            assert_eq!(queue.len_failed().await.unwrap(), 2);

            queue.clear().await.unwrap();
        }
    }
}
