//! Idempotency locks
//!
//! A short-lived lock keyed by `(queue, message_id)` bounds concurrency to
//! one active processor per message. Acquired with create-if-absent
//! semantics and a TTL so a crashed holder cannot wedge the message
//! forever; released explicitly after processing.

use crate::cache::{CacheResult, RedisPool};
use tracing::warn;

/// Lock key for a message on a queue. Shared with the visibility sweeper,
/// which probes these keys to detect orphans.
pub fn lock_key(queue: &str, message_id: &str) -> String {
    format!("lock:{}:{}", queue, message_id)
}

#[derive(Clone)]
pub struct IdempotencyLock {
    pool: RedisPool,
}

impl IdempotencyLock {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Try to take the lock. Returns false when another holder exists.
    pub async fn acquire(
        &self,
        queue: &str,
        message_id: &str,
        ttl_seconds: u64,
    ) -> CacheResult<bool> {
        let acquired: Option<String> = redis::cmd("SET")
            .arg(lock_key(queue, message_id))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut self.pool.connection())
            .await?;
        Ok(acquired.is_some())
    }

    /// Release the lock. Best-effort: a failed release only means the key
    /// lingers until its TTL.
    pub async fn release(&self, queue: &str, message_id: &str) {
        let result: Result<(), redis::RedisError> = redis::cmd("DEL")
            .arg(lock_key(queue, message_id))
            .query_async(&mut self.pool.connection())
            .await;

        if let Err(e) = result {
            warn!(
                "Failed to release lock: queue={}, message_id={}, error={}",
                queue, message_id, e
            );
        }
    }

    /// Whether a live lock exists for this message.
    pub async fn exists(&self, queue: &str, message_id: &str) -> CacheResult<bool> {
        let exists: i64 = redis::cmd("EXISTS")
            .arg(lock_key(queue, message_id))
            .query_async(&mut self.pool.connection())
            .await?;
        Ok(exists > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    #[test]
    fn test_lock_key_format() {
        assert_eq!(
            lock_key("q:sub:payment_initiation", "m-1"),
            "lock:q:sub:payment_initiation:m-1"
        );
    }

    #[tokio::test]
    async fn test_single_holder() {
        let config = RedisConfig::default();
        if let Ok(pool) = RedisPool::connect(config).await {
            let lock = IdempotencyLock::new(pool);
            lock.release("q:test:lock", "m-1").await;

            assert!(lock.acquire("q:test:lock", "m-1", 30).await.unwrap());
            assert!(!lock.acquire("q:test:lock", "m-1", 30).await.unwrap());
            assert!(lock.exists("q:test:lock", "m-1").await.unwrap());

            lock.release("q:test:lock", "m-1").await;
            assert!(!lock.exists("q:test:lock", "m-1").await.unwrap());
            assert!(lock.acquire("q:test:lock", "m-1", 30).await.unwrap());

            lock.release("q:test:lock", "m-1").await;
        }
    }
}
