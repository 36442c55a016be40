//! Atomic per-(user, feature) usage counters
//!
//! The check-and-increment sequence runs as a single server-side Lua
//! script so concurrent callers for the same key serialize on the Redis
//! side. Counters carry a `reset_at` epoch; a counter whose reset time has
//! passed is zeroed before the limit check.

use crate::cache::{CacheResult, RedisPool};
use redis::Script;
use std::time::{SystemTime, UNIX_EPOCH};

const METER_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local delta = tonumber(ARGV[2])
    local reset_at = ARGV[3]
    local now = tonumber(ARGV[4])

    local current = redis.call('HMGET', key, 'count', 'reset_at')
    local count = tonumber(current[1]) or 0
    local stored_reset = tonumber(current[2])

    if stored_reset and stored_reset <= now then
        count = 0
    end

    if count + delta > limit then
        return {0, count, limit}
    end

    count = count + delta
    redis.call('HMSET', key, 'count', count, 'reset_at', reset_at)
    redis.call('EXPIRE', key, 86400)

    return {1, count, limit}
"#;

/// Outcome of a meter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterDecision {
    /// Whether the increment was applied
    pub allowed: bool,

    /// Counter value after the operation (unchanged on deny)
    pub current: i64,

    /// Limit the counter was checked against
    pub limit: i64,
}

/// Redis-backed usage meter.
#[derive(Clone)]
pub struct UsageCounter {
    pool: RedisPool,
}

impl UsageCounter {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    fn key(user_id: i64, feature: &str) -> String {
        format!("usage:{}:{}", user_id, feature)
    }

    /// Atomically check the limit and apply `delta` to the counter.
    ///
    /// `reset_at_epoch` is stored alongside the count; when the stored
    /// value is in the past the count restarts from zero before the
    /// check. The key expires after 24 hours of inactivity.
    pub async fn check_and_increment(
        &self,
        user_id: i64,
        feature: &str,
        limit: i64,
        delta: i64,
        reset_at_epoch: i64,
    ) -> CacheResult<MeterDecision> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let (allowed, current, limit): (i64, i64, i64) = Script::new(METER_SCRIPT)
            .key(Self::key(user_id, feature))
            .arg(limit)
            .arg(delta)
            .arg(reset_at_epoch.to_string())
            .arg(now)
            .invoke_async(&mut self.pool.connection())
            .await?;

        Ok(MeterDecision {
            allowed: allowed == 1,
            current,
            limit,
        })
    }

    /// Drop the counter for a key (admin reset path).
    pub async fn clear(&self, user_id: i64, feature: &str) -> CacheResult<()> {
        redis::cmd("DEL")
            .arg(Self::key(user_id, feature))
            .query_async::<_, ()>(&mut self.pool.connection())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    #[test]
    fn test_key_format() {
        assert_eq!(UsageCounter::key(42, "api_calls"), "usage:42:api_calls");
    }

    #[tokio::test]
    async fn test_meter_allows_until_limit() {
        let config = RedisConfig::default();
        if let Ok(pool) = RedisPool::connect(config).await {
            let counter = UsageCounter::new(pool);
            counter.clear(900001, "api_calls").await.unwrap();

            let far_future = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs() as i64
                + 86400;

            for expected in 1..=3 {
                let decision = counter
                    .check_and_increment(900001, "api_calls", 3, 1, far_future)
                    .await
                    .unwrap();
                assert!(decision.allowed);
                assert_eq!(decision.current, expected);
            }

            // Fourth call is denied and the count does not move.
            let decision = counter
                .check_and_increment(900001, "api_calls", 3, 1, far_future)
                .await
                .unwrap();
            assert!(!decision.allowed);
            assert_eq!(decision.current, 3);
            assert_eq!(decision.limit, 3);

            counter.clear(900001, "api_calls").await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_concurrent_meters_allow_exactly_the_limit() {
        let config = RedisConfig::default();
        if let Ok(pool) = RedisPool::connect(config).await {
            let counter = UsageCounter::new(pool);
            counter.clear(900003, "api_calls").await.unwrap();

            let far_future = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs() as i64
                + 86400;

            let limit = 3i64;
            let tasks: Vec<_> = (0..10)
                .map(|_| {
                    let counter = counter.clone();
                    tokio::spawn(async move {
                        counter
                            .check_and_increment(900003, "api_calls", limit, 1, far_future)
                            .await
                            .unwrap()
                    })
                })
                .collect();

            let mut allowed = 0;
            for task in tasks {
                if task.await.unwrap().allowed {
                    allowed += 1;
                }
            }

            assert_eq!(allowed, limit);

            let decision = counter
                .check_and_increment(900003, "api_calls", limit, 1, far_future)
                .await
                .unwrap();
            assert!(!decision.allowed);
            assert_eq!(decision.current, limit);

            counter.clear(900003, "api_calls").await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_meter_resets_expired_window() {
        let config = RedisConfig::default();
        if let Ok(pool) = RedisPool::connect(config).await {
            let counter = UsageCounter::new(pool);
            counter.clear(900002, "reports").await.unwrap();

            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs() as i64;

            // Fill the counter with a reset time already in the past.
            let decision = counter
                .check_and_increment(900002, "reports", 2, 2, now - 10)
                .await
                .unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.current, 2);

            // The expired window zeroes out before the next check.
            let decision = counter
                .check_and_increment(900002, "reports", 2, 1, now + 86400)
                .await
                .unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.current, 1);

            counter.clear(900002, "reports").await.unwrap();
        }
    }
}
