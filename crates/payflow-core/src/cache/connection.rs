//! Redis connection management

use crate::cache::{CacheError, CacheResult};
use crate::config::RedisConfig;
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::Arc;
use tracing::info;

/// Shared Redis handle.
///
/// Wraps a multiplexed [`ConnectionManager`] which reconnects on failure;
/// clones are cheap and safe to hand to every worker task.
#[derive(Clone)]
pub struct RedisPool {
    manager: ConnectionManager,
    config: Arc<RedisConfig>,
}

impl RedisPool {
    /// Open a connection to Redis and validate it with PING.
    pub async fn connect(config: RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;

        let pool = Self {
            manager,
            config: Arc::new(config),
        };

        let pong: String = redis::cmd("PING")
            .query_async(&mut pool.connection())
            .await
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;

        if pong != "PONG" {
            return Err(CacheError::ConnectionError("Redis PING failed".to_string()));
        }

        info!("Redis connection established: url={}", pool.config.url);

        Ok(pool)
    }

    /// Get a handle for issuing commands.
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Configured Redis URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Check whether the server is reachable.
    pub async fn health_check(&self) -> bool {
        let result: Result<String, _> = redis::cmd("PING")
            .query_async(&mut self.connection())
            .await;
        matches!(result, Ok(ref pong) if pong == "PONG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_connect_and_ping() {
        let config = RedisConfig::default();

        // Redis may not be running in every environment; skip silently.
        if let Ok(pool) = RedisPool::connect(config).await {
            assert!(pool.health_check().await);
            assert!(pool.url().starts_with("redis://"));
        }
    }
}
