//! Redis substrate shared by the queue, lock, and usage-meter layers
//!
//! Everything that coordinates concurrent workers goes through this module:
//! queue lists, delayed sets, idempotency locks, and the atomic usage
//! counters. All per-key operations rely on Redis single-key atomicity;
//! the usage counter additionally runs as a server-side script so the
//! read-check-write sequence is linearizable.

pub mod connection;
pub mod usage_counter;

pub use connection::RedisPool;
pub use usage_counter::{MeterDecision, UsageCounter};

/// Cache result type alias
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    #[error("Operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() {
            CacheError::ConnectionError(err.to_string())
        } else {
            CacheError::OperationError(err.to_string())
        }
    }
}

impl From<CacheError> for crate::Error {
    fn from(err: CacheError) -> Self {
        crate::Error::Cache(err.to_string())
    }
}
