//! Reliable asynchronous job pipeline
//!
//! Redis-backed queues with at-least-once delivery:
//! - Atomic claim with an implicit lease (BRPOPLPUSH into `:processing`)
//! - Idempotency locks bounding each message to one active processor
//! - Exponential backoff with jitter through a delayed zset
//! - A pump promoting due delayed entries and a sweeper reclaiming
//!   messages whose worker crashed before ack
//! - Dead-letter lists for messages past their retry ceiling
//!
//! Handlers return a [`HandlerOutcome`]; the worker skeleton owns the
//! disposition (ack, delayed retry, or dead-letter) and the per-job
//! audit rows.

pub mod envelope;
pub mod lock;
pub mod policy;
pub mod pump;
pub mod queue;
pub mod sweeper;
pub mod worker;

pub use envelope::{content_hash, JobEnvelope};
pub use lock::{lock_key, IdempotencyLock};
pub use policy::{policy_for, QueuePolicy, DEFAULT_POLICY};
pub use pump::DelayedQueuePump;
pub use queue::JobQueue;
pub use sweeper::VisibilitySweeper;
pub use worker::{JobLogger, PollOutcome, Worker};

// Payment service -> subscription service
pub const QUEUE_SUBSCRIPTION_UPDATE: &str = "q:pay:subscription_update";
pub const QUEUE_REFUND_INITIATION: &str = "q:pay:refund_initiation";

// Subscription service internal
pub const QUEUE_PAYMENT_INITIATION: &str = "q:sub:payment_initiation";
pub const QUEUE_TRIAL_PAYMENT: &str = "q:sub:trial_payment";
pub const QUEUE_PLAN_CHANGE: &str = "q:sub:plan_change";
pub const QUEUE_USAGE_SYNC: &str = "q:sub:usage_sync";

/// Queues owned by the subscription service's workers.
pub fn subscription_queues() -> [&'static str; 4] {
    [
        QUEUE_PAYMENT_INITIATION,
        QUEUE_TRIAL_PAYMENT,
        QUEUE_PLAN_CHANGE,
        QUEUE_USAGE_SYNC,
    ]
}

/// Queues owned by the payment service's workers.
pub fn payment_queues() -> [&'static str; 2] {
    [QUEUE_SUBSCRIPTION_UPDATE, QUEUE_REFUND_INITIATION]
}

/// What a handler reports back to the worker skeleton.
#[derive(Debug)]
pub enum HandlerOutcome {
    /// Side effects applied; ack the message.
    Success,

    /// The idempotency key or inbox already absorbed this message; ack
    /// without further side effects.
    Duplicate,

    /// Transient failure; route through the backoff path up to the
    /// retry ceiling.
    Retry(crate::Error),

    /// Non-retryable failure (validation, invariant violation); goes
    /// straight to the dead-letter list.
    Fatal(crate::Error),
}

impl HandlerOutcome {
    /// Classify an error by its retryability.
    pub fn from_error(error: crate::Error) -> Self {
        if error.is_retryable() {
            HandlerOutcome::Retry(error)
        } else {
            HandlerOutcome::Fatal(error)
        }
    }
}

/// A queue message processor.
///
/// Implementations must be idempotent with respect to the envelope's
/// `idempotency_key`: the pipeline guarantees at-least-once delivery,
/// not exactly-once.
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, envelope: &JobEnvelope) -> HandlerOutcome;
}
