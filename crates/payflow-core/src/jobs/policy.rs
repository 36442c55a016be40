//! Per-queue retry and visibility policies

use crate::jobs::{QUEUE_REFUND_INITIATION, QUEUE_TRIAL_PAYMENT};
use rand::Rng;

/// Retry/backoff policy for a queue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuePolicy {
    pub max_retries: u32,
    pub base_delay_seconds: u64,
    pub backoff_multiplier: f64,
    pub max_delay_seconds: u64,
    pub jitter_seconds: u64,
    pub lock_ttl_seconds: u64,
    pub visibility_timeout_seconds: u64,
}

pub const DEFAULT_POLICY: QueuePolicy = QueuePolicy {
    max_retries: 5,
    base_delay_seconds: 60,
    backoff_multiplier: 2.0,
    max_delay_seconds: 3600,
    jitter_seconds: 10,
    lock_ttl_seconds: 180,
    visibility_timeout_seconds: 300,
};

/// Tighter policy for the short-lived queues (trial charges, refunds).
const SHORT_POLICY: QueuePolicy = QueuePolicy {
    max_retries: 3,
    base_delay_seconds: 60,
    backoff_multiplier: 2.0,
    max_delay_seconds: 600,
    jitter_seconds: 5,
    lock_ttl_seconds: 120,
    visibility_timeout_seconds: 240,
};

/// Look up the policy for a queue; unknown queues get the default.
pub fn policy_for(queue: &str) -> QueuePolicy {
    match queue {
        QUEUE_TRIAL_PAYMENT | QUEUE_REFUND_INITIATION => SHORT_POLICY,
        _ => DEFAULT_POLICY,
    }
}

impl QueuePolicy {
    /// Delay before the next retry.
    ///
    /// `attempts` is the post-increment value (the first retry passes 1).
    /// Computed as `min(base * multiplier^attempts, cap)` plus uniform
    /// jitter in `[0, jitter_seconds]`.
    pub fn backoff_delay(&self, attempts: u32) -> u64 {
        let exponential =
            self.base_delay_seconds as f64 * self.backoff_multiplier.powi(attempts as i32);
        let capped = exponential.min(self.max_delay_seconds as f64) as u64;

        let jitter = if self.jitter_seconds > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_seconds)
        } else {
            0
        };

        capped + jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_values() {
        assert_eq!(DEFAULT_POLICY.max_retries, 5);
        assert_eq!(DEFAULT_POLICY.base_delay_seconds, 60);
        assert_eq!(DEFAULT_POLICY.max_delay_seconds, 3600);
        assert_eq!(DEFAULT_POLICY.lock_ttl_seconds, 180);
        assert_eq!(DEFAULT_POLICY.visibility_timeout_seconds, 300);
    }

    #[test]
    fn test_short_queues_use_tighter_policy() {
        let trial = policy_for(QUEUE_TRIAL_PAYMENT);
        assert_eq!(trial.max_retries, 3);
        assert_eq!(trial.max_delay_seconds, 600);
        assert_eq!(trial.lock_ttl_seconds, 120);

        assert_eq!(policy_for(QUEUE_REFUND_INITIATION), trial);
        assert_eq!(policy_for("q:sub:payment_initiation"), DEFAULT_POLICY);
        assert_eq!(policy_for("unknown"), DEFAULT_POLICY);
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let policy = QueuePolicy {
            jitter_seconds: 0,
            ..DEFAULT_POLICY
        };

        assert_eq!(policy.backoff_delay(1), 120);
        assert_eq!(policy.backoff_delay(2), 240);
        assert_eq!(policy.backoff_delay(3), 480);
        // 60 * 2^7 = 7680, capped at 3600.
        assert_eq!(policy.backoff_delay(7), 3600);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = DEFAULT_POLICY;
        for _ in 0..50 {
            let delay = policy.backoff_delay(1);
            assert!((120..=130).contains(&delay));
        }
    }
}
