//! Queue message envelope
//!
//! Every message on a queue is a serialized [`JobEnvelope`]. Producers that
//! predate the envelope pushed bare payloads; those are migrated into an
//! envelope once, at decode time, so handlers only ever see one shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Wrapper record around a queue message carrying identity, retry state,
/// and the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: String,

    /// Dispatch tag, e.g. `initial`, `trial`, `renewal`, `upgrade`, `refund`
    pub action: String,

    #[serde(default)]
    pub correlation_id: Option<String>,

    #[serde(default)]
    pub idempotency_key: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub attempts: u32,

    /// Per-message retry ceiling; overrides the queue policy when set
    #[serde(default)]
    pub max_attempts: Option<u32>,

    pub payload: Value,
}

impl JobEnvelope {
    /// Create a new envelope with a fresh id and zero attempts.
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action: action.into(),
            correlation_id: None,
            idempotency_key: None,
            created_at: Utc::now(),
            attempts: 0,
            max_attempts: None,
            payload,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Serialize to the wire form.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode a raw queue message.
    ///
    /// Accepts the enveloped shape directly. A bare object (legacy
    /// producers) is wrapped: the id comes from `event_id` when present,
    /// otherwise from a content hash; the whole object becomes the
    /// payload.
    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        let value: Value = serde_json::from_str(raw)?;

        let is_enveloped = value
            .as_object()
            .map(|obj| obj.contains_key("action") && obj.contains_key("payload"))
            .unwrap_or(false);

        if is_enveloped {
            return serde_json::from_value(value);
        }

        let obj = value.as_object().cloned().unwrap_or_default();
        let str_field = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            id: str_field("event_id").unwrap_or_else(|| content_hash(raw)),
            action: str_field("action").unwrap_or_else(|| "webhook".to_string()),
            correlation_id: str_field("subscription_id"),
            idempotency_key: str_field("event_id"),
            created_at: Utc::now(),
            attempts: obj
                .get("attempts")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            max_attempts: obj
                .get("max_attempts")
                .and_then(Value::as_u64)
                .map(|n| n as u32),
            payload: value,
        })
    }

    /// Retry ceiling for this message given the queue policy default.
    pub fn effective_max_attempts(&self, policy_max: u32) -> u32 {
        self.max_attempts.unwrap_or(policy_max)
    }

    /// Clone of this envelope with an updated attempt count, used when
    /// re-enqueueing through the delayed set.
    pub fn clone_for_retry(&self, attempts: u32) -> Self {
        let mut clone = self.clone();
        clone.attempts = attempts;
        clone
    }
}

/// Deterministic id for messages that carry none of their own.
pub fn content_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = JobEnvelope::new("initial", json!({"subscription_id": "abc", "amount": 29.0}))
            .with_correlation_id("abc")
            .with_idempotency_key("key-1")
            .with_max_attempts(3);

        let raw = envelope.encode().unwrap();
        let decoded = JobEnvelope::decode(&raw).unwrap();

        assert_eq!(decoded, envelope);
        assert_eq!(decoded.attempts, 0);
        assert_eq!(decoded.effective_max_attempts(5), 3);
    }

    #[test]
    fn test_policy_max_applies_without_override() {
        let envelope = JobEnvelope::new("renewal", json!({}));
        assert_eq!(envelope.effective_max_attempts(5), 5);
    }

    #[test]
    fn test_legacy_bare_payload_is_wrapped() {
        let raw = r#"{"event_id":"payment_x_1","subscription_id":"s-1","status":"success","amount":29.0}"#;
        let decoded = JobEnvelope::decode(raw).unwrap();

        assert_eq!(decoded.id, "payment_x_1");
        assert_eq!(decoded.action, "webhook");
        assert_eq!(decoded.correlation_id.as_deref(), Some("s-1"));
        assert_eq!(decoded.idempotency_key.as_deref(), Some("payment_x_1"));
        assert_eq!(decoded.payload["status"], "success");
    }

    #[test]
    fn test_legacy_payload_without_ids_gets_content_hash() {
        let raw = r#"{"status":"failed","amount":5.0}"#;
        let decoded = JobEnvelope::decode(raw).unwrap();

        assert_eq!(decoded.id, content_hash(raw));
        assert_eq!(decoded.id.len(), 64);
    }

    #[test]
    fn test_clone_for_retry_bumps_attempts_only() {
        let envelope = JobEnvelope::new("trial", json!({"subscription_id": "s-2"}));
        let retry = envelope.clone_for_retry(2);

        assert_eq!(retry.attempts, 2);
        assert_eq!(retry.id, envelope.id);
        assert_eq!(retry.payload, envelope.payload);
    }
}
