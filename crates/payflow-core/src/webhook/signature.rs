//! HMAC-SHA256 webhook signatures

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
pub const EVENT_ID_HEADER: &str = "X-Webhook-Event-ID";

/// Default accepted signature age, seconds, both directions.
pub const DEFAULT_TOLERANCE_SECONDS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("empty payload")]
    EmptyPayload,

    #[error("invalid timestamp format")]
    InvalidTimestamp,

    #[error("timestamp outside tolerance window (age {age_seconds}s)")]
    OutsideTolerance { age_seconds: i64 },

    #[error("malformed signature header")]
    MalformedSignature,

    #[error("signature mismatch")]
    Mismatch,
}

impl From<SignatureError> for crate::Error {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Mismatch => crate::Error::Unauthorized(err.to_string()),
            _ => crate::Error::Validation(err.to_string()),
        }
    }
}

/// Canonical wire form: compact separators, keys sorted at every level.
/// `serde_json`'s map type keeps keys ordered, so serializing a `Value`
/// yields the sorted form directly.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Signature header value for a payload: `sha256=<hex>` over
/// `<timestamp>.<payload>`.
pub fn sign(payload: &str, timestamp: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature against the current clock.
pub fn verify(
    payload: &str,
    signature_header: &str,
    timestamp_header: &str,
    secret: &str,
    tolerance_seconds: i64,
) -> Result<(), SignatureError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    verify_at(payload, signature_header, timestamp_header, secret, tolerance_seconds, now)
}

/// Clock-injected verification core.
pub(crate) fn verify_at(
    payload: &str,
    signature_header: &str,
    timestamp_header: &str,
    secret: &str,
    tolerance_seconds: i64,
    now: i64,
) -> Result<(), SignatureError> {
    if payload.is_empty() {
        return Err(SignatureError::EmptyPayload);
    }

    let timestamp: i64 = timestamp_header
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;

    let age_seconds = now - timestamp;
    if age_seconds > tolerance_seconds || age_seconds < -tolerance_seconds {
        return Err(SignatureError::OutsideTolerance { age_seconds });
    }

    let provided_hex = signature_header
        .strip_prefix("sha256=")
        .ok_or(SignatureError::MalformedSignature)?;
    let provided = hex::decode(provided_hex).map_err(|_| SignatureError::MalformedSignature)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp_header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());

    // Constant-time comparison.
    mac.verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_keys() {
        let value = json!({"b": 2, "a": 1});
        assert_eq!(canonical_json(&value), r#"{"a":1,"b":2}"#);

        let nested = json!({"z": {"y": 1, "x": 2}, "a": []});
        assert_eq!(canonical_json(&nested), r#"{"a":[],"z":{"x":2,"y":1}}"#);
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let body = canonical_json(&json!({"a": 1, "b": 2}));
        let timestamp = "1700000000";
        let signature = sign(&body, timestamp, "k");

        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), "sha256=".len() + 64);

        // Fresh signature verifies within tolerance.
        assert_eq!(
            verify_at(&body, &signature, timestamp, "k", 300, 1_700_000_060),
            Ok(())
        );
    }

    #[test]
    fn test_stale_signature_is_rejected() {
        let body = canonical_json(&json!({"a": 1, "b": 2}));
        let timestamp = "1700000000";
        let signature = sign(&body, timestamp, "k");

        // Age 1000s exceeds the 300s window.
        assert_eq!(
            verify_at(&body, &signature, timestamp, "k", 300, 1_700_001_000),
            Err(SignatureError::OutsideTolerance { age_seconds: 1000 })
        );
    }

    #[test]
    fn test_future_timestamp_is_rejected() {
        let body = canonical_json(&json!({"a": 1}));
        let timestamp = "1700000000";
        let signature = sign(&body, timestamp, "k");

        assert_eq!(
            verify_at(&body, &signature, timestamp, "k", 300, 1_699_999_000),
            Err(SignatureError::OutsideTolerance { age_seconds: -1000 })
        );
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let body = canonical_json(&json!({"amount": 29.0}));
        let timestamp = "1700000000";
        let signature = sign(&body, timestamp, "k");

        let tampered = canonical_json(&json!({"amount": 2900.0}));
        assert_eq!(
            verify_at(&tampered, &signature, timestamp, "k", 300, 1_700_000_010),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let body = canonical_json(&json!({"a": 1}));
        let signature = sign(&body, "1700000000", "k");

        assert_eq!(
            verify_at(&body, &signature, "1700000000", "other", 300, 1_700_000_010),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_malformed_inputs() {
        let body = canonical_json(&json!({"a": 1}));
        let signature = sign(&body, "1700000000", "k");

        assert_eq!(
            verify_at(&body, &signature, "not-a-number", "k", 300, 1_700_000_010),
            Err(SignatureError::InvalidTimestamp)
        );
        assert_eq!(
            verify_at(&body, "deadbeef", "1700000000", "k", 300, 1_700_000_010),
            Err(SignatureError::MalformedSignature)
        );
        assert_eq!(
            verify_at(&body, "sha256=zz", "1700000000", "k", 300, 1_700_000_010),
            Err(SignatureError::MalformedSignature)
        );
        assert_eq!(
            verify_at("", &signature, "1700000000", "k", 300, 1_700_000_010),
            Err(SignatureError::EmptyPayload)
        );
    }

    #[test]
    fn test_error_mapping() {
        let err: crate::Error = SignatureError::Mismatch.into();
        assert_eq!(err.status_code(), 401);

        let err: crate::Error = SignatureError::InvalidTimestamp.into();
        assert_eq!(err.status_code(), 400);
    }
}
