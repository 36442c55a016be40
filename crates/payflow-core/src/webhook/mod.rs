//! Signed webhook transport
//!
//! HMAC-SHA256 over `<timestamp>.<body>` with a tolerance window gives
//! replay-resistant, integrity-checked delivery between the two services.
//! The producer signs canonical JSON (sorted keys, no whitespace); the
//! consumer recomputes and compares in constant time.

pub mod client;
pub mod signature;

pub use client::{WebhookClient, WebhookError};
pub use signature::{
    canonical_json, sign, verify, SignatureError, EVENT_ID_HEADER, SIGNATURE_HEADER,
    TIMESTAMP_HEADER,
};
