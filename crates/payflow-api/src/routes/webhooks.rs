//! Signed webhook ingestion
//!
//! Verification runs over the raw body bytes before any parsing, so a
//! tampered or replayed request never reaches the inbox.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use payflow_core::models::PaymentEventPayload;
use payflow_core::webhook::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use payflow_core::Error;
use serde_json::{json, Value};

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, Error> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| Error::validation(format!("Missing {} header", name)))
}

/// POST /v1/webhooks/payment
pub async fn receive_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<payflow_core::services::WebhookResponse>> {
    let signature = required_header(&headers, SIGNATURE_HEADER)?;
    let timestamp = required_header(&headers, TIMESTAMP_HEADER)?;

    let payload_str = std::str::from_utf8(&body)
        .map_err(|_| Error::validation("body is not valid UTF-8"))?;

    webhook::verify(
        payload_str,
        signature,
        timestamp,
        &state.config.webhook.inbound_signing_secret,
        state.config.webhook.tolerance_seconds,
    )?;

    let payload: PaymentEventPayload = serde_json::from_str(payload_str)
        .map_err(|e| Error::validation(format!("Invalid webhook payload: {}", e)))?;

    let response = state.webhooks.process_payment_webhook(&payload).await?;
    Ok(Json(response))
}

/// GET /v1/webhooks/payment/:event_id/status
pub async fn webhook_status(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let row = state
        .webhooks
        .get_webhook_status(&event_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("webhook event {} not found", event_id)))?;

    Ok(Json(json!({
        "event_id": row.event_id,
        "processed": row.processed,
        "processed_at": row.processed_at,
        "retry_count": row.retry_count,
        "error_message": row.error_message,
        "created_at": row.created_at,
    })))
}
