//! Webhook delivery client

use crate::webhook::signature::{canonical_json, sign, EVENT_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

/// Delivery failure classification. 4xx responses are the peer telling
/// us the request itself is wrong; retrying them cannot help.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("rejected with client status {0}")]
    ClientStatus(u16),

    #[error("server error status {0}")]
    ServerStatus(u16),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

impl WebhookError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, WebhookError::ClientStatus(_))
    }
}

impl From<WebhookError> for crate::Error {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::ClientStatus(_) => crate::Error::Validation(err.to_string()),
            _ => crate::Error::Network(err.to_string()),
        }
    }
}

/// Client for sending HMAC-signed webhooks to a peer service.
#[derive(Clone)]
pub struct WebhookClient {
    base_url: String,
    signing_secret: String,
    user_agent: String,
    max_retries: u32,
    http: reqwest::Client,
}

impl WebhookClient {
    pub fn new(
        base_url: impl Into<String>,
        signing_secret: impl Into<String>,
        timeout_seconds: u64,
        max_retries: u32,
    ) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| crate::Error::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signing_secret: signing_secret.into(),
            user_agent: format!("payflow/{}", env!("CARGO_PKG_VERSION")),
            max_retries,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sign and POST a payload.
    ///
    /// Success is any status below 400; the parsed response body is
    /// returned, or an opaque marker when the body is not JSON. 5xx,
    /// timeouts, and transport errors are retried with `2^attempt`
    /// second sleeps until the retry budget runs out; 4xx fails
    /// immediately.
    pub async fn send(
        &self,
        endpoint: &str,
        payload: &Value,
        event_id: Option<&str>,
    ) -> Result<Value, WebhookError> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let body = canonical_json(payload);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            .to_string();
        let signature = sign(&body, &timestamp, &self.signing_secret);

        let mut last_error = WebhookError::Transport("no attempt made".to_string());

        for attempt in 0..=self.max_retries {
            let mut request = self
                .http
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(reqwest::header::USER_AGENT, &self.user_agent)
                .header(SIGNATURE_HEADER, &signature)
                .header(TIMESTAMP_HEADER, &timestamp)
                .body(body.clone());

            if let Some(event_id) = event_id {
                request = request.header(EVENT_ID_HEADER, event_id);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.as_u16() < 400 {
                        info!(
                            "Webhook delivered: url={}, event_id={:?}, status={}",
                            url, event_id, status
                        );
                        let text = response.text().await.unwrap_or_default();
                        return Ok(serde_json::from_str(&text)
                            .unwrap_or_else(|_| json!({"status": "success"})));
                    }

                    warn!(
                        "Webhook delivery failed: url={}, event_id={:?}, status={}, attempt={}",
                        url,
                        event_id,
                        status,
                        attempt + 1
                    );

                    if status.is_client_error() {
                        return Err(WebhookError::ClientStatus(status.as_u16()));
                    }

                    last_error = WebhookError::ServerStatus(status.as_u16());
                }
                Err(e) if e.is_timeout() => {
                    warn!(
                        "Webhook timeout: url={}, event_id={:?}, attempt={}",
                        url,
                        event_id,
                        attempt + 1
                    );
                    last_error = WebhookError::Timeout;
                }
                Err(e) => {
                    warn!(
                        "Webhook transport error: url={}, event_id={:?}, attempt={}, error={}",
                        url,
                        event_id,
                        attempt + 1,
                        e
                    );
                    last_error = WebhookError::Transport(e.to_string());
                }
            }

            if attempt < self.max_retries {
                sleep(Duration::from_secs(1 << attempt)).await;
            }
        }

        Err(last_error)
    }
}
