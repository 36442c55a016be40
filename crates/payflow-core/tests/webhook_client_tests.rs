//! Webhook client delivery tests against a local mock server

use payflow_core::webhook::{self, WebhookClient, WebhookError};
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SECRET: &str = "test-secret";

fn client(server: &MockServer, retries: u32) -> WebhookClient {
    WebhookClient::new(server.uri(), SECRET, 5, retries).unwrap()
}

#[tokio::test]
async fn test_delivery_carries_verifiable_signature() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/webhooks/payment"))
        .and(header_exists("X-Webhook-Signature"))
        .and(header_exists("X-Webhook-Timestamp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "processed"})))
        .expect(1)
        .mount(&server)
        .await;

    let payload = json!({"b": 2, "a": 1});
    let response = client(&server, 0)
        .send("/v1/webhooks/payment", &payload, Some("evt-1"))
        .await
        .unwrap();
    assert_eq!(response["status"], "processed");

    // Recompute the signature over exactly what arrived on the wire.
    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let body = String::from_utf8(request.body.clone()).unwrap();
    assert_eq!(body, r#"{"a":1,"b":2}"#);

    let signature = request.headers["X-Webhook-Signature"]
        .to_str()
        .unwrap()
        .to_string();
    let timestamp = request.headers["X-Webhook-Timestamp"]
        .to_str()
        .unwrap()
        .to_string();
    let event_id = request.headers["X-Webhook-Event-ID"].to_str().unwrap();

    assert_eq!(event_id, "evt-1");
    assert!(webhook::verify(&body, &signature, &timestamp, SECRET, 300).is_ok());
    assert!(webhook::verify(&body, &signature, &timestamp, "wrong", 300).is_err());
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/webhooks/payment"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 3)
        .send("/v1/webhooks/payment", &json!({"a": 1}), None)
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::ClientStatus(400)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_server_error_retries_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/webhooks/payment"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/webhooks/payment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let response = client(&server, 2)
        .send("/v1/webhooks/payment", &json!({"a": 1}), None)
        .await
        .unwrap();

    assert_eq!(response["ok"], true);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_propagate_last_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/webhooks/payment"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(&server, 1)
        .send("/v1/webhooks/payment", &json!({"a": 1}), None)
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::ServerStatus(500)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_non_json_success_body_yields_opaque_marker() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let response = client(&server, 0)
        .send("/hook", &json!({"a": 1}), None)
        .await
        .unwrap();

    assert_eq!(response["status"], "success");
}
