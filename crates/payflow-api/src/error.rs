//! API error responses
//!
//! Every error leaves the service as the canonical
//! `{ "success": false, "error": ..., "status_code": ... }` body with the
//! matching HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use payflow_core::Error;
use serde_json::json;

pub struct ApiError(pub Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.0.status_code();
        let status =
            StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = Json(json!({
            "success": false,
            "error": self.0.to_string(),
            "status_code": status_code,
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError(Error::validation("missing field")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["status_code"], 400);
        assert!(body["error"].as_str().unwrap().contains("missing field"));
    }

    #[tokio::test]
    async fn test_payment_error_surfaces_as_402() {
        let response = ApiError(Error::payment("card_declined")).into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }
}
