//! Payment-service endpoints
//!
//! The internal processing endpoint is service-to-service only: it
//! requires a bearer service token. A gateway decline surfaces here as
//! 402; the asynchronous worker path carries the same outcome through
//! the subscription-update webhook instead.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use payflow_core::models::{PaymentAction, Transaction};
use payflow_core::payment::GatewayStatus;
use payflow_core::services::{PaymentRequest, PaymentResponse};
use payflow_core::Error;
use serde::Deserialize;
use uuid::Uuid;

pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, Error> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| Error::unauthorized("missing bearer token"))
}

#[derive(Debug, Deserialize)]
pub struct InternalPaymentRequest {
    pub subscription_id: Option<Uuid>,
    pub amount: f64,
    pub currency: String,
    pub card_number: String,
    pub card_expiry: String,
    pub card_cvv: String,
    pub cardholder_name: String,
    pub action: PaymentAction,
}

/// POST /v1/payments/internal/process
pub async fn process_internal_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<InternalPaymentRequest>,
) -> ApiResult<(StatusCode, Json<PaymentResponse>)> {
    let token = bearer_token(&headers)?;
    state.auth.verify_service_token(token)?;

    let payment_request = PaymentRequest {
        subscription_id: request.subscription_id,
        amount: request.amount,
        currency: request.currency,
        card_number: request.card_number,
        card_expiry: request.card_expiry,
        card_cvv: request.card_cvv,
        cardholder_name: request.cardholder_name,
        action: request.action,
    };

    let response = state.payments.process_payment(&payment_request).await?;

    // Declines map to 402 on this synchronous path only.
    if response.status == GatewayStatus::Failed {
        return Err(Error::payment(response.message).into());
    }

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /v1/payments/:id
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Transaction>> {
    let transaction = state
        .payments
        .get_transaction(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("transaction {} not found", id)))?;
    Ok(Json(transaction))
}

/// GET /v1/payments/subscription/:id
pub async fn list_subscription_transactions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Transaction>>> {
    let transactions = state.payments.get_subscription_transactions(id).await?;
    Ok(Json(transactions))
}

/// POST /v1/payments/:id/refund
pub async fn refund_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Transaction>> {
    let token = bearer_token(&headers)?;
    state.auth.verify_service_token(token)?;

    let transaction = state.payments.initiate_refund(id).await?;
    Ok(Json(transaction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");

        headers.insert(AUTHORIZATION, "Basic dXNlcg==".parse().unwrap());
        assert!(bearer_token(&headers).is_err());
    }
}
