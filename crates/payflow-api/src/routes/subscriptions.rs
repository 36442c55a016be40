//! Subscription lifecycle endpoints

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use payflow_core::models::Subscription;
use payflow_core::services::{CreateSubscriptionRequest, CreateTrialRequest};
use payflow_core::Error;
use serde::Deserialize;
use uuid::Uuid;

/// POST /v1/subscriptions
pub async fn create_subscription(
    State(state): State<AppState>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<Subscription>)> {
    let subscription = state.subscriptions.create_subscription(&request).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// POST /v1/subscriptions/trial
pub async fn create_trial_subscription(
    State(state): State<AppState>,
    Json(request): Json<CreateTrialRequest>,
) -> ApiResult<(StatusCode, Json<Subscription>)> {
    let subscription = state
        .subscriptions
        .create_trial_subscription(&request)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// GET /v1/subscriptions/:id
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Subscription>> {
    let subscription = state
        .subscriptions
        .get_subscription(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("subscription {} not found", id)))?;
    Ok(Json(subscription))
}

/// GET /v1/subscriptions/user/:user_id
pub async fn list_user_subscriptions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Vec<Subscription>>> {
    let subscriptions = state.subscriptions.get_user_subscriptions(user_id).await?;
    Ok(Json(subscriptions))
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub new_plan_id: i32,
}

/// POST /v1/subscriptions/:id/change-plan
pub async fn change_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangePlanRequest>,
) -> ApiResult<Json<Subscription>> {
    let subscription = state
        .subscriptions
        .change_plan(id, request.new_plan_id)
        .await?;
    Ok(Json(subscription))
}

/// POST /v1/subscriptions/:id/cancel
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Subscription>> {
    let subscription = state.subscriptions.cancel_subscription(id).await?;
    Ok(Json(subscription))
}
