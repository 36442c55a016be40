//! Usage metering endpoints

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use payflow_core::services::usage_service::UsageReport;
use payflow_core::services::UsageCheckResponse;
use serde::Deserialize;

fn default_delta() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UseFeatureRequest {
    pub user_id: i64,
    pub feature_name: String,
    #[serde(default = "default_delta")]
    pub delta: i64,
}

/// POST /v1/usage/use
pub async fn use_feature(
    State(state): State<AppState>,
    Json(request): Json<UseFeatureRequest>,
) -> ApiResult<Json<UsageCheckResponse>> {
    let response = state
        .usage
        .use_feature(request.user_id, &request.feature_name, request.delta)
        .await?;
    Ok(Json(response))
}

/// GET /v1/usage/:user_id
pub async fn get_user_usage(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Vec<UsageReport>>> {
    let usage = state.usage.get_user_usage(user_id).await?;
    Ok(Json(usage))
}
