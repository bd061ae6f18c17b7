use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use headshot_batch::{HeadshotSys, JobRecord, RetryDecision};
use headshot_common::HeadshotError;

use crate::handlers::ApiError;

pub async fn get_job(
    State(sys): State<Arc<HeadshotSys>>,
    Path(index): Path<usize>,
) -> Result<Json<JobRecord>, ApiError> {
    sys.job(index)
        .await?
        .map(Json)
        .ok_or(ApiError(HeadshotError::JobNotFound(index)))
}

pub async fn retry_job(
    State(sys): State<Arc<HeadshotSys>>,
    Path(index): Path<usize>,
) -> Result<(StatusCode, Json<RetryDecision>), ApiError> {
    let (decision, _handle) = sys.spawn_retry(index).await?;
    Ok((StatusCode::ACCEPTED, Json(decision)))
}
