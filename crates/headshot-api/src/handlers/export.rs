use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use headshot_batch::HeadshotSys;
use serde::Serialize;

use crate::handlers::ApiError;

#[derive(Debug, Serialize)]
pub struct ExportScheduled {
    pub scheduled: Vec<usize>,
}

#[derive(Debug, Serialize)]
pub struct ExportResult {
    pub index: usize,
    pub exported: bool,
}

/// Schedules the staggered export of every finished job and returns without
/// waiting for the writes.
pub async fn export_all(State(sys): State<Arc<HeadshotSys>>) -> (StatusCode, Json<ExportScheduled>) {
    let batch = sys.export_all().await;
    let scheduled = batch.scheduled().to_vec();
    (StatusCode::ACCEPTED, Json(ExportScheduled { scheduled }))
}

pub async fn export_job(
    State(sys): State<Arc<HeadshotSys>>,
    Path(index): Path<usize>,
) -> Result<Json<ExportResult>, ApiError> {
    let exported = sys.export_one(index).await?;
    Ok(Json(ExportResult { index, exported }))
}
