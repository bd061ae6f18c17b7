use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use headshot_batch::{BatchSnapshot, HeadshotSys};
use serde::Serialize;
use uuid::Uuid;

use crate::handlers::ApiError;

#[derive(Debug, Serialize)]
pub struct BatchStarted {
    pub run_id: Uuid,
    pub generation: u64,
    pub total: usize,
}

/// Starts a run and returns at once; progress is read back from `GET /batch`.
pub async fn start_batch(
    State(sys): State<Arc<HeadshotSys>>,
) -> Result<(StatusCode, Json<BatchStarted>), ApiError> {
    let run = sys.run_batch().await?;
    let started = BatchStarted {
        run_id: run.run_id(),
        generation: run.generation(),
        total: run.total(),
    };
    Ok((StatusCode::ACCEPTED, Json(started)))
}

pub async fn get_batch(State(sys): State<Arc<HeadshotSys>>) -> Json<BatchSnapshot> {
    Json(sys.snapshot().await)
}
