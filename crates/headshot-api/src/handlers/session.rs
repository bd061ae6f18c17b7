use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header::CONTENT_TYPE},
};
use headshot_batch::{HeadshotSys, Phase};
use headshot_common::{HeadshotError, SourceImage};
use serde::Serialize;

use crate::handlers::ApiError;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub generation: u64,
    pub phase: Phase,
}

/// `PUT /image`: the body is the raw image, typed by `Content-Type`.
pub async fn upload_image(
    State(sys): State<Arc<HeadshotSys>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SessionResponse>, ApiError> {
    let mime_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| HeadshotError::InvalidArgument("missing Content-Type header".to_string()))?;
    let image = SourceImage::from_bytes(mime_type, body)?;

    let generation = sys.upload(image).await;
    Ok(Json(SessionResponse {
        generation,
        phase: sys.phase().await,
    }))
}

pub async fn reset_session(State(sys): State<Arc<HeadshotSys>>) -> Json<SessionResponse> {
    let generation = sys.reset().await;
    Json(SessionResponse {
        generation,
        phase: sys.phase().await,
    })
}
