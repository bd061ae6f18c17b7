pub mod batch;
pub mod export;
pub mod health;
pub mod jobs;
pub mod session;

use axum::{Json, http::StatusCode, response::IntoResponse};
use headshot_common::HeadshotError;
use tracing::error;

pub struct ApiError(pub HeadshotError);

impl From<HeadshotError> for ApiError {
    fn from(value: HeadshotError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0 {
            HeadshotError::InvalidArgument(_)
            | HeadshotError::UnsupportedImage(_)
            | HeadshotError::NoSourceImage => StatusCode::BAD_REQUEST,
            HeadshotError::JobNotFound(_) => StatusCode::NOT_FOUND,
            HeadshotError::BatchInProgress => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }

        (
            status,
            Json(serde_json::json!({
                "code": self.0.error_code(),
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}
