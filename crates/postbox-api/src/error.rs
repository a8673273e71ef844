use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use postbox_engine::PostboxError;
use postbox_types::api::ErrorResponse;

/// Handler error. Engine errors keep their meaning; anything else is a 500.
#[derive(Debug)]
pub enum ApiError {
    Engine(PostboxError),
    Internal,
}

impl From<PostboxError> for ApiError {
    fn from(err: PostboxError) -> Self {
        ApiError::Engine(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Engine(PostboxError::Validation(e)) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse { error: e.to_string() }),
            )
                .into_response(),
            ApiError::Engine(PostboxError::NotFound) => StatusCode::NOT_FOUND.into_response(),
            ApiError::Engine(PostboxError::Integrity(detail)) => {
                error!("Write conflict persisted after retry: {}", detail);
                StatusCode::CONFLICT.into_response()
            }
            ApiError::Engine(PostboxError::Store(e)) => {
                error!("Store error: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
