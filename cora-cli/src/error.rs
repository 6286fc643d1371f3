use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use cora_core::error::ScheduleError;

use crate::handlers::ApiResponse;

/// Error type for HTTP handlers.
///
/// Engine errors keep their meaning: a store that could not answer is a
/// 503, broken uniqueness is a 500. Policy rejections never get here.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("{0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Schedule(err @ ScheduleError::StoreUnavailable(_)) => {
                tracing::warn!(error = %err, "Store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            ApiError::Schedule(err @ ScheduleError::DataIntegrity { .. }) => {
                tracing::error!(error = %err, "Timetable integrity violation");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };

        (status, Json(ApiResponse::<()>::err(message))).into_response()
    }
}
