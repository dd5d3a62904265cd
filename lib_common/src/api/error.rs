use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::records::ServiceError;

/// # Application Error
///
/// Everything a handler can fail with before a response body starts streaming.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed query parameter or request body.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A service-layer failure, carrying the operation and store error.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl IntoResponse for AppError {
    /// NotFound → 404, Cancelled → 503, bad input → 400, anything else → 500.
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(detail) => {
                debug!("bad request: {}", detail);
                (
                    StatusCode::BAD_REQUEST,
                    json!({
                        "error_type": "BadRequest",
                        "message": "Bad Request",
                        "detail": detail
                    }),
                )
            }
            AppError::Service(e) if e.is_not_found() => (
                StatusCode::NOT_FOUND,
                json!({
                    "error_type": "NotFound",
                    "message": "Not Found",
                    "detail": e.to_string()
                }),
            ),
            // Only reachable while the server is shutting down: a client that went
            // away never sees this response.
            AppError::Service(e) if e.is_cancelled() => {
                debug!("request cancelled: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({
                        "error_type": "Cancelled",
                        "message": "Request cancelled",
                        "detail": e.to_string()
                    }),
                )
            }
            AppError::Service(e) => {
                error!("service error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error_type": "ServerError",
                        "message": "Server Error",
                        "detail": e.to_string()
                    }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
