//! Mapping from domain error kinds to protocol-level responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use cq_domain::error::Error;

/// Wrapper that turns a domain error into a JSON error response carrying
/// the stable kind string.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidRequest(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) | Error::TurnNotFound(_) => StatusCode::NOT_FOUND,
            Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Error::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "internal error");
        }

        (
            status,
            Json(serde_json::json!({
                "error": {
                    "kind": self.0.kind(),
                    "message": self.0.to_string(),
                }
            })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
