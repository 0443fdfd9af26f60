//! Error-to-HTTP mapping and the JSON error body.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use seminar_session::ServiceError;

/// JSON body for every failed request: a human-readable message plus a
/// stable machine code.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// A failed request, ready to render.
///
/// Built from a [`ServiceError`] in almost every handler via `?`; the
/// one extra case is 401 for a missing or unrecognized credential, which
/// only the gateway knows about.
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: message.into(),
                code: code.to_string(),
            },
        }
    }

    /// 401: no credential, or one the role authority does not recognize.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let (status, code) = match &err {
            ServiceError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            ServiceError::Authorization(_) => (StatusCode::FORBIDDEN, "not_authorized"),
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServiceError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ServiceError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "store_unavailable")
            }
        };
        Self::new(status, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = %self.body.code, error = %self.body.error, "request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}
