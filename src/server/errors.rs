use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use super::types::ErrorResponse;
use crate::RagError;

impl RagError {
    #[inline]
    pub fn status_code(&self) -> StatusCode {
        match self {
            RagError::Validation(_) => StatusCode::BAD_REQUEST,
            RagError::NotFound(_) => StatusCode::NOT_FOUND,
            RagError::Upstream(_) => StatusCode::BAD_GATEWAY,
            RagError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            RagError::MissingCredential(_)
            | RagError::Config(_)
            | RagError::Io(_)
            | RagError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for RagError {
    #[inline]
    fn from(rejection: JsonRejection) -> Self {
        RagError::Validation(rejection.body_text())
    }
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        } else {
            warn!("Rejected request ({}): {}", status, self);
        }

        let body = ErrorResponse {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
