//! JSON envelopes and error-to-status mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::PatchError;

#[derive(Debug, Serialize)]
struct Failure<'a> {
    success: bool,
    error: &'a str,
}

/// `{success:false, error}` with `status`.
pub fn failure(status: StatusCode, error: &str) -> Response {
    (
        status,
        Json(Failure {
            success: false,
            error,
        }),
    )
        .into_response()
}

pub fn status_for(err: &PatchError) -> StatusCode {
    match err {
        PatchError::PathRejected { .. } => StatusCode::BAD_REQUEST,
        PatchError::NotFound(_) => StatusCode::NOT_FOUND,
        PatchError::Io { .. } | PatchError::ApplyFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        PatchError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
        PatchError::Cancelled(_) => StatusCode::CONFLICT,
    }
}

impl IntoResponse for PatchError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        match self {
            PatchError::NotFound(_) => failure(status, "not found"),
            other => failure(status, &other.to_string()),
        }
    }
}
