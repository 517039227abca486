//! # HTTP surfaces
//!
//! axum routers for the remote-signing webhook server and the UMA demo VASP.
//! The binaries under `demos/` only load configuration and serve these, so
//! the routers can be exercised in-process.

pub mod remote_signing;
pub mod uma;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::Error;

/// Error response: `{"status":"ERROR","reason":<message>}` with the status of
/// [`Error::status_code`].
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        error_response(status, &self.0)
    }
}

pub(crate) fn error_response(status: StatusCode, error: &Error) -> Response {
    if status.is_server_error() {
        tracing::error!("Request failed: {}", error);
    } else {
        tracing::warn!("Request rejected: {}", error);
    }
    (
        status,
        Json(json!({ "status": "ERROR", "reason": error.to_string() })),
    )
        .into_response()
}
