//! `AppError`: the RPC boundary's single error type. §6 is blunt about the
//! HTTP contract ("200 on success, 400 on any business or authentication
//! error"), so unlike a REST API there is no 404/409/503 — every
//! [`librarian_core::LibrarianError`] kind collapses to 400 here, and only
//! the JSON body's `message` field distinguishes them.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use librarian_core::LibrarianError;
use serde_json::json;

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "success": false, "message": self.message }))).into_response()
    }
}

/// Every business error the catalog, search compiler, task manager, or
/// replication engine can raise arrives here as a flat 400; §7's kinds stay
/// legible in the logged `tracing::warn!`, not in the status code.
impl From<LibrarianError> for AppError {
    fn from(err: LibrarianError) -> Self {
        match &err {
            LibrarianError::AuthFailed => {
                tracing::warn!("authentication failed");
                Self { status: StatusCode::BAD_REQUEST, message: "authentication failed".into() }
            }
            LibrarianError::Internal(detail) => {
                tracing::error!(detail, "internal error at rpc boundary");
                Self {
                    status: StatusCode::BAD_REQUEST,
                    message: "internal error".into(),
                }
            }
            other => Self { status: StatusCode::BAD_REQUEST, message: other.to_string() },
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("malformed request payload: {err}"))
    }
}
