use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use docvault_library::LibraryError;

/// Errors that can occur when running the docvault server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No valid identity was presented.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The request could not be parsed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A pipeline error surfaced through the API.
    #[error(transparent)]
    Library(#[from] LibraryError),
}

impl ServerError {
    /// HTTP status, machine-readable kind, and client-facing message.
    ///
    /// Server-side failures get a fixed message; their details only go to
    /// the log.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, "unauthenticated", msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg.clone()),
            Self::Config(_) | Self::Io(_) => internal("internal", "internal server error"),
            Self::Library(e) => match e {
                LibraryError::InvalidInput(msg) => {
                    (StatusCode::BAD_REQUEST, e.kind(), msg.clone())
                }
                LibraryError::NotFound(msg) => (StatusCode::NOT_FOUND, e.kind(), msg.clone()),
                LibraryError::Forbidden(msg) => (StatusCode::FORBIDDEN, e.kind(), msg.clone()),
                LibraryError::Conflict(msg) => (StatusCode::CONFLICT, e.kind(), msg.clone()),
                LibraryError::UploadFailed(_) => internal(e.kind(), "upload failed"),
                LibraryError::ReplaceFailed(_) => internal(e.kind(), "replace failed"),
                LibraryError::Storage(_) | LibraryError::Configuration(_) => {
                    internal(e.kind(), "internal server error")
                }
            },
        }
    }
}

fn internal(kind: &'static str, message: &str) -> (StatusCode, &'static str, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, kind, message.to_owned())
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();
        if status.is_server_error() {
            error!(kind, error = %self, "request failed");
        }

        let body = serde_json::json!({ "kind": kind, "error": message });
        (status, axum::Json(body)).into_response()
    }
}
