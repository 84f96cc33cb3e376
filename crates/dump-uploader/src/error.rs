//! Uploader error types.

use thiserror::Error;

/// Uploader error type.
#[derive(Error, Debug)]
pub enum UploadError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Send error from a non-HTTP transport
    #[error("Send failed: {0}")]
    Send(String),
}

/// Result type alias using UploadError.
pub type UploadResult<T> = Result<T, UploadError>;
