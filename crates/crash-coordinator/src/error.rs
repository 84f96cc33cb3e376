//! Coordinator error types.

use thiserror::Error;

/// Coordinator error type.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Operation called after shutdown
    #[error("Coordinator is not running")]
    NotRunning,

    /// Configuration or path error
    #[error("Configuration error: {0}")]
    Config(#[from] crash_config_and_utils::CoreError),

    /// Channel server error
    #[error("Channel error: {0}")]
    Ipc(#[from] crash_ipc::IpcError),

    /// Uploader construction error
    #[error("Upload error: {0}")]
    Upload(#[from] dump_uploader::UploadError),

    /// The host refused to install the native crash handler
    #[error("Crash handler install failed: {0}")]
    CrashHandler(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using CoordinatorError.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
