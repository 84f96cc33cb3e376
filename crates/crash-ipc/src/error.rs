//! Channel error types.

use thiserror::Error;

/// Channel error type.
#[derive(Error, Debug)]
pub enum IpcError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `run` was called on a server whose listener is already taken
    #[error("Channel server already running")]
    AlreadyRunning,
}

/// Result type alias using IpcError.
pub type IpcResult<T> = Result<T, IpcError>;
