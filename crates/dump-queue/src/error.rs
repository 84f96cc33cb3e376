//! Dump queue error types.

use std::path::PathBuf;
use thiserror::Error;

/// Dump queue error type.
#[derive(Error, Debug)]
pub enum DumpQueueError {
    /// Ledger could not be persisted
    #[error("Ledger error: {0}")]
    Ledger(#[from] persisted_store::StoreError),

    /// Path is not a dump file path
    #[error("Invalid dump path: {0}")]
    InvalidPath(PathBuf),
}

/// Result type alias using DumpQueueError.
pub type DumpQueueResult<T> = Result<T, DumpQueueError>;
