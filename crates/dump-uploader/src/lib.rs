//! # Dump Uploader
//!
//! Drains the [`dump_queue::DumpQueue`] one dump at a time, attaching a
//! snapshot of the coordinator scope to each upload.
//!
//! - 2xx: recorded in the ledger, file removed
//! - 429: kept pending, no request before `Retry-After` elapses
//! - other 4xx: recorded in the ledger, file archived under `rejected/`
//! - 5xx or network error: kept pending for the next flush

mod context;
mod error;
mod transport;
mod uploader;

pub use context::{ContextSnapshot, ContextSource};
pub use error::{UploadError, UploadResult};
pub use transport::{parse_retry_after, DumpTransport, DumpUpload, HttpTransport, TransportResponse};
pub use uploader::{FlushSummary, UploadOutcome, Uploader, UploaderConfig, MAX_RATE_LIMIT_WINDOW};
