//! Configuration, file system layout and logging setup shared by the
//! Crashline coordinator and its workers.

mod config;
mod error;
mod ingestion;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_LOG_LEVEL, DEFAULT_MAX_BREADCRUMBS};
pub use error::{CoreError, CoreResult};
pub use ingestion::{IngestionKey, PLACEHOLDER_SUBMIT_URL};
pub use logging::{init_logging, init_logging_for_service};
pub use paths::Paths;
