//! Logging initialization.
//!
//! Every Crashline process writes structured JSONL to the central log file
//! under the base directory through the observability crate.

use crate::Paths;
use observability::LogConfig;

/// Initialize logging for the coordinator.
///
/// Level comes from `RUST_LOG` or the provided default.
///
/// ```ignore
/// init_logging(&paths, "info");
/// tracing::info!("coordinator started");
/// ```
pub fn init_logging(paths: &Paths, level: &str) -> bool {
    init_logging_for_service(paths, "coordinator", level)
}

/// Initialize logging with another service name.
///
/// Worker processes pass `"worker"` so their lines can be told apart from
/// the coordinator's in the shared file.
pub fn init_logging_for_service(paths: &Paths, service_name: &str, level: &str) -> bool {
    observability::init_with_config(log_config(paths, service_name, level))
}

fn log_config(paths: &Paths, service_name: &str, level: &str) -> LogConfig {
    LogConfig::for_service(service_name, level)
        .with_log_path(paths.log_file())
        .with_stderr()
}
