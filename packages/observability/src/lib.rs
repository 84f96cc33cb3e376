//! # Observability
//!
//! Structured logging shared by every Crashline process.
//!
//! The coordinator and the worker processes only use `tracing` macros. This
//! crate installs the subscriber that turns those events into JSONL lines in
//! one central file, by default `~/.crashline/logs/dev.jsonl`:
//!
//! - `tail -f ~/.crashline/logs/dev.jsonl | jq`
//! - `jq 'select(.service == "coordinator")'` to follow one process
//!
//! Each line is written with a single append, so a worker that dies mid-way
//! never leaves half a line inside the coordinator's output.
//!
//! ```rust,ignore
//! observability::init_with_config(
//!     observability::LogConfig::for_service("coordinator", "debug").with_stderr(),
//! );
//! tracing::info!("coordinator started");
//! ```

mod json_layer;
mod log_file;

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogEntry};
pub use log_file::SharedLogFile;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Process role written on every line ("coordinator", "worker", ...).
    pub service_name: String,

    /// Filter used when `RUST_LOG` is unset.
    pub default_level: String,

    /// Central JSONL file; [`default_log_path`] when `None`.
    pub log_path: Option<PathBuf>,

    /// Also print compact lines to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

impl LogConfig {
    pub fn for_service(service_name: impl Into<String>, default_level: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            default_level: default_level.into(),
            ..Default::default()
        }
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_stderr(mut self) -> Self {
        self.also_stderr = true;
        self
    }

    fn resolved_log_path(&self) -> PathBuf {
        self.log_path.clone().unwrap_or_else(default_log_path)
    }
}

/// `~/.crashline/logs/dev.jsonl`, under the temp dir when there is no home
/// directory (sandboxed helper processes).
pub fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".crashline")
        .join("logs")
        .join("dev.jsonl")
}

/// Install the subscriber with the service name only.
pub fn init(service_name: &str) -> bool {
    init_with_config(LogConfig::for_service(service_name, "info"))
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed. When the log
/// file cannot be opened the process logs to stderr only.
pub fn init_with_config(config: LogConfig) -> bool {
    let log_path = config.resolved_log_path();

    let json_layer = match SharedLogFile::open(&log_path) {
        Ok(file) => Some(JsonLayer::new(config.service_name.clone(), file)),
        Err(e) => {
            eprintln!("crashline: cannot open log file {}: {}", log_path.display(), e);
            None
        }
    };
    let to_file = json_layer.is_some();

    let stderr_layer = (config.also_stderr || !to_file).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(io::stderr)
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer.map(|layer| layer.with_filter(env_filter(&config.default_level))))
        .with(stderr_layer.map(|layer| layer.with_filter(env_filter(&config.default_level))))
        .try_init()
        .is_ok();

    if installed && to_file {
        tracing::debug!(
            log_path = %log_path.display(),
            service = %config.service_name,
            "Logging initialized"
        );
    }
    installed
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}
