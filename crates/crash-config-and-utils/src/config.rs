//! Configuration management for the coordinator.

use crate::{CoreError, CoreResult, IngestionKey, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default breadcrumb ring-buffer capacity.
pub const DEFAULT_MAX_BREADCRUMBS: usize = 100;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
/// Archive for dumps the ingestion endpoint permanently rejected.
const REJECTED_DIR_NAME: &str = "rejected";

/// Main coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Ingestion key (DSN). Without one, dumps accumulate locally.
    #[serde(default)]
    pub ingestion_key: Option<String>,
    /// Overrides `Paths::crash_dir` when set.
    #[serde(default)]
    pub crash_dir: Option<PathBuf>,
    #[serde(default = "default_max_breadcrumbs")]
    pub max_breadcrumbs: usize,
    /// Seconds between two crash directory scans.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// How long a worker waits for the handshake echo before degrading.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Rate-limit window used when a 429 carries no `Retry-After`.
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_max_breadcrumbs() -> usize {
    DEFAULT_MAX_BREADCRUMBS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_handshake_timeout_ms() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_MS
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_retry_after_secs() -> u64 {
    DEFAULT_RETRY_AFTER_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            ingestion_key: None,
            crash_dir: None,
            max_breadcrumbs: DEFAULT_MAX_BREADCRUMBS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            default_retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults.
    /// Environment variables win over the file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            debug!(path = %config_path.display(), "Loading config file");
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Some(log_level) = non_empty_env("CRASHLINE_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(dsn) = non_empty_env("CRASHLINE_DSN") {
            debug!("Ingestion key taken from CRASHLINE_DSN");
            self.ingestion_key = Some(dsn);
        }
    }

    /// Parsed ingestion key, `None` when unconfigured.
    pub fn ingestion_key(&self) -> CoreResult<Option<IngestionKey>> {
        self.ingestion_key
            .as_deref()
            .map(IngestionKey::parse)
            .transpose()
    }

    /// Effective crash directory.
    pub fn crash_dir(&self, paths: &Paths) -> PathBuf {
        self.crash_dir.clone().unwrap_or_else(|| paths.crash_dir())
    }

    /// `<crash_dir>/rejected`, created lazily when a dump is rejected.
    pub fn rejected_dir(&self, paths: &Paths) -> PathBuf {
        self.crash_dir(paths).join(REJECTED_DIR_NAME)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after_secs)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    let raw = std::env::var(name).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
