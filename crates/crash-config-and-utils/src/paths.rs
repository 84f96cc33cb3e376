//! File system paths owned by the coordinating process.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the home directory.
const BASE_DIR_NAME: &str = ".crashline";
/// Coordinator channel socket filename under the base directory.
const SOCKET_NAME: &str = "coordinator.sock";
/// Native crash handler output directory under the base directory.
const CRASH_DIR_NAME: &str = "crashes";

/// Manages file system paths for the coordinator.
///
/// Workers never touch any of these paths; they only know the socket.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.crashline`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// `~/.crashline/config.json`
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Directory the native crash handler writes dumps into.
    pub fn crash_dir(&self) -> PathBuf {
        self.base_dir.join(CRASH_DIR_NAME)
    }

    /// Persisted scope cache (`~/.crashline/scope.json`).
    pub fn scope_cache_file(&self) -> PathBuf {
        self.base_dir.join("scope.json")
    }

    /// Ledger of handled dump files (`~/.crashline/dump-ledger.json`).
    pub fn dump_ledger_file(&self) -> PathBuf {
        self.base_dir.join("dump-ledger.json")
    }

    /// Channel socket workers connect to (`~/.crashline/coordinator.sock`).
    pub fn socket_file(&self) -> PathBuf {
        self.base_dir.join(SOCKET_NAME)
    }

    /// `~/.crashline/coordinator.pid`
    pub fn pid_file(&self) -> PathBuf {
        self.base_dir.join("coordinator.pid")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Central JSONL log shared by every process.
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("dev.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.crash_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
