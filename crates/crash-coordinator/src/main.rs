//! Crashline coordinator - owns crash dumps, scope and delivery for one application.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use crash_config_and_utils::{init_logging, Config, Paths};
use crash_coordinator::{Coordinator, ExternalCrashHandler, LogEventSink};
use crash_protocol_types::Scope;
use dump_queue::DumpQueue;
use dump_uploader::{ContextSource, HttpTransport, Uploader, UploaderConfig};
use scope_cache::ScopeCache;
use tracing::info;

/// Crashline coordinator command-line interface.
#[derive(Parser)]
#[command(name = "crashline-coordinator")]
#[command(about = "Crash dump collection and delivery for multi-process applications")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (socket, crashes, config). Defaults to ~/.crashline
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator in the foreground until Ctrl-C
    Run,
    /// Upload pending crash dumps once and exit
    Flush,
    /// Show pending dumps and ledger size
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    let level = cli.log_level.unwrap_or_else(|| config.log_level.clone());
    init_logging(&paths, &level);

    match cli.command {
        Some(Commands::Run) | None => run(config, paths).await,
        Some(Commands::Flush) => flush(config, paths).await,
        Some(Commands::Status) => status(&config, &paths).await,
    }
}

async fn coordinator_is_running(paths: &Paths) -> bool {
    let socket_path = paths.socket_file();
    socket_path.exists() && tokio::net::UnixStream::connect(&socket_path).await.is_ok()
}

async fn run(config: Config, paths: Paths) -> anyhow::Result<()> {
    if coordinator_is_running(&paths).await {
        bail!("Coordinator is already running");
    }

    paths.ensure_dirs()?;
    let pid_file = PidFile::create(&paths.pid_file()).context("Failed to write PID file")?;

    let coordinator = Coordinator::start(
        config,
        paths.clone(),
        Arc::new(LogEventSink),
        Arc::new(ExternalCrashHandler),
    )?;
    info!(pid = pid_file.pid, "Coordinator running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    coordinator.shutdown().await?;
    Ok(())
}

/// PID file removed on drop, whether the run ends cleanly or not.
struct PidFile {
    path: PathBuf,
    pid: u32,
}

impl PidFile {
    /// Replace any stale file left by a previous run.
    fn create(path: &Path) -> std::io::Result<Self> {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
        let pid = std::process::id();
        std::fs::write(path, pid.to_string())?;
        Ok(Self {
            path: path.to_path_buf(),
            pid,
        })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Scope as last persisted by a coordinator run.
struct CachedScope(ScopeCache);

impl ContextSource for CachedScope {
    fn current_scope(&self) -> Scope {
        self.0.load()
    }
}

async fn flush(config: Config, paths: Paths) -> anyhow::Result<()> {
    if coordinator_is_running(&paths).await {
        println!("Coordinator is running and flushes on its own");
        return Ok(());
    }

    let Some(key) = config.ingestion_key()? else {
        println!("No ingestion key configured (set CRASHLINE_DSN)");
        return Ok(());
    };

    let crash_dir = config.crash_dir(&paths);
    let queue = Arc::new(DumpQueue::open(&crash_dir, paths.dump_ledger_file()));
    let transport = HttpTransport::new(key.minidump_endpoint()?, config.http_timeout())?;
    let context = CachedScope(ScopeCache::open(paths.scope_cache_file(), config.max_breadcrumbs));
    let uploader = Uploader::new(
        queue,
        Arc::new(transport),
        Arc::new(context),
        UploaderConfig {
            default_retry_after: config.default_retry_after(),
            rejected_dir: config.rejected_dir(&paths),
        },
    );

    let summary = uploader.flush_queue(Default::default()).await;
    println!("Delivered: {}", summary.delivered);
    println!("Rejected:  {}", summary.rejected);
    println!("Missing:   {}", summary.missing);
    println!("Skipped:   {}", summary.skipped);
    println!("Remaining: {}", summary.remaining);
    if let Some(halted_by) = summary.halted_by {
        println!("Stopped early: {:?}", halted_by);
    }
    Ok(())
}

async fn status(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let crash_dir = config.crash_dir(paths);
    let queue = DumpQueue::open(&crash_dir, paths.dump_ledger_file());
    let pending = queue.pending_preview().len();

    if coordinator_is_running(paths).await {
        let pid = std::fs::read_to_string(paths.pid_file()).ok();
        println!("Coordinator is running");
        if let Some(pid) = pid {
            println!("  PID:     {}", pid.trim());
        }
        println!("  Socket:  {}", paths.socket_file().display());
    } else {
        println!("Coordinator is not running");
    }
    println!("  Crashes: {}", crash_dir.display());
    println!("  Pending: {}", pending);
    println!("  Handled: {}", queue.handled_count());
    println!(
        "  Uploads: {}",
        if config.ingestion_key()?.is_some() { "enabled" } else { "disabled (no ingestion key)" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pid_file_replaces_stale_and_is_removed_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coordinator.pid");
        std::fs::write(&path, "99999").unwrap();

        let pid_file = PidFile::create(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), std::process::id().to_string());

        drop(pid_file);
        assert!(!path.exists());
    }

    #[test]
    fn test_pid_file_removed_when_start_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coordinator.pid");

        let start = || -> anyhow::Result<()> {
            let _pid_file = PidFile::create(&path)?;
            bail!("crash handler refused to install");
        };

        assert!(start().is_err());
        assert!(!path.exists());
    }
}
