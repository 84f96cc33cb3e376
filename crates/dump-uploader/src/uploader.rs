//! Sequential dump delivery.

use crate::{ContextSnapshot, ContextSource, DumpTransport, DumpUpload};
use dump_queue::{CrashDumpRecord, DumpQueue};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Longest rate-limit window honoured, whatever the server asks for.
pub const MAX_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Uploader configuration.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Rate-limit window when a 429 carries no `Retry-After`.
    pub default_retry_after: Duration,
    /// Where permanently rejected dumps are moved.
    pub rejected_dir: PathBuf,
}

/// Result of one upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// 2xx; ledger updated and file removed.
    Delivered,
    /// 429 or still inside a rate-limit window; stays pending.
    RateLimited,
    /// Other 4xx; ledger updated and file archived.
    Rejected,
    /// 5xx, network error or ledger write failure; stays pending.
    Failed,
    /// File vanished before it could be read; ledger updated.
    Missing,
    /// File present but unreadable; stays pending, skipped for this pass.
    Unreadable,
}

/// Tally of one `flush_queue` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Records newly found by the scan.
    pub discovered: usize,
    pub delivered: usize,
    pub rejected: usize,
    pub missing: usize,
    /// Unreadable records passed over; they stay pending.
    pub skipped: usize,
    /// Still pending when the pass ended.
    pub remaining: usize,
    /// Set when the pass stopped early.
    pub halted_by: Option<UploadOutcome>,
}

/// Delivers crash dumps one at a time.
pub struct Uploader {
    queue: Arc<DumpQueue>,
    transport: Arc<dyn DumpTransport>,
    context: Arc<dyn ContextSource>,
    config: UploaderConfig,
    /// Held for every flush and every direct upload.
    in_flight: tokio::sync::Mutex<()>,
    rate_limited_until: Mutex<Option<Instant>>,
}

impl Uploader {
    pub fn new(
        queue: Arc<DumpQueue>,
        transport: Arc<dyn DumpTransport>,
        context: Arc<dyn ContextSource>,
        config: UploaderConfig,
    ) -> Self {
        Self {
            queue,
            transport,
            context,
            config,
            in_flight: tokio::sync::Mutex::new(()),
            rate_limited_until: Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &Arc<DumpQueue> {
        &self.queue
    }

    /// Remaining rate-limit window, if any.
    pub fn rate_limited_for(&self) -> Option<Duration> {
        let until = (*self.rate_limited_until.lock())?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    /// Scan for new dumps, then upload every pending one in lexical order.
    ///
    /// Stops at the first rate limit or transient failure; the rest stay
    /// pending for the next flush.
    pub async fn flush_queue(&self, extra: BTreeMap<String, Value>) -> FlushSummary {
        let _guard = self.in_flight.lock().await;

        let queue = self.queue.clone();
        let discovered = match tokio::task::spawn_blocking(move || queue.scan().len()).await {
            Ok(discovered) => discovered,
            Err(e) => {
                error!(error = %e, "Crash directory scan panicked");
                0
            }
        };
        let mut summary = FlushSummary {
            discovered,
            ..Default::default()
        };

        for record in self.queue.pending() {
            let snapshot = ContextSnapshot::new(self.context.current_scope(), extra.clone());
            match self.upload_locked(&record, &snapshot).await {
                UploadOutcome::Delivered => summary.delivered += 1,
                UploadOutcome::Rejected => summary.rejected += 1,
                UploadOutcome::Missing => summary.missing += 1,
                UploadOutcome::Unreadable => summary.skipped += 1,
                halted @ (UploadOutcome::RateLimited | UploadOutcome::Failed) => {
                    summary.halted_by = Some(halted);
                    break;
                }
            }
        }

        summary.remaining = self.queue.pending().len();
        let handled = summary.delivered + summary.rejected + summary.missing + summary.skipped;
        if handled > 0 || summary.halted_by.is_some() {
            info!(
                delivered = summary.delivered,
                rejected = summary.rejected,
                missing = summary.missing,
                skipped = summary.skipped,
                remaining = summary.remaining,
                halted_by = ?summary.halted_by,
                "Flush finished"
            );
        }
        summary
    }

    /// Upload a single record with the given snapshot.
    pub async fn upload(&self, record: &CrashDumpRecord, snapshot: &ContextSnapshot) -> UploadOutcome {
        let _guard = self.in_flight.lock().await;
        self.upload_locked(record, snapshot).await
    }

    async fn upload_locked(&self, record: &CrashDumpRecord, snapshot: &ContextSnapshot) -> UploadOutcome {
        if let Some(wait) = self.rate_limited_for() {
            debug!(path = %record.path.display(), wait_ms = wait.as_millis() as u64, "Rate limited, not sending");
            return UploadOutcome::RateLimited;
        }

        let file_name = match record.file_name() {
            Some(name) => name.to_string(),
            None => {
                warn!(path = %record.path.display(), "Dump path has no file name");
                return self.finish(record, UploadOutcome::Missing).await;
            }
        };

        let bytes = match tokio::fs::read(&record.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(file = %file_name, "Dump vanished before upload");
                return self.finish(record, UploadOutcome::Missing).await;
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "Dump unreadable, skipping this pass");
                return UploadOutcome::Unreadable;
            }
        };

        let upload = DumpUpload {
            file_name: file_name.clone(),
            bytes,
            sidecar: snapshot.to_sidecar(),
        };

        let response = match self.transport.send(upload).await {
            Ok(response) => response,
            Err(e) => {
                warn!(file = %file_name, error = %e, "Dump upload failed, will retry");
                return UploadOutcome::Failed;
            }
        };

        match response.status {
            200..=299 => {
                info!(file = %file_name, status = response.status, "Dump delivered");
                self.finish(record, UploadOutcome::Delivered).await
            }
            429 => {
                let wait = response
                    .retry_after
                    .unwrap_or(self.config.default_retry_after)
                    .min(MAX_RATE_LIMIT_WINDOW);
                let now = Instant::now();
                let until = now
                    .checked_add(wait)
                    .or_else(|| now.checked_add(self.config.default_retry_after))
                    .unwrap_or(now);
                *self.rate_limited_until.lock() = Some(until);
                warn!(file = %file_name, retry_after_secs = wait.as_secs(), "Ingestion rate limited");
                UploadOutcome::RateLimited
            }
            400..=499 => {
                error!(file = %file_name, status = response.status, "Dump rejected by ingestion endpoint");
                self.finish(record, UploadOutcome::Rejected).await
            }
            status => {
                warn!(file = %file_name, status, "Ingestion endpoint error, will retry");
                UploadOutcome::Failed
            }
        }
    }

    /// Record a terminal outcome in the ledger and dispose of the file,
    /// on the blocking pool.
    async fn finish(&self, record: &CrashDumpRecord, outcome: UploadOutcome) -> UploadOutcome {
        let queue = self.queue.clone();
        let path = record.path.clone();
        let rejected_dir = self.config.rejected_dir.clone();
        match tokio::task::spawn_blocking(move || settle(&queue, &path, &rejected_dir, outcome)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(path = %record.path.display(), error = %e, "Dump settle task panicked");
                UploadOutcome::Failed
            }
        }
    }
}

fn settle(queue: &DumpQueue, path: &Path, rejected_dir: &Path, outcome: UploadOutcome) -> UploadOutcome {
    if let Err(e) = queue.mark_uploaded(path) {
        // Not recorded, so the dump is retried on a later flush.
        error!(path = %path.display(), error = %e, "Failed to record dump in ledger");
        return UploadOutcome::Failed;
    }

    match outcome {
        UploadOutcome::Delivered => {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove delivered dump");
            }
        }
        UploadOutcome::Rejected => {
            if let Err(e) = archive(path, rejected_dir) {
                warn!(path = %path.display(), error = %e, "Failed to archive rejected dump");
            }
        }
        _ => {}
    }
    outcome
}

fn archive(path: &Path, rejected_dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(rejected_dir)?;
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "dump path has no file name"))?;
    std::fs::rename(path, rejected_dir.join(name))
}
