//! Crash directory scanner and pending set.

use crate::{DumpLedger, DumpQueueError, DumpQueueResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use persisted_store::PersistedStore;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extension the native crash handler gives its dumps.
pub const DUMP_EXTENSION: &str = "dmp";

/// A dump discovered in the crash directory and not yet handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashDumpRecord {
    /// Absolute path to the dump file.
    pub path: PathBuf,
    pub discovered_at: DateTime<Utc>,
}

impl CrashDumpRecord {
    /// Ledger key.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Durable queue of crash dumps awaiting upload.
pub struct DumpQueue {
    crash_dir: PathBuf,
    ledger: PersistedStore<DumpLedger>,
    /// Keyed by file name, so iteration is lexical.
    pending: Mutex<BTreeMap<String, CrashDumpRecord>>,
}

impl DumpQueue {
    /// Open the queue over `crash_dir`, loading the ledger at `ledger_path`.
    pub fn open(crash_dir: impl Into<PathBuf>, ledger_path: impl Into<PathBuf>) -> Self {
        let crash_dir = crash_dir.into();
        let crash_dir = fs::canonicalize(&crash_dir).unwrap_or(crash_dir);
        let ledger: PersistedStore<DumpLedger> = PersistedStore::open_or_default(ledger_path);

        debug!(
            crash_dir = %crash_dir.display(),
            handled = ledger.get().len(),
            "dump queue opened"
        );

        Self {
            crash_dir,
            ledger,
            pending: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn crash_dir(&self) -> &Path {
        &self.crash_dir
    }

    /// Find dumps not yet handled and not already pending.
    ///
    /// Zero-length files are skipped: the handler is still writing them.
    /// Returns only the newly discovered records, in lexical order. An
    /// unreadable crash directory yields nothing. Never writes the ledger.
    pub fn scan(&self) -> Vec<CrashDumpRecord> {
        let Some(ready) = self.list_ready() else {
            return Vec::new();
        };

        let ledger = self.ledger.get();
        let mut pending = self.pending.lock();
        let now = Utc::now();
        let mut discovered = Vec::new();

        for (name, path) in ready {
            if ledger.contains(&name) || pending.contains_key(&name) {
                continue;
            }
            let record = CrashDumpRecord {
                path,
                discovered_at: now,
            };
            pending.insert(name, record.clone());
            discovered.push(record);
        }

        if !discovered.is_empty() {
            info!(count = discovered.len(), "discovered new crash dumps");
        }
        discovered
    }

    /// File names a `scan` would find right now, without touching the
    /// pending set. Safe to call from a process that does not own the queue.
    pub fn pending_preview(&self) -> Vec<String> {
        let Some(ready) = self.list_ready() else {
            return Vec::new();
        };
        let ledger = self.ledger.get();
        ready
            .into_keys()
            .filter(|name| !ledger.contains(name))
            .collect()
    }

    /// Every discovered record not yet marked, in lexical order.
    pub fn pending(&self) -> Vec<CrashDumpRecord> {
        self.pending.lock().values().cloned().collect()
    }

    /// Durably record the dump as handled and drop it from the pending set.
    pub fn mark_uploaded(&self, path: &Path) -> DumpQueueResult<()> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DumpQueueError::InvalidPath(path.to_path_buf()))?
            .to_string();

        self.ledger.update(|ledger| ledger.with_entry(&name))?;
        self.pending.lock().remove(&name);

        debug!(file = %name, "dump recorded in ledger");
        Ok(())
    }

    /// Number of ledger entries.
    pub fn handled_count(&self) -> usize {
        self.ledger.get().len()
    }

    fn list_ready(&self) -> Option<BTreeMap<String, PathBuf>> {
        match list_dumps(&self.crash_dir) {
            Ok(ready) => Some(ready),
            Err(e) => {
                warn!(
                    crash_dir = %self.crash_dir.display(),
                    error = %e,
                    "crash directory unreadable, skipping scan"
                );
                None
            }
        }
    }
}

/// Non-empty dump files in `dir`, keyed by file name.
fn list_dumps(dir: &Path) -> std::io::Result<BTreeMap<String, PathBuf>> {
    let mut ready = BTreeMap::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable crash directory entry");
                continue;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(DUMP_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.is_file() && metadata.len() > 0 {
            ready.insert(name, path);
        }
    }

    Ok(ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_dump(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"MDMP\x93\xa7").unwrap();
        path
    }

    fn names(records: &[CrashDumpRecord]) -> Vec<String> {
        records
            .iter()
            .filter_map(|r| r.file_name().map(str::to_string))
            .collect()
    }

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempdir().unwrap();
        let crash_dir = dir.path().join("crashes");
        fs::create_dir_all(&crash_dir).unwrap();
        let ledger = dir.path().join("dump-ledger.json");
        (dir, crash_dir, ledger)
    }

    #[test]
    fn test_scan_is_idempotent() {
        let (_dir, crash_dir, ledger) = setup();
        write_dump(&crash_dir, "a.dmp");

        let queue = DumpQueue::open(&crash_dir, &ledger);
        assert_eq!(names(&queue.scan()), vec!["a.dmp"]);
        assert!(queue.scan().is_empty());
        assert_eq!(queue.pending().len(), 1);
    }

    #[test]
    fn test_scan_returns_lexical_order() {
        let (_dir, crash_dir, ledger) = setup();
        write_dump(&crash_dir, "c.dmp");
        write_dump(&crash_dir, "a.dmp");
        write_dump(&crash_dir, "b.dmp");

        let queue = DumpQueue::open(&crash_dir, &ledger);
        assert_eq!(names(&queue.scan()), vec!["a.dmp", "b.dmp", "c.dmp"]);
        assert_eq!(names(&queue.pending()), vec!["a.dmp", "b.dmp", "c.dmp"]);
    }

    #[test]
    fn test_scan_skips_empty_and_foreign_files() {
        let (_dir, crash_dir, ledger) = setup();
        fs::write(crash_dir.join("writing.dmp"), b"").unwrap();
        fs::write(crash_dir.join("notes.txt"), b"hello").unwrap();
        fs::create_dir(crash_dir.join("rejected")).unwrap();

        let queue = DumpQueue::open(&crash_dir, &ledger);
        assert!(queue.scan().is_empty());

        // Picked up once the handler finishes writing it.
        fs::write(crash_dir.join("writing.dmp"), b"MDMP").unwrap();
        assert_eq!(names(&queue.scan()), vec!["writing.dmp"]);
    }

    #[test]
    fn test_ledger_survives_restart() {
        let (_dir, crash_dir, ledger) = setup();
        let a = write_dump(&crash_dir, "a.dmp");
        write_dump(&crash_dir, "b.dmp");

        let queue = DumpQueue::open(&crash_dir, &ledger);
        queue.scan();
        queue.mark_uploaded(&a).unwrap();
        assert_eq!(names(&queue.pending()), vec!["b.dmp"]);
        drop(queue);

        // a.dmp is still on disk, but the ledger keeps it out.
        let reopened = DumpQueue::open(&crash_dir, &ledger);
        assert_eq!(names(&reopened.scan()), vec!["b.dmp"]);
        assert_eq!(reopened.handled_count(), 1);
    }

    #[test]
    fn test_missing_crash_dir_scans_empty() {
        let dir = tempdir().unwrap();
        let queue = DumpQueue::open(dir.path().join("nope"), dir.path().join("ledger.json"));

        assert!(queue.scan().is_empty());
        assert!(queue.pending().is_empty());
    }

    #[test]
    fn test_handled_name_stays_handled_after_delete_and_recreate() {
        let (_dir, crash_dir, ledger) = setup();
        let a = write_dump(&crash_dir, "a.dmp");

        let queue = DumpQueue::open(&crash_dir, &ledger);
        queue.scan();
        queue.mark_uploaded(&a).unwrap();

        fs::remove_file(&a).unwrap();
        assert!(queue.scan().is_empty());
        assert_eq!(queue.handled_count(), 1);

        write_dump(&crash_dir, "a.dmp");
        assert!(queue.scan().is_empty());
        assert!(DumpQueue::open(&crash_dir, &ledger).scan().is_empty());
    }

    #[test]
    fn test_pending_preview_leaves_queue_and_ledger_untouched() {
        let (_dir, crash_dir, ledger) = setup();
        let a = write_dump(&crash_dir, "a.dmp");
        write_dump(&crash_dir, "b.dmp");
        fs::write(crash_dir.join("writing.dmp"), b"").unwrap();

        let owner = DumpQueue::open(&crash_dir, &ledger);
        owner.scan();
        owner.mark_uploaded(&a).unwrap();
        fs::remove_file(&a).unwrap();
        let before = fs::read(&ledger).unwrap();

        let observer = DumpQueue::open(&crash_dir, &ledger);
        assert_eq!(observer.pending_preview(), vec!["b.dmp"]);
        assert!(observer.pending().is_empty());
        assert_eq!(fs::read(&ledger).unwrap(), before);
    }

    #[test]
    fn test_mark_uploaded_rejects_pathless_input() {
        let (_dir, crash_dir, ledger) = setup();
        let queue = DumpQueue::open(&crash_dir, &ledger);

        assert!(matches!(
            queue.mark_uploaded(Path::new("/")),
            Err(DumpQueueError::InvalidPath(_))
        ));
    }
}
