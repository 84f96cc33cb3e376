//! # Persisted Store
//!
//! A typed value mirrored to a single JSON file that survives abrupt
//! process death.
//!
//! Every update is written to a sibling temp file, synced, and renamed over
//! the target, so a reader only ever observes the previous file or the new
//! one in full. Corrupt or missing files are treated as absent.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Persisted store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error while writing or replacing the state file
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The new value could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The target path has no parent directory or file name
    #[error("Invalid state path: {0}")]
    InvalidPath(PathBuf),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// A value of type `T` backed by one JSON file.
pub struct PersistedStore<T> {
    path: PathBuf,
    state: Mutex<T>,
}

impl<T> PersistedStore<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Open the store, reading the current file.
    ///
    /// Falls back to `default` when the file is missing, unreadable or
    /// fails to parse. Never fails.
    pub fn open(path: impl Into<PathBuf>, default: T) -> Self {
        let path = path.into();
        let state = match read_state(&path) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(path = %path.display(), "state file absent, using default");
                default
            }
            Err(reason) => {
                warn!(path = %path.display(), %reason, "state file unusable, using default");
                default
            }
        };

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Open with `T::default()` as the fallback.
    pub fn open_or_default(path: impl Into<PathBuf>) -> Self
    where
        T: Default,
    {
        Self::open(path, T::default())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last successfully written value.
    pub fn get(&self) -> T {
        self.state.lock().clone()
    }

    /// Compute a new value from the current one and persist it.
    ///
    /// The lock is held across the read-modify-write so concurrent updates
    /// never interleave. On error the file on disk and the in-memory value
    /// are both left at the previous state.
    pub fn update<F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&T) -> T,
    {
        let mut guard = self.state.lock();
        let next = f(&guard);
        let content = serde_json::to_string_pretty(&next)?;
        atomic_write(&self.path, content.as_bytes())?;
        *guard = next.clone();
        Ok(next)
    }
}

fn read_state<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| e.to_string())
}

/// Sibling temp path, `.<name>.tmp`. A stale one from an interrupted write
/// is simply truncated by the next update.
fn temp_path_for(path: &Path) -> StoreResult<PathBuf> {
    let dir = path
        .parent()
        .ok_or_else(|| StoreError::InvalidPath(path.to_path_buf()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| StoreError::InvalidPath(path.to_path_buf()))?;
    Ok(dir.join(format!(".{}.tmp", file_name)))
}

fn atomic_write(path: &Path, content: &[u8]) -> StoreResult<()> {
    let tmp_path = temp_path_for(path)?;

    let write_result = (|| -> io::Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;

        fs::rename(&tmp_path, path)?;

        if let Some(dir) = path.parent() {
            if let Ok(parent_dir) = fs::File::open(dir) {
                let _ = parent_dir.sync_all();
            }
        }

        Ok(())
    })();

    if let Err(source) = write_result {
        // Only remove a plain file; a directory squatting on the temp path
        // is not ours to delete.
        if tmp_path.is_file() {
            let _ = fs::remove_file(&tmp_path);
        }
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u64,
        labels: Vec<String>,
    }

    #[test]
    fn test_open_missing_file_uses_default() {
        let dir = tempdir().unwrap();
        let store = PersistedStore::<Counter>::open_or_default(dir.path().join("state.json"));

        assert_eq!(store.get(), Counter::default());
    }

    #[test]
    fn test_update_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = PersistedStore::<Counter>::open_or_default(&path);
        let updated = store
            .update(|c| Counter {
                value: c.value + 5,
                labels: vec!["first".into()],
            })
            .unwrap();
        assert_eq!(updated.value, 5);
        drop(store);

        let reopened = PersistedStore::<Counter>::open_or_default(&path);
        assert_eq!(reopened.get().value, 5);
        assert_eq!(reopened.get().labels, vec!["first".to_string()]);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{\"value\": 3, \"labels\": [").unwrap();

        let fallback = Counter {
            value: 99,
            labels: vec![],
        };
        let store = PersistedStore::open(&path, fallback.clone());
        assert_eq!(store.get(), fallback);
    }

    #[test]
    fn test_interrupted_write_leaves_previous_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = PersistedStore::<Counter>::open_or_default(&path);
        store.update(|_| Counter { value: 1, labels: vec![] }).unwrap();
        drop(store);

        // Simulate death between temp creation and rename: a half-written
        // temp file next to the intact target.
        fs::write(dir.path().join(".state.json.tmp"), "{\"value\": 2, \"lab").unwrap();

        let reopened = PersistedStore::<Counter>::open_or_default(&path);
        assert_eq!(reopened.get().value, 1);

        // The next update overwrites the stale temp file.
        reopened.update(|c| Counter { value: c.value + 1, labels: vec![] }).unwrap();
        assert!(!dir.path().join(".state.json.tmp").exists());

        let again = PersistedStore::<Counter>::open_or_default(&path);
        assert_eq!(again.get().value, 2);
    }

    #[test]
    fn test_failed_write_keeps_disk_and_memory_intact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = PersistedStore::<Counter>::open_or_default(&path);
        store.update(|_| Counter { value: 7, labels: vec![] }).unwrap();

        // A directory on the temp path makes the temp file impossible to open.
        fs::create_dir(dir.path().join(".state.json.tmp")).unwrap();

        let result = store.update(|_| Counter { value: 8, labels: vec![] });
        assert!(matches!(result, Err(StoreError::Io { .. })));

        assert_eq!(store.get().value, 7);
        let on_disk: Counter = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.value, 7);
    }

    #[test]
    fn test_concurrent_updates_do_not_lose_writes() {
        let dir = tempdir().unwrap();
        let store = Arc::new(PersistedStore::<Counter>::open_or_default(
            dir.path().join("state.json"),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        store
                            .update(|c| Counter {
                                value: c.value + 1,
                                labels: c.labels.clone(),
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get().value, 80);
        let reopened = PersistedStore::<Counter>::open_or_default(store.path());
        assert_eq!(reopened.get().value, 80);
    }

    #[test]
    fn test_update_creates_missing_parent_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = PersistedStore::<Counter>::open_or_default(&path);
        store.update(|_| Counter { value: 3, labels: vec![] }).unwrap();

        assert!(path.exists());
    }
}
