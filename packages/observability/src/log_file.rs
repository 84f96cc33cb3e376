//! The central log file, shared by every process appending to it.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Append-only handle to the central log file.
///
/// Callers hand over a complete line per `write`; it reaches the file in a
/// single `write_all`, so lines from different processes never interleave.
#[derive(Clone)]
pub struct SharedLogFile {
    file: Arc<Mutex<File>>,
}

impl SharedLogFile {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl Write for SharedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for SharedLogFile {
    type Writer = SharedLogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("base").join("logs").join("dev.jsonl");

        let mut log = SharedLogFile::open(&path).unwrap();
        log.write_all(b"{\"message\":\"started\"}\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"message\":\"started\"}\n");
    }

    #[test]
    fn test_handles_append_to_same_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dev.jsonl");

        let mut coordinator = SharedLogFile::open(&path).unwrap();
        let mut worker = SharedLogFile::open(&path).unwrap();
        coordinator.write_all(b"coordinator\n").unwrap();
        worker.write_all(b"worker\n").unwrap();
        coordinator.make_writer().write_all(b"coordinator again\n").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "coordinator\nworker\ncoordinator again\n");
    }
}
