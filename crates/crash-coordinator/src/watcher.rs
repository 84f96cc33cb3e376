//! Dump watcher: flushes the crash directory on start, on every poll tick
//! and whenever the host reports a crash.

use crate::host::CrashNotification;
use dump_queue::DumpQueue;
use dump_uploader::{FlushSummary, Uploader};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Where discovered dumps go.
///
/// Without an ingestion key there is no uploader; dumps are still scanned so
/// they are kept on disk and counted.
#[derive(Clone)]
pub(crate) struct Delivery {
    pub(crate) queue: Arc<DumpQueue>,
    pub(crate) uploader: Option<Arc<Uploader>>,
}

impl Delivery {
    pub(crate) async fn flush(&self, extra: BTreeMap<String, Value>) -> FlushSummary {
        match &self.uploader {
            Some(uploader) => uploader.flush_queue(extra).await,
            None => {
                let queue = self.queue.clone();
                let discovered = match tokio::task::spawn_blocking(move || queue.scan().len()).await {
                    Ok(discovered) => discovered,
                    Err(e) => {
                        error!(error = %e, "Crash directory scan panicked");
                        0
                    }
                };
                let remaining = self.queue.pending().len();
                if discovered > 0 {
                    info!(discovered, remaining, "No ingestion key, dumps kept on disk");
                }
                FlushSummary {
                    discovered,
                    remaining,
                    ..Default::default()
                }
            }
        }
    }
}

/// Extras describing the crash, attached to the uploaded sidecar.
pub(crate) fn crash_extra(notification: &CrashNotification) -> BTreeMap<String, Value> {
    let mut extra = BTreeMap::new();
    if let Some(process_type) = &notification.process_type {
        extra.insert("crashed_process".to_string(), Value::from(process_type.as_str()));
    }
    if let Some(url) = &notification.url {
        extra.insert("last_url".to_string(), Value::from(url.as_str()));
    }
    extra
}

pub(crate) async fn run_dump_watcher(
    delivery: Delivery,
    poll_interval: Duration,
    mut crash_rx: mpsc::Receiver<CrashNotification>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // The first tick completes immediately, which is the startup flush.
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            notification = crash_rx.recv() => match notification {
                Some(notification) => {
                    info!(
                        process_type = ?notification.process_type,
                        "Crash reported, flushing dumps"
                    );
                    delivery.flush(crash_extra(&notification)).await;
                }
                None => break,
            },
            _ = ticker.tick() => {
                delivery.flush(BTreeMap::new()).await;
            }
        }
    }
    debug!("Dump watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_extra_only_carries_known_fields() {
        let extra = crash_extra(&CrashNotification {
            process_type: Some("gpu".into()),
            url: None,
        });

        assert_eq!(extra.len(), 1);
        assert_eq!(extra["crashed_process"], "gpu");
    }

    #[tokio::test]
    async fn test_flush_without_uploader_keeps_dumps() {
        let dir = tempfile::tempdir().unwrap();
        let crash_dir = dir.path().join("crashes");
        std::fs::create_dir_all(&crash_dir).unwrap();
        std::fs::write(crash_dir.join("a.dmp"), b"MDMP").unwrap();

        let delivery = Delivery {
            queue: Arc::new(DumpQueue::open(&crash_dir, dir.path().join("ledger.json"))),
            uploader: None,
        };

        let summary = delivery.flush(BTreeMap::new()).await;
        assert_eq!(summary.discovered, 1);
        assert_eq!(summary.remaining, 1);
        assert_eq!(summary.delivered, 0);
        assert!(crash_dir.join("a.dmp").exists());
    }
}
