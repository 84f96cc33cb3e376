//! Seams to the host application.
//!
//! The coordinator never builds events and never configures the native crash
//! handler's internals. Both are collaborators behind these traits.

use crash_protocol_types::Scope;
use serde_json::Value;
use std::path::Path;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

/// An event ready for the event-construction library.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    /// Payload with sender extras folded into its `extra` object.
    pub event: Value,
    /// Live scope at the time of capture.
    pub scope: Scope,
}

/// Receives completed events. Must not block.
pub trait EventSink: Send + Sync {
    fn capture(&self, event: CapturedEvent);
}

/// Sink for running without an event-construction library: logs and drops.
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn capture(&self, event: CapturedEvent) {
        info!(
            message = event.event.get("message").and_then(|m| m.as_str()).unwrap_or(""),
            tags = event.scope.tags.len(),
            breadcrumbs = event.scope.breadcrumbs.len(),
            "Event captured"
        );
    }
}

/// A native crash observed by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrashNotification {
    /// e.g. "renderer", "gpu".
    pub process_type: Option<String>,
    /// Last URL the crashed process had loaded.
    pub url: Option<String>,
}

/// Handle the host uses to report crashes.
///
/// Notifications are coalesced: a full queue means a flush is already due,
/// so the extra one is dropped.
#[derive(Clone)]
pub struct CrashNotifier {
    tx: mpsc::Sender<CrashNotification>,
}

impl CrashNotifier {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<CrashNotification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Returns `false` once the coordinator has stopped.
    pub fn notify(&self, notification: CrashNotification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Crash flush already pending, notification coalesced");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Installs the native crash handler.
pub trait CrashHandlerHost: Send + Sync {
    /// Point the native handler at `crash_dir` with a submission URL that
    /// goes nowhere, and keep `notifier` to report crashes.
    fn install(&self, crash_dir: &Path, submit_url: &str, notifier: CrashNotifier) -> Result<(), String>;
}

/// For hosts whose native handler is configured outside this process.
pub struct ExternalCrashHandler;

impl CrashHandlerHost for ExternalCrashHandler {
    fn install(&self, crash_dir: &Path, submit_url: &str, _notifier: CrashNotifier) -> Result<(), String> {
        info!(
            crash_dir = %crash_dir.display(),
            submit_url,
            "Native crash handler managed by the host, watching crash directory"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notifier_coalesces_when_full() {
        let (notifier, mut rx) = CrashNotifier::channel(1);

        assert!(notifier.notify(CrashNotification::default()));
        assert!(notifier.notify(CrashNotification {
            process_type: Some("gpu".into()),
            url: None,
        }));

        assert_eq!(rx.recv().await, Some(CrashNotification::default()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notifier_reports_closed() {
        let (notifier, rx) = CrashNotifier::channel(1);
        drop(rx);

        assert!(!notifier.notify(CrashNotification::default()));
    }
}
