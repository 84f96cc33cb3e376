//! Channel message handling.

use crate::host::{CapturedEvent, EventSink};
use crate::live_scope::LiveScope;
use crash_ipc::InboundMessage;
use crash_protocol_types::{IpcMessage, WorkerHello};
use scope_cache::ScopeMutation;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Runs one message to completion before taking the next.
pub(crate) async fn run_message_loop(
    live: Arc<LiveScope>,
    sink: Arc<dyn EventSink>,
    mut inbound_rx: mpsc::UnboundedReceiver<InboundMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            inbound = inbound_rx.recv() => match inbound {
                Some(inbound) => handle_inbound(&live, sink.as_ref(), inbound),
                None => break,
            },
            _ = shutdown_rx.changed() => break,
        }
    }
    debug!("Message loop stopped");
}

pub(crate) fn handle_inbound(live: &LiveScope, sink: &dyn EventSink, inbound: InboundMessage) {
    let InboundMessage { sender, message } = inbound;
    match message {
        IpcMessage::Handshake(hello) => {
            debug!(worker_id = %hello.worker_id, "Worker registered");
        }
        IpcMessage::Breadcrumb(crumb) => live.apply(ScopeMutation::Breadcrumb(crumb)),
        IpcMessage::Event {
            event,
            sender_extra,
        } => forward_event(live, sink, event, sender.as_ref(), sender_extra),
        IpcMessage::ScopeSync(scope) => live.apply(ScopeMutation::Merge(scope)),
    }
}

/// Fold sender extras into the event and hand it to the sink.
pub(crate) fn forward_event(
    live: &LiveScope,
    sink: &dyn EventSink,
    event: Value,
    sender: Option<&WorkerHello>,
    sender_extra: BTreeMap<String, Value>,
) {
    let mut event = match event {
        Value::Object(map) => map,
        other => {
            warn!("Event payload is not an object, wrapping it");
            let mut map = Map::new();
            map.insert("message".into(), other);
            map
        }
    };

    let extra = event
        .entry("extra")
        .or_insert_with(|| Value::Object(Map::new()));
    if !extra.is_object() {
        *extra = Value::Object(Map::new());
    }
    if let Value::Object(extra) = extra {
        if let Some(hello) = sender {
            extra.insert("worker_id".into(), Value::from(hello.worker_id.clone()));
            extra.insert("process_type".into(), Value::from(hello.process_type.clone()));
            extra.insert("pid".into(), Value::from(hello.pid));
        }
        extra.extend(sender_extra);
    }

    sink.capture(CapturedEvent {
        event: Value::Object(event),
        scope: live.snapshot(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crash_protocol_types::{Breadcrumb, Scope};
    use parking_lot::Mutex;
    use scope_cache::ScopeCache;
    use serde_json::json;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Recording(Mutex<Vec<CapturedEvent>>);

    impl EventSink for Recording {
        fn capture(&self, event: CapturedEvent) {
            self.0.lock().push(event);
        }
    }

    fn live_scope() -> (tempfile::TempDir, Arc<LiveScope>) {
        let dir = tempdir().unwrap();
        let cache = Arc::new(ScopeCache::open(dir.path().join("scope.json"), 3));
        let (live, _worker) = LiveScope::spawn(cache);
        (dir, live)
    }

    fn hello() -> WorkerHello {
        WorkerHello {
            worker_id: "w-7".into(),
            process_type: "renderer".into(),
            pid: 77,
        }
    }

    #[tokio::test]
    async fn test_event_gets_sender_extras() {
        let (_dir, live) = live_scope();
        let sink = Recording::default();

        handle_inbound(
            &live,
            &sink,
            InboundMessage {
                sender: Some(hello()),
                message: IpcMessage::Event {
                    event: json!({"message": "boom", "extra": {"kept": true}}),
                    sender_extra: BTreeMap::from([("url".to_string(), json!("app://main"))]),
                },
            },
        );

        let events = sink.0.lock();
        assert_eq!(events.len(), 1);
        let extra = &events[0].event["extra"];
        assert_eq!(extra["kept"], true);
        assert_eq!(extra["worker_id"], "w-7");
        assert_eq!(extra["process_type"], "renderer");
        assert_eq!(extra["pid"], 77);
        assert_eq!(extra["url"], "app://main");
    }

    #[tokio::test]
    async fn test_non_object_event_is_wrapped() {
        let (_dir, live) = live_scope();
        let sink = Recording::default();

        forward_event(&live, &sink, json!("plain text"), None, BTreeMap::new());

        let events = sink.0.lock();
        assert_eq!(events[0].event["message"], "plain text");
        assert!(events[0].event["extra"].is_object());
    }

    #[tokio::test]
    async fn test_breadcrumbs_and_scope_sync_update_live_scope() {
        let (_dir, live) = live_scope();
        let sink = Recording::default();

        for i in 0..5 {
            handle_inbound(
                &live,
                &sink,
                InboundMessage {
                    sender: Some(hello()),
                    message: IpcMessage::Breadcrumb(Breadcrumb::new(format!("b{}", i))),
                },
            );
        }
        let mut sync = Scope::default();
        sync.set_tag("page", "settings");
        handle_inbound(
            &live,
            &sink,
            InboundMessage {
                sender: None,
                message: IpcMessage::ScopeSync(sync),
            },
        );

        let scope = live.snapshot();
        assert_eq!(scope.breadcrumbs.len(), 3);
        assert_eq!(scope.breadcrumbs[0].message.as_deref(), Some("b2"));
        assert_eq!(scope.tags["page"], "settings");
        assert!(sink.0.lock().is_empty());
    }
}
