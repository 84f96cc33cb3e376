//! Coordinator startup, local API and shutdown.

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::handler::{forward_event, run_message_loop};
use crate::host::{CrashHandlerHost, CrashNotification, CrashNotifier, EventSink};
use crate::live_scope::LiveScope;
use crate::watcher::{run_dump_watcher, Delivery};
use crash_config_and_utils::{Config, Paths, PLACEHOLDER_SUBMIT_URL};
use crash_ipc::{ChannelServer, InboundMessage, MessageHandler};
use crash_protocol_types::{Breadcrumb, Scope};
use dump_queue::DumpQueue;
use dump_uploader::{DumpTransport, FlushSummary, HttpTransport, Uploader, UploaderConfig};
use parking_lot::Mutex;
use scope_cache::{ScopeCache, ScopeMutation};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The coordinating process's side of the pipeline.
///
/// Owns the live scope, the crash directory and the only network path.
/// Workers reach it through the channel socket; the host process uses the
/// methods below directly.
pub struct Coordinator {
    crash_dir: PathBuf,
    live: Arc<LiveScope>,
    sink: Arc<dyn EventSink>,
    delivery: Delivery,
    server: Arc<ChannelServer>,
    notifier: CrashNotifier,
    shutdown_tx: watch::Sender<bool>,
    running: AtomicBool,
    channel_tasks: Mutex<Vec<JoinHandle<()>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    persist_worker: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Start with the HTTP transport derived from the configured ingestion
    /// key. Without a key, dumps are collected but not uploaded.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: Config,
        paths: Paths,
        sink: Arc<dyn EventSink>,
        host: Arc<dyn CrashHandlerHost>,
    ) -> CoordinatorResult<Self> {
        let transport: Option<Arc<dyn DumpTransport>> = match config.ingestion_key()? {
            Some(key) => {
                info!(ingestion = %key, "Uploading crash dumps");
                let endpoint = key.minidump_endpoint()?;
                let transport: Arc<dyn DumpTransport> =
                    Arc::new(HttpTransport::new(endpoint, config.http_timeout())?);
                Some(transport)
            }
            None => {
                warn!("No ingestion key configured, crash dumps will not be uploaded");
                None
            }
        };
        Self::start_with_transport(config, paths, sink, host, transport)
    }

    /// Start with a caller-supplied transport.
    pub fn start_with_transport(
        config: Config,
        paths: Paths,
        sink: Arc<dyn EventSink>,
        host: Arc<dyn CrashHandlerHost>,
        transport: Option<Arc<dyn DumpTransport>>,
    ) -> CoordinatorResult<Self> {
        paths.ensure_dirs()?;
        let crash_dir = config.crash_dir(&paths);
        std::fs::create_dir_all(&crash_dir)?;

        let cache = Arc::new(ScopeCache::open(paths.scope_cache_file(), config.max_breadcrumbs));
        let (live, persist_worker) = LiveScope::spawn(cache);

        let queue = Arc::new(DumpQueue::open(&crash_dir, paths.dump_ledger_file()));
        let uploader = transport.map(|transport| {
            Arc::new(Uploader::new(
                queue.clone(),
                transport,
                live.clone(),
                UploaderConfig {
                    default_retry_after: config.default_retry_after(),
                    rejected_dir: config.rejected_dir(&paths),
                },
            ))
        });
        let delivery = Delivery { queue, uploader };

        let (notifier, crash_rx) = CrashNotifier::channel(1);
        host.install(&crash_dir, PLACEHOLDER_SUBMIT_URL, notifier.clone())
            .map_err(CoordinatorError::CrashHandler)?;

        let server = Arc::new(ChannelServer::bind(paths.socket_file())?);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundMessage>();
        let handler: MessageHandler = Arc::new(move |inbound| {
            let _ = inbound_tx.send(inbound);
        });

        let (shutdown_tx, _) = watch::channel(false);

        let server_task = {
            let server = server.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run(handler).await {
                    error!(error = %e, "Channel server failed");
                }
            })
        };
        let message_task = tokio::spawn(run_message_loop(
            live.clone(),
            sink.clone(),
            inbound_rx,
            shutdown_tx.subscribe(),
        ));
        let watcher = tokio::spawn(run_dump_watcher(
            delivery.clone(),
            config.poll_interval(),
            crash_rx,
            shutdown_tx.subscribe(),
        ));

        info!(
            crash_dir = %crash_dir.display(),
            socket = %server.socket_path().display(),
            uploads = delivery.uploader.is_some(),
            "Coordinator started"
        );

        Ok(Self {
            crash_dir,
            live,
            sink,
            delivery,
            server,
            notifier,
            shutdown_tx,
            running: AtomicBool::new(true),
            channel_tasks: Mutex::new(vec![server_task, message_task]),
            watcher: Mutex::new(Some(watcher)),
            persist_worker: Mutex::new(Some(persist_worker)),
        })
    }

    pub fn crash_dir(&self) -> &Path {
        &self.crash_dir
    }

    /// Socket workers connect to.
    pub fn socket_path(&self) -> &Path {
        self.server.socket_path()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn current_scope(&self) -> Scope {
        self.live.snapshot()
    }

    /// Handle for the host's crash hook.
    pub fn crash_notifier(&self) -> CrashNotifier {
        self.notifier.clone()
    }

    pub fn add_breadcrumb(&self, crumb: Breadcrumb) -> CoordinatorResult<()> {
        self.ensure_running()?;
        self.live.apply(ScopeMutation::Breadcrumb(crumb));
        Ok(())
    }

    pub fn merge_scope(&self, scope: Scope) -> CoordinatorResult<()> {
        self.ensure_running()?;
        self.live.apply(ScopeMutation::Merge(scope));
        Ok(())
    }

    /// Forward an event raised in this process, with `extra` folded in.
    pub fn capture_event(&self, event: Value, extra: BTreeMap<String, Value>) -> CoordinatorResult<()> {
        self.ensure_running()?;
        forward_event(&self.live, self.sink.as_ref(), event, None, extra);
        Ok(())
    }

    /// Report a native crash; schedules a flush.
    pub fn notify_crash(&self, notification: CrashNotification) -> CoordinatorResult<()> {
        self.ensure_running()?;
        if self.notifier.notify(notification) {
            Ok(())
        } else {
            Err(CoordinatorError::NotRunning)
        }
    }

    /// Scan and upload now, waiting for any flush already in progress.
    pub async fn flush_now(&self) -> CoordinatorResult<FlushSummary> {
        self.ensure_running()?;
        Ok(self.delivery.flush(BTreeMap::new()).await)
    }

    /// Stop the channel and the watcher, then wait for queued scope writes.
    ///
    /// An upload cut short here is retried from scratch on the next start.
    pub async fn shutdown(&self) -> CoordinatorResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(CoordinatorError::NotRunning);
        }
        info!("Coordinator shutting down");

        self.shutdown_tx.send_replace(true);
        self.server.shutdown();

        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }

        let channel_tasks = std::mem::take(&mut *self.channel_tasks.lock());
        for task in channel_tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Channel task ended abnormally");
            }
        }

        self.live.close_persistence();
        let persist_worker = self.persist_worker.lock().take();
        if let Some(worker) = persist_worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Scope persist worker ended abnormally");
            }
        }

        info!("Coordinator stopped");
        Ok(())
    }

    fn ensure_running(&self) -> CoordinatorResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(CoordinatorError::NotRunning)
        }
    }
}
