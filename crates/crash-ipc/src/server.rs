//! Coordinator side of the channel.

use crate::{IpcError, IpcResult};
use crash_protocol_types::{IpcMessage, WorkerHello};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// A decoded frame and the worker that sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// `None` until the connection has sent its handshake.
    pub sender: Option<WorkerHello>,
    pub message: IpcMessage,
}

/// Receives every decoded frame, in per-connection arrival order.
pub type MessageHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Channel server listening on a Unix domain socket.
pub struct ChannelServer {
    socket_path: PathBuf,
    listener: Mutex<Option<UnixListener>>,
    shutdown_tx: watch::Sender<bool>,
}

impl ChannelServer {
    /// Bind the socket, replacing a stale one left by a previous run.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(socket_path: impl Into<PathBuf>) -> IpcResult<Self> {
        let socket_path = socket_path.into();
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&socket_path)?;
        let (shutdown_tx, _) = watch::channel(false);
        info!(path = %socket_path.display(), "Channel server listening");

        Ok(Self {
            socket_path,
            listener: Mutex::new(Some(listener)),
            shutdown_tx,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop accepting, close open connections and remove the socket.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Accept workers until [`shutdown`](Self::shutdown).
    pub async fn run(&self, handler: MessageHandler) -> IpcResult<()> {
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or(IpcError::AlreadyRunning)?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        if !*shutdown_rx.borrow_and_update() {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, _)) => {
                                let handler = handler.clone();
                                let shutdown_rx = self.shutdown_tx.subscribe();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, handler, shutdown_rx).await {
                                        warn!(error = %e, "Worker connection error");
                                    }
                                });
                            }
                            Err(e) => {
                                error!(error = %e, "Accept error");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("Channel server shutting down");
                        break;
                    }
                }
            }
        }

        drop(listener);
        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

async fn handle_connection(
    stream: UnixStream,
    handler: MessageHandler,
    mut shutdown_rx: watch::Receiver<bool>,
) -> IpcResult<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut sender: Option<WorkerHello> = None;

    debug!("Worker connected");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown_rx.changed() => break,
        };
        let Some(line) = line else {
            debug!(worker_id = ?sender.as_ref().map(|s| &s.worker_id), "Worker disconnected");
            break;
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let message = match IpcMessage::from_json(trimmed) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Skipping malformed channel frame");
                continue;
            }
        };

        if let IpcMessage::Handshake(hello) = &message {
            // The acknowledgement is the handshake itself, byte for byte.
            writer.write_all(trimmed.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;

            info!(
                worker_id = %hello.worker_id,
                process_type = %hello.process_type,
                pid = hello.pid,
                "Worker handshake"
            );
            sender = Some(hello.clone());
        }

        handler(InboundMessage {
            sender: sender.clone(),
            message,
        });
    }

    Ok(())
}
