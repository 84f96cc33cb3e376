//! Worker side of the channel.

use crash_protocol_types::{Breadcrumb, IpcMessage, Scope, WorkerHello};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Connection state as seen by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Handshaking,
    Connected,
    /// Handshake not acknowledged in time; sends continue best-effort.
    Degraded,
}

/// Fire-and-forget sender owned by a worker process.
///
/// All sends are queued and written by a background task in call order.
/// None of them block or fail.
pub struct WorkerChannel {
    hello: WorkerHello,
    tx: mpsc::UnboundedSender<IpcMessage>,
    state_rx: watch::Receiver<ChannelState>,
    task: JoinHandle<()>,
}

impl WorkerChannel {
    /// Connect to the coordinator in the background and handshake.
    pub fn spawn(socket_path: impl Into<PathBuf>, hello: WorkerHello, handshake_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);
        let task = tokio::spawn(run_channel(
            socket_path.into(),
            hello.clone(),
            handshake_timeout,
            rx,
            state_tx,
        ));

        Self {
            hello,
            tx,
            state_rx,
            task,
        }
    }

    pub fn hello(&self) -> &WorkerHello {
        &self.hello
    }

    pub fn state(&self) -> ChannelState {
        *self.state_rx.borrow()
    }

    /// Wait until the handshake resolves.
    ///
    /// Returns `Connected` or `Degraded`, or `Disconnected` when the
    /// coordinator could not be reached at all.
    pub async fn settled(&self) -> ChannelState {
        let mut state_rx = self.state_rx.clone();
        if let Ok(state) = state_rx
            .wait_for(|s| matches!(s, ChannelState::Connected | ChannelState::Degraded))
            .await
        {
            return *state;
        }
        let state = *state_rx.borrow();
        state
    }

    pub fn send_breadcrumb(&self, crumb: Breadcrumb) {
        self.send(IpcMessage::Breadcrumb(crumb));
    }

    pub fn send_event(&self, event: Value, sender_extra: BTreeMap<String, Value>) {
        self.send(IpcMessage::Event {
            event,
            sender_extra,
        });
    }

    pub fn send_scope_sync(&self, scope: Scope) {
        self.send(IpcMessage::ScopeSync(scope));
    }

    fn send(&self, message: IpcMessage) {
        if self.tx.send(message).is_err() {
            trace!(worker_id = %self.hello.worker_id, "Channel closed, message dropped");
        }
    }

    /// Flush queued messages and close the connection.
    pub async fn close(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}

enum HandshakeResult {
    Acknowledged,
    Closed,
}

async fn run_channel(
    socket_path: PathBuf,
    hello: WorkerHello,
    handshake_timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<IpcMessage>,
    state_tx: watch::Sender<ChannelState>,
) {
    let stream = match UnixStream::connect(&socket_path).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(
                path = %socket_path.display(),
                error = %e,
                "Coordinator unreachable, channel messages will be dropped"
            );
            return;
        }
    };

    state_tx.send_replace(ChannelState::Handshaking);
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let handshake = IpcMessage::Handshake(hello.clone());
    if let Err(e) = write_message(&mut writer, &handshake).await {
        warn!(error = %e, "Failed to send handshake");
        state_tx.send_replace(ChannelState::Disconnected);
        return;
    }

    let wait_for_ack = async {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match IpcMessage::from_json(line.trim()) {
                    Ok(IpcMessage::Handshake(echo)) if echo == hello => {
                        return HandshakeResult::Acknowledged
                    }
                    _ => debug!("Ignoring unexpected frame while handshaking"),
                },
                Ok(None) | Err(_) => return HandshakeResult::Closed,
            }
        }
    };

    match timeout(handshake_timeout, wait_for_ack).await {
        Ok(HandshakeResult::Acknowledged) => {
            info!(worker_id = %hello.worker_id, "Coordinator channel connected");
            state_tx.send_replace(ChannelState::Connected);
        }
        Ok(HandshakeResult::Closed) => {
            warn!(worker_id = %hello.worker_id, "Coordinator closed the channel during handshake");
            state_tx.send_replace(ChannelState::Disconnected);
            return;
        }
        Err(_) => {
            warn!(
                worker_id = %hello.worker_id,
                timeout_ms = handshake_timeout.as_millis() as u64,
                "Handshake not acknowledged, continuing best-effort"
            );
            state_tx.send_replace(ChannelState::Degraded);
        }
    }

    while let Some(message) = rx.recv().await {
        if let Err(e) = write_message(&mut writer, &message).await {
            warn!(error = %e, channel = message.channel(), "Coordinator channel write failed");
            state_tx.send_replace(ChannelState::Disconnected);
            return;
        }
    }

    let _ = writer.shutdown().await;
}

async fn write_message(writer: &mut OwnedWriteHalf, message: &IpcMessage) -> std::io::Result<()> {
    let mut line = message.to_json()?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}
