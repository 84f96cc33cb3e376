//! # Coordinator Channel
//!
//! NDJSON over a Unix domain socket, one connection per worker process.
//!
//! ```text
//! worker                          coordinator
//!   | -- crashline.handshake -->      |
//!   | <-- crashline.handshake --      |   (echo = acknowledgement)
//!   | -- crashline.breadcrumb -->     |
//!   | -- crashline.event -->          |   one-way, at-most-once
//!   | -- crashline.scope_sync -->     |
//! ```
//!
//! Workers never block on the channel: if the coordinator is unreachable
//! messages are dropped, and if the handshake is not acknowledged in time
//! the worker keeps sending best-effort.

mod error;
mod server;
mod worker;

pub use error::{IpcError, IpcResult};
pub use server::{ChannelServer, InboundMessage, MessageHandler};
pub use worker::{ChannelState, WorkerChannel};
