//! Pure data types shared by the coordinator and its workers.
//!
//! - [`Scope`] and its parts: the context attached to every crash and event
//! - [`IpcMessage`]: the frames exchanged over the coordinator channel

mod message;
mod scope;

pub use message::{
    IpcMessage, WorkerHello, CHANNEL_BREADCRUMB, CHANNEL_EVENT, CHANNEL_HANDSHAKE,
    CHANNEL_SCOPE_SYNC,
};
pub use scope::{Breadcrumb, Level, Scope, User};
