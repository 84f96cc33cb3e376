//! Crash Coordinator: the one process that owns crash delivery.
//!
//! Worker processes forward breadcrumbs, events and scope updates over the
//! channel socket. The coordinator keeps the live scope (mirrored to disk),
//! watches the crash directory and uploads each dump with the scope attached.
//!
//! # Core Invariants
//!
//! 1. **Single Writer**: only the coordinator touches the crash directory,
//!    the ledger and the scope cache
//! 2. **One In-Flight**: at most one upload request at a time
//! 3. **Once Per Dump**: a dump is never uploaded again after the ledger
//!    records it
//! 4. **Crash-Safe Context**: the scope on disk is never a torn write
//!
//! # Architecture
//!
//! ```text
//! Worker --NDJSON--> ChannelServer -> message loop -> LiveScope -> ScopeCache
//!                                          |
//!                                          v
//!                                      EventSink
//!
//! native handler -> crash dir -> DumpQueue -> Uploader -> ingestion endpoint
//! ```

pub mod coordinator;
pub mod error;
mod handler;
pub mod host;
pub mod live_scope;
mod watcher;

#[cfg(test)]
mod tests;

pub use coordinator::Coordinator;
pub use error::{CoordinatorError, CoordinatorResult};
pub use host::{
    CapturedEvent, CrashHandlerHost, CrashNotification, CrashNotifier, EventSink, ExternalCrashHandler,
    LogEventSink,
};
pub use live_scope::LiveScope;
