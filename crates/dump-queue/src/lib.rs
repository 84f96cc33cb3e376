//! # Dump Queue
//!
//! Discovers minidumps written by the native crash handler and remembers,
//! across restarts, which ones have already been handled.
//!
//! A dump is identified by its file name inside the crash directory. Once
//! marked uploaded it is never emitted again, even if the file lingers.

mod error;
mod ledger;
mod queue;

pub use error::{DumpQueueError, DumpQueueResult};
pub use ledger::DumpLedger;
pub use queue::{CrashDumpRecord, DumpQueue, DUMP_EXTENSION};
