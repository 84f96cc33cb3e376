//! Integration tests for the coordinator.
//!
//! - `harness.rs`    - Temp base dir, mock transport, recording sink and host
//! - `end_to_end.rs` - Cached scope and a dump from a crashed session reach the endpoint once
//! - `channel.rs`    - Workers talking to a running coordinator
//! - `lifecycle.rs`  - Start, crash notification and shutdown rules

mod end_to_end;
