//! Channel frames exchanged between workers and the coordinator.
//!
//! Each frame is one JSON object per line:
//! `{"channel": "crashline.breadcrumb", "payload": {...}}`.

use crate::{Breadcrumb, Scope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const CHANNEL_HANDSHAKE: &str = "crashline.handshake";
pub const CHANNEL_BREADCRUMB: &str = "crashline.breadcrumb";
pub const CHANNEL_EVENT: &str = "crashline.event";
pub const CHANNEL_SCOPE_SYNC: &str = "crashline.scope_sync";

/// Worker identity sent on connect and echoed back as acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHello {
    pub worker_id: String,
    /// e.g. "renderer", "gpu", "utility".
    pub process_type: String,
    pub pid: u32,
}

impl WorkerHello {
    /// Hello for the current process with a fresh worker id.
    pub fn new(process_type: impl Into<String>) -> Self {
        Self {
            worker_id: uuid::Uuid::new_v4().to_string(),
            process_type: process_type.into(),
            pid: std::process::id(),
        }
    }
}

/// One message on the coordinator channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload")]
pub enum IpcMessage {
    #[serde(rename = "crashline.handshake")]
    Handshake(WorkerHello),

    #[serde(rename = "crashline.breadcrumb")]
    Breadcrumb(Breadcrumb),

    /// A fully built event plus sender-side extras to fold into it.
    #[serde(rename = "crashline.event")]
    Event {
        event: Value,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        sender_extra: BTreeMap<String, Value>,
    },

    /// Worker-side scope changes to merge into the coordinator scope.
    #[serde(rename = "crashline.scope_sync")]
    ScopeSync(Scope),
}

impl IpcMessage {
    /// Channel name this message travels on.
    pub fn channel(&self) -> &'static str {
        match self {
            IpcMessage::Handshake(_) => CHANNEL_HANDSHAKE,
            IpcMessage::Breadcrumb(_) => CHANNEL_BREADCRUMB,
            IpcMessage::Event { .. } => CHANNEL_EVENT,
            IpcMessage::ScopeSync(_) => CHANNEL_SCOPE_SYNC,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
