//! Stream Controller models.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::issue::model::{BatchedUpdateNotification, PendingIssueEvent};

/// Connection lifecycle state. Exactly one is current per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    /// Backing off before the next connection attempt.
    Waiting,
    Error,
    Stopped,
    Unsupported,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Waiting => "waiting",
            Self::Error => "error",
            Self::Stopped => "stopped",
            Self::Unsupported => "unsupported",
        }
    }

    /// Whether a connection is open, being opened, or about to be retried.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open | Self::Waiting | Self::Error)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tags one connection attempt. Signals carrying an older id are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Signals a push transport delivers for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    /// A named event with its raw `data`.
    Message { event: String, data: String },
    /// The connection failed or dropped.
    Error(String),
}

impl TransportEvent {
    pub fn message(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Message {
            event: event.into(),
            data: data.into(),
        }
    }

    pub fn heartbeat() -> Self {
        Self::message(HEARTBEAT_EVENT, "")
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error(reason.into())
    }
}

/// Name of the server's liveness event.
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// Everything a controller reports, as a value. `Vec<StreamOutput>` is a
/// ready-made listener that records them.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutput {
    Event(PendingIssueEvent),
    Deleted(PendingIssueEvent),
    Batch(BatchedUpdateNotification),
    StateChanged(ConnectionState),
    DisconnectWarning(Duration),
}
