//! Broadcast Relay models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::issue::model::{BatchedUpdateNotification, PendingIssueEvent};
use crate::stream::model::ConnectionState;

/// What the leader mirrors to the other tabs.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayPayload {
    /// A flushed batch.
    Update { batch: BatchedUpdateNotification },
    /// A connection state transition.
    State { state: ConnectionState },
    /// A deletion, ahead of the batch that will also contain it.
    Deleted { event: PendingIssueEvent },
    /// The leader's stream has been down for `disconnected_for_ms`.
    Warning {
        #[serde(rename = "disconnectedForMs")]
        disconnected_for_ms: u64,
    },
    /// A new follower asking the leader for its current connection state.
    Sync,
}

impl RelayPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Update { .. } => "update",
            Self::State { .. } => "state",
            Self::Deleted { .. } => "deleted",
            Self::Warning { .. } => "warning",
            Self::Sync => "sync",
        }
    }
}

/// Envelope published on the cross-tab channel.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    #[serde(flatten)]
    pub payload: RelayPayload,
    pub sender_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}
