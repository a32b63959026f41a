//! Broadcast Relay: mirror the leader's notifications to the other tabs.
//!
//! The channel may deliver a message back to its own sender, so every
//! envelope carries the sender's tab id and [`BroadcastRelay::receive`]
//! drops our own.

pub mod model;

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ChannelError, TabSyncError, TabSyncResult};
use crate::issue::model::{BatchedUpdateNotification, PendingIssueEvent};
use crate::stream::model::ConnectionState;
use model::{BroadcastMessage, RelayPayload};

/// A same-browser publish/subscribe channel.
pub trait ChannelBackend: Send {
    fn post(&self, message: &BroadcastMessage) -> Result<(), ChannelError>;
}

pub struct BroadcastRelay {
    sender_id: String,
    channel: Option<Box<dyn ChannelBackend>>,
    publish_failure_logged: bool,
}

impl BroadcastRelay {
    pub fn new(sender_id: impl Into<String>, channel: Box<dyn ChannelBackend>) -> TabSyncResult<Self> {
        Self::build(sender_id.into(), Some(channel))
    }

    /// A relay for hosts without a cross-tab channel. Publishes nothing,
    /// receives nothing.
    pub fn disabled(sender_id: impl Into<String>) -> TabSyncResult<Self> {
        Self::build(sender_id.into(), None)
    }

    fn build(sender_id: String, channel: Option<Box<dyn ChannelBackend>>) -> TabSyncResult<Self> {
        if sender_id.trim().is_empty() {
            return Err(TabSyncError::missing_identity("relay sender id must not be empty"));
        }
        Ok(Self {
            sender_id,
            channel,
            publish_failure_logged: false,
        })
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Whether followers can see the leader's updates at all.
    pub fn is_mirroring_enabled(&self) -> bool {
        self.channel.is_some()
    }

    pub fn broadcast_update(&mut self, batch: &BatchedUpdateNotification, now: DateTime<Utc>) {
        self.broadcast(RelayPayload::Update { batch: batch.clone() }, now);
    }

    pub fn broadcast_state(&mut self, state: ConnectionState, now: DateTime<Utc>) {
        self.broadcast(RelayPayload::State { state }, now);
    }

    pub fn broadcast_deleted(&mut self, event: &PendingIssueEvent, now: DateTime<Utc>) {
        self.broadcast(RelayPayload::Deleted { event: event.clone() }, now);
    }

    /// Relay that the stream has stayed down for `disconnected_for`.
    pub fn broadcast_warning(&mut self, disconnected_for: Duration, now: DateTime<Utc>) {
        let disconnected_for_ms = u64::try_from(disconnected_for.as_millis()).unwrap_or(u64::MAX);
        self.broadcast(RelayPayload::Warning { disconnected_for_ms }, now);
    }

    /// Ask whichever tab leads to repeat its connection state.
    pub fn request_state(&mut self, now: DateTime<Utc>) {
        self.broadcast(RelayPayload::Sync, now);
    }

    /// Stamp and publish. Failures are logged, never returned.
    pub fn broadcast(&mut self, payload: RelayPayload, now: DateTime<Utc>) {
        let Some(channel) = &self.channel else {
            return;
        };
        let message = BroadcastMessage {
            payload,
            sender_id: self.sender_id.clone(),
            timestamp: now,
        };

        if let Err(e) = channel.post(&message) {
            if self.publish_failure_logged {
                debug!(error = %e, kind = message.payload.kind(), "Broadcast failed");
            } else {
                warn!(error = %e, kind = message.payload.kind(), "Broadcast failed, followers may miss updates");
                self.publish_failure_logged = true;
            }
        }
    }

    /// Accept a message from the channel unless we sent it.
    pub fn receive(&self, message: BroadcastMessage) -> Option<BroadcastMessage> {
        if self.channel.is_none() || message.sender_id == self.sender_id {
            return None;
        }
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::model::{IssueEventType, IssueSummary};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Loopback {
        posted: Arc<Mutex<Vec<BroadcastMessage>>>,
        broken: bool,
    }

    impl ChannelBackend for Loopback {
        fn post(&self, message: &BroadcastMessage) -> Result<(), ChannelError> {
            if self.broken {
                return Err(ChannelError::Closed);
            }
            self.posted.lock().push(message.clone());
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_000).unwrap()
    }

    #[test]
    fn test_broadcast_stamps_identity_and_time() {
        let channel = Loopback::default();
        let mut relay = BroadcastRelay::new("tab-a", Box::new(channel.clone())).unwrap();

        relay.broadcast_state(ConnectionState::Open, now());

        let posted = channel.posted.lock();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].sender_id, "tab-a");
        assert_eq!(posted[0].timestamp, now());
        assert_eq!(posted[0].payload, RelayPayload::State { state: ConnectionState::Open });
    }

    #[test]
    fn test_own_messages_filtered() {
        let channel = Loopback::default();
        let mut a = BroadcastRelay::new("tab-a", Box::new(channel.clone())).unwrap();
        let b = BroadcastRelay::new("tab-b", Box::new(channel.clone())).unwrap();

        let deleted = PendingIssueEvent::new(IssueEventType::Deleted, IssueSummary::new("bd-3"));
        a.broadcast_deleted(&deleted, now());
        let message = channel.posted.lock()[0].clone();

        assert!(a.receive(message.clone()).is_none());
        assert_eq!(b.receive(message.clone()), Some(message));
    }

    #[test]
    fn test_disabled_relay() {
        let mut relay = BroadcastRelay::disabled("tab-a").unwrap();
        assert!(!relay.is_mirroring_enabled());
        relay.broadcast_state(ConnectionState::Open, now());

        let foreign = BroadcastMessage {
            payload: RelayPayload::State { state: ConnectionState::Open },
            sender_id: "tab-b".into(),
            timestamp: now(),
        };
        assert!(relay.receive(foreign).is_none());
    }

    #[test]
    fn test_publish_failure_is_swallowed() {
        let channel = Loopback {
            broken: true,
            ..Loopback::default()
        };
        let mut relay = BroadcastRelay::new("tab-a", Box::new(channel)).unwrap();
        relay.broadcast_state(ConnectionState::Open, now());
        relay.broadcast_state(ConnectionState::Waiting, now());
        assert!(relay.is_mirroring_enabled());
    }

    #[test]
    fn test_state_request_and_warning_published() {
        let channel = Loopback::default();
        let mut relay = BroadcastRelay::new("tab-b", Box::new(channel.clone())).unwrap();

        relay.request_state(now());
        relay.broadcast_warning(std::time::Duration::from_secs(12), now());

        let posted = channel.posted.lock();
        assert_eq!(posted[0].payload, RelayPayload::Sync);
        assert_eq!(
            posted[1].payload,
            RelayPayload::Warning {
                disconnected_for_ms: 12_000
            }
        );
    }

    #[test]
    fn test_empty_sender_rejected() {
        assert!(matches!(
            BroadcastRelay::disabled(""),
            Err(TabSyncError::MissingIdentity(_))
        ));
    }
}
