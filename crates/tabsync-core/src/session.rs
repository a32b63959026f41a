//! Per-tab wiring of election, stream and relay.
//!
//! The leader runs the stream and broadcasts what it sees; followers keep
//! their stream stopped and replay what the leader broadcasts. The UI gets
//! the same callbacks either way. A tab that starts following asks the
//! leader to repeat its connection state, since state is otherwise only
//! sent when it changes.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::clock::{earliest, Clock};
use crate::config::TabSyncConfig;
use crate::error::TabSyncResult;
use crate::issue::model::{BatchedUpdateNotification, PendingIssueEvent};
use crate::lease::model::Role;
use crate::lease::store::LeaseStore;
use crate::lease::LeaderCoordinator;
use crate::relay::model::{BroadcastMessage, RelayPayload};
use crate::relay::{BroadcastRelay, ChannelBackend};
use crate::stream::model::{ConnectionId, ConnectionState, StreamOutput, TransportEvent};
use crate::stream::transport::TransportFactory;
use crate::stream::StreamController;

/// What the UI of one tab is told.
pub trait SessionListener {
    fn on_role_change(&mut self, _role: Role) {}

    /// Raw events, leader only.
    fn on_event(&mut self, _event: &PendingIssueEvent) {}

    fn on_deleted(&mut self, _event: &PendingIssueEvent) {}

    fn on_batch(&mut self, _batch: &BatchedUpdateNotification) {}

    fn on_state_change(&mut self, _state: ConnectionState) {}

    fn on_disconnect_warning(&mut self, _disconnected_for: Duration) {}

    /// This tab follows but cannot see the leader's updates.
    fn on_mirroring_unavailable(&mut self) {}
}

/// Session callbacks as values. `Vec<SessionNotification>` records them.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    RoleChanged(Role),
    Event(PendingIssueEvent),
    Deleted(PendingIssueEvent),
    Batch(BatchedUpdateNotification),
    StateChanged(ConnectionState),
    DisconnectWarning(Duration),
    MirroringUnavailable,
}

impl SessionListener for Vec<SessionNotification> {
    fn on_role_change(&mut self, role: Role) {
        self.push(SessionNotification::RoleChanged(role));
    }

    fn on_event(&mut self, event: &PendingIssueEvent) {
        self.push(SessionNotification::Event(event.clone()));
    }

    fn on_deleted(&mut self, event: &PendingIssueEvent) {
        self.push(SessionNotification::Deleted(event.clone()));
    }

    fn on_batch(&mut self, batch: &BatchedUpdateNotification) {
        self.push(SessionNotification::Batch(batch.clone()));
    }

    fn on_state_change(&mut self, state: ConnectionState) {
        self.push(SessionNotification::StateChanged(state));
    }

    fn on_disconnect_warning(&mut self, disconnected_for: Duration) {
        self.push(SessionNotification::DisconnectWarning(disconnected_for));
    }

    fn on_mirroring_unavailable(&mut self) {
        self.push(SessionNotification::MirroringUnavailable);
    }
}

/// Host services a session is built from.
pub struct SessionParts {
    pub storage: LeaseStore,
    /// `None` when the host has no cross-tab channel.
    pub channel: Option<Box<dyn ChannelBackend>>,
    pub transport: Box<dyn TransportFactory>,
    pub clock: Arc<dyn Clock>,
}

/// Live-update coordination for one tab.
pub struct TabSession<L: SessionListener> {
    clock: Arc<dyn Clock>,
    coordinator: LeaderCoordinator,
    stream: StreamController<Vec<StreamOutput>>,
    relay: BroadcastRelay,
    listener: L,
    mirroring_notice_shown: bool,
}

impl<L: SessionListener> TabSession<L> {
    /// Build a session with a fresh random tab identity.
    pub fn new(config: &TabSyncConfig, parts: SessionParts, listener: L) -> TabSyncResult<Self> {
        Self::with_tab_id(uuid::Uuid::new_v4().to_string(), config, parts, listener)
    }

    pub fn with_tab_id(
        tab_id: impl Into<String>,
        config: &TabSyncConfig,
        parts: SessionParts,
        listener: L,
    ) -> TabSyncResult<Self> {
        config.validate()?;
        let coordinator =
            LeaderCoordinator::with_tab_id(tab_id, parts.storage, config.leader.clone())?;
        let relay = match parts.channel {
            Some(channel) => BroadcastRelay::new(coordinator.tab_id(), channel)?,
            None => BroadcastRelay::disabled(coordinator.tab_id())?,
        };
        let stream = StreamController::new(config.stream.clone(), parts.transport, Vec::new())?;

        Ok(Self {
            clock: parts.clock,
            coordinator,
            stream,
            relay,
            listener,
            mirroring_notice_shown: false,
        })
    }

    pub fn tab_id(&self) -> &str {
        self.coordinator.tab_id()
    }

    pub fn role(&self) -> Option<Role> {
        self.coordinator.role()
    }

    pub fn stream_state(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_connected()
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.stream.last_heartbeat()
    }

    pub fn stream(&self) -> &StreamController<Vec<StreamOutput>> {
        &self.stream
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// First election; starts the stream if this tab leads.
    pub fn init(&mut self) {
        let now = self.clock.now();
        info!(tab_id = %self.tab_id(), "Tab session starting");
        if let Some(role) = self.coordinator.init(now) {
            self.apply_role(role, now);
        }
    }

    /// A signal from the connection opened as `id`.
    pub fn handle_transport(&mut self, id: ConnectionId, event: TransportEvent) {
        let now = self.clock.now();
        self.stream.handle(now, id, event);
        self.drain_stream(now);
    }

    /// Another tab wrote `key` in shared storage.
    pub fn handle_storage_change(&mut self, key: &str) {
        let now = self.clock.now();
        if let Some(role) = self.coordinator.on_external_change(now, key) {
            self.apply_role(role, now);
        }
    }

    /// A message arrived on the cross-tab channel.
    pub fn handle_broadcast(&mut self, message: BroadcastMessage) {
        let Some(message) = self.relay.receive(message) else {
            return;
        };

        match (self.coordinator.role(), message.payload) {
            (Some(Role::Leader), RelayPayload::Sync) => {
                let now = self.clock.now();
                debug!(tab_id = %self.tab_id(), follower = %message.sender_id, "Repeating stream state");
                self.relay.broadcast_state(self.stream.state(), now);
            }
            (Some(Role::Follower), RelayPayload::Update { batch }) => self.listener.on_batch(&batch),
            (Some(Role::Follower), RelayPayload::Deleted { event }) => self.listener.on_deleted(&event),
            (Some(Role::Follower), RelayPayload::State { state }) => {
                self.listener.on_state_change(state)
            }
            (Some(Role::Follower), RelayPayload::Warning { disconnected_for_ms }) => {
                self.listener
                    .on_disconnect_warning(Duration::from_millis(disconnected_for_ms));
            }
            (role, payload) => debug!(
                tab_id = %self.tab_id(),
                role = ?role,
                sender = %message.sender_id,
                kind = payload.kind(),
                "Ignoring broadcast"
            ),
        }
    }

    /// Fire every due deadline.
    pub fn poll(&mut self) {
        let now = self.clock.now();
        if let Some(role) = self.coordinator.poll(now) {
            self.apply_role(role, now);
        }
        self.stream.poll(now);
        self.drain_stream(now);
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        earliest(self.coordinator.next_deadline(), self.stream.next_deadline())
    }

    /// Clean unload: release the lease and close the stream.
    pub fn shutdown(&mut self) {
        info!(tab_id = %self.tab_id(), "Tab session shutting down");
        self.coordinator.release();
        self.stream.stop();
        self.stream.listener_mut().clear();
    }

    fn apply_role(&mut self, role: Role, now: DateTime<Utc>) {
        self.listener.on_role_change(role);

        match role {
            Role::Leader => self.stream.start(now),
            Role::Follower => {
                if self.stream.state().is_active() {
                    self.stream.stop();
                }
                if self.relay.is_mirroring_enabled() {
                    self.relay.request_state(now);
                } else if !self.mirroring_notice_shown {
                    self.mirroring_notice_shown = true;
                    self.listener.on_mirroring_unavailable();
                }
            }
        }
        self.drain_stream(now);
    }

    /// Forward stream outputs to the UI and, while leading, to other tabs.
    fn drain_stream(&mut self, now: DateTime<Utc>) {
        let outputs = std::mem::take(self.stream.listener_mut());
        if !self.coordinator.is_leader() {
            return;
        }

        for output in outputs {
            match output {
                StreamOutput::Event(event) => self.listener.on_event(&event),
                StreamOutput::Deleted(event) => {
                    self.listener.on_deleted(&event);
                    self.relay.broadcast_deleted(&event, now);
                }
                StreamOutput::Batch(batch) => {
                    self.listener.on_batch(&batch);
                    self.relay.broadcast_update(&batch, now);
                }
                StreamOutput::StateChanged(state) => {
                    self.listener.on_state_change(state);
                    self.relay.broadcast_state(state, now);
                }
                StreamOutput::DisconnectWarning(d) => {
                    self.listener.on_disconnect_warning(d);
                    self.relay.broadcast_warning(d, now);
                }
            }
        }
    }
}
