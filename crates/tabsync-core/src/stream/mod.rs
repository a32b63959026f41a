//! Stream Controller: lifecycle of the push connection.
//!
//! State machine (initial `idle`):
//!
//! ```text
//! idle ──start──▶ connecting ──opened──▶ open ──message/heartbeat──▶ open
//!   │                 │                    │
//!   │                 └──────error─────────┴──▶ error ──▶ waiting ──deadline──▶ connecting
//!   └──no transport──▶ unsupported
//! any ──stop──▶ stopped ──start──▶ idle ──▶ connecting
//! ```
//!
//! Qualifying issue events are coalesced per issue id and flushed as one
//! batch once the debounce window closes. Deletions are also reported
//! immediately.

pub mod backoff;
pub mod coalesce;
pub mod model;
pub mod transport;

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::{after, earliest, elapsed};
use crate::config::StreamConfig;
use crate::error::TabSyncResult;
use crate::issue::model::{BatchedUpdateNotification, IssueEventType, PendingIssueEvent};
use crate::issue::parse_issue_event;
use backoff::Backoff;
use coalesce::Coalescer;
use model::{ConnectionId, ConnectionState, StreamOutput, TransportEvent, HEARTBEAT_EVENT};
use transport::{Transport, TransportFactory};

/// Receives everything a [`StreamController`] reports.
pub trait StreamListener {
    /// Every qualifying event, before coalescing.
    fn on_event(&mut self, _event: &PendingIssueEvent) {}

    /// A `deleted` event, without waiting for the debounce window.
    fn on_deleted(&mut self, _event: &PendingIssueEvent) {}

    /// One coalesced batch per debounce window.
    fn on_batch(&mut self, _batch: &BatchedUpdateNotification) {}

    /// Every state transition, once.
    fn on_state_change(&mut self, _state: ConnectionState) {}

    /// Still disconnected after the configured warning delay.
    fn on_disconnect_warning(&mut self, _disconnected_for: Duration) {}
}

impl StreamListener for Vec<StreamOutput> {
    fn on_event(&mut self, event: &PendingIssueEvent) {
        self.push(StreamOutput::Event(event.clone()));
    }

    fn on_deleted(&mut self, event: &PendingIssueEvent) {
        self.push(StreamOutput::Deleted(event.clone()));
    }

    fn on_batch(&mut self, batch: &BatchedUpdateNotification) {
        self.push(StreamOutput::Batch(batch.clone()));
    }

    fn on_state_change(&mut self, state: ConnectionState) {
        self.push(StreamOutput::StateChanged(state));
    }

    fn on_disconnect_warning(&mut self, disconnected_for: Duration) {
        self.push(StreamOutput::DisconnectWarning(disconnected_for));
    }
}

struct ActiveConnection {
    id: ConnectionId,
    transport: Box<dyn Transport>,
}

/// Owns the push connection: connect, reconnect with backoff, debounce.
pub struct StreamController<L: StreamListener> {
    config: StreamConfig,
    factory: Box<dyn TransportFactory>,
    listener: L,
    state: ConnectionState,
    backoff: Backoff,
    connection: Option<ActiveConnection>,
    next_connection_id: u64,
    reconnect_at: Option<DateTime<Utc>>,
    debounce_at: Option<DateTime<Utc>>,
    warning_at: Option<DateTime<Utc>>,
    connection_lost_at: Option<DateTime<Utc>>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    pending: Coalescer,
}

impl<L: StreamListener> StreamController<L> {
    pub fn new(
        config: StreamConfig,
        factory: Box<dyn TransportFactory>,
        listener: L,
    ) -> TabSyncResult<Self> {
        config.validate()?;
        let backoff = Backoff::new(config.initial_backoff, config.max_backoff);

        Ok(Self {
            config,
            factory,
            listener,
            state: ConnectionState::Idle,
            backoff,
            connection: None,
            next_connection_id: 1,
            reconnect_at: None,
            debounce_at: None,
            warning_at: None,
            connection_lost_at: None,
            last_heartbeat_at: None,
            pending: Coalescer::new(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Time of the last heartbeat or message on any connection.
    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat_at
    }

    /// When the current disconnection began, if disconnected after a failure.
    pub fn connection_lost_at(&self) -> Option<DateTime<Utc>> {
        self.connection_lost_at
    }

    pub fn current_connection(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|c| c.id)
    }

    /// Failures since the last successful open.
    pub fn retry_attempt(&self) -> u32 {
        self.backoff.attempt()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    /// Begin connecting. No-op while already active or once unsupported.
    pub fn start(&mut self, now: DateTime<Utc>) {
        match self.state {
            ConnectionState::Unsupported => return,
            ConnectionState::Idle => {}
            ConnectionState::Stopped => self.transition(ConnectionState::Idle),
            _ => {
                debug!(state = %self.state, "Stream already started");
                return;
            }
        }

        if !self.factory.is_supported() {
            warn!("Push transport unavailable, live updates disabled");
            self.transition(ConnectionState::Unsupported);
            return;
        }

        self.backoff.reset();
        self.connect(now);
    }

    /// Cancel every deadline, drop pending events and close the connection.
    pub fn stop(&mut self) {
        if self.state == ConnectionState::Unsupported {
            return;
        }
        self.reconnect_at = None;
        self.debounce_at = None;
        self.warning_at = None;
        self.connection_lost_at = None;
        self.pending.clear();
        self.close_connection();
        self.transition(ConnectionState::Stopped);
    }

    /// Feed a signal from the transport opened as `id`.
    pub fn handle(&mut self, now: DateTime<Utc>, id: ConnectionId, event: TransportEvent) {
        if self.current_connection() != Some(id) {
            debug!(connection = %id, "Ignoring signal from a closed connection");
            return;
        }

        match event {
            TransportEvent::Opened => self.mark_open(now),
            TransportEvent::Message { event, data } => {
                self.last_heartbeat_at = Some(now);
                if self.state == ConnectionState::Connecting {
                    self.mark_open(now);
                }
                if event == HEARTBEAT_EVENT {
                    return;
                }
                match IssueEventType::from_event_name(&event) {
                    Some(event_type) => self.intake(now, event_type, &data),
                    None => debug!(event = %event, "Ignoring non-issue event"),
                }
            }
            TransportEvent::Error(reason) => self.fail(now, &reason),
        }
    }

    /// Fire every deadline that is due.
    pub fn poll(&mut self, now: DateTime<Utc>) {
        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            if self.state == ConnectionState::Waiting {
                self.connect(now);
            }
        }

        if self.debounce_at.is_some_and(|at| at <= now) {
            self.flush(now);
        }

        if self.warning_at.is_some_and(|at| at <= now) {
            self.warning_at = None;
            if let Some(lost_at) = self.connection_lost_at {
                let disconnected_for = elapsed(lost_at, now);
                warn!(seconds = disconnected_for.as_secs(), "Still disconnected from event stream");
                self.listener.on_disconnect_warning(disconnected_for);
            }
        }
    }

    /// Earliest pending reconnect, debounce or warning deadline.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        earliest(earliest(self.reconnect_at, self.debounce_at), self.warning_at)
    }

    fn connect(&mut self, now: DateTime<Utc>) {
        self.close_connection();
        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;

        self.transition(ConnectionState::Connecting);
        debug!(connection = %id, url = %self.config.url, "Connecting to event stream");

        match self.factory.connect(id, &self.config.url) {
            Ok(transport) => self.connection = Some(ActiveConnection { id, transport }),
            Err(e) => self.fail(now, &e.to_string()),
        }
    }

    fn mark_open(&mut self, now: DateTime<Utc>) {
        self.backoff.reset();
        self.last_heartbeat_at = Some(now);
        self.connection_lost_at = None;
        self.warning_at = None;
        if self.state != ConnectionState::Open {
            info!(connection = ?self.current_connection(), "Event stream connected");
        }
        self.transition(ConnectionState::Open);
    }

    fn fail(&mut self, now: DateTime<Utc>, reason: &str) {
        if !matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            debug!(state = %self.state, reason = %reason, "Ignoring transport error");
            return;
        }
        self.close_connection();
        self.transition(ConnectionState::Error);

        if self.connection_lost_at.is_none() {
            self.connection_lost_at = Some(now);
            self.warning_at = self.config.disconnect_warning.map(|d| after(now, d));
        }

        let delay = self.backoff.next_delay();
        warn!(
            reason = %reason,
            attempt = self.backoff.attempt(),
            retry_in_ms = delay.as_millis() as u64,
            "Event stream error, scheduling reconnect"
        );
        self.reconnect_at = Some(after(now, delay));
        self.transition(ConnectionState::Waiting);
    }

    fn intake(&mut self, now: DateTime<Utc>, event_type: IssueEventType, data: &str) {
        let entry = match parse_issue_event(event_type, data) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(event = %event_type, error = %e, "Dropping malformed issue event");
                return;
            }
        };

        self.listener.on_event(&entry);
        if event_type == IssueEventType::Deleted {
            self.listener.on_deleted(&entry);
        }
        self.pending.push(entry);
        self.debounce_at = Some(after(now, self.config.debounce));
    }

    fn flush(&mut self, now: DateTime<Utc>) {
        self.debounce_at = None;
        if let Some(batch) = self.pending.flush(now) {
            debug!(issues = batch.len(), "Flushing coalesced issue events");
            self.listener.on_batch(&batch);
        }
    }

    fn close_connection(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            debug!(connection = %connection.id, "Closing event stream connection");
            connection.transport.close();
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        debug!(from = %self.state, to = %next, "Stream state transition");
        self.state = next;
        self.listener.on_state_change(next);
    }
}
