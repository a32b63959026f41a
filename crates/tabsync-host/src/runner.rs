//! Per-tab event loop.
//!
//! One task per tab owns its [`TabSession`] and serializes every input
//! through a single `select!`: transport signals, storage notices, relay
//! messages, the next deadline and the shutdown signal.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tabsync_core::issue::model::{BatchedUpdateNotification, PendingIssueEvent};
use tabsync_core::relay::model::BroadcastMessage;
use tabsync_core::stream::model::ConnectionState;
use tabsync_core::{Role, SessionListener, SessionNotification, TabSession};

use crate::channel::ChannelMessages;
use crate::clock::TokioClock;
use crate::storage::StorageEvents;
use crate::transport::SignalReceiver;

/// Everything a tab task listens to besides its session.
pub struct TabInputs {
    pub clock: TokioClock,
    pub signals: SignalReceiver,
    pub storage: StorageEvents,
    /// `None` when the browser has no relay channel.
    pub channel: Option<ChannelMessages>,
}

/// Owner's handle on a running tab. Dropping it closes the tab cleanly.
pub struct TabHandle {
    tab_id: String,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TabHandle {
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Close the tab cleanly, releasing its lease, and wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            warn!(tab_id = %self.tab_id, error = %e, "Tab task ended abnormally");
        }
    }

    /// Kill the tab without any cleanup, as a crashed or frozen tab.
    pub fn crash(self) {
        warn!(tab_id = %self.tab_id, "Killing tab without releasing its lease");
        self.task.abort();
    }
}

/// Run `session` on its own task. Must be called within a tokio runtime.
pub fn spawn_tab<L>(session: TabSession<L>, inputs: TabInputs) -> TabHandle
where
    L: SessionListener + Send + 'static,
{
    let tab_id = session.tab_id().to_string();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(run_tab(session, inputs, shutdown_rx));

    TabHandle {
        tab_id,
        shutdown_tx,
        task,
    }
}

async fn run_tab<L: SessionListener>(
    mut session: TabSession<L>,
    mut inputs: TabInputs,
    mut shutdown: oneshot::Receiver<()>,
) {
    session.init();

    loop {
        let deadline = session.next_deadline().map(|at| inputs.clock.instant_at(at));

        tokio::select! {
            _ = &mut shutdown => break,
            Some(signal) = inputs.signals.recv() => {
                session.handle_transport(signal.connection, signal.event);
            }
            Some(key) = inputs.storage.recv() => {
                session.handle_storage_change(&key);
            }
            Some(message) = next_message(&mut inputs.channel) => {
                session.handle_broadcast(message);
            }
            _ = wait_until(deadline) => session.poll(),
        }
    }

    session.shutdown();
    info!(tab_id = %session.tab_id(), "Tab closed");
}

async fn next_message(channel: &mut Option<ChannelMessages>) -> Option<BroadcastMessage> {
    match channel {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// A session notification from a named tab.
#[derive(Debug, Clone, PartialEq)]
pub struct TabNotification {
    pub tab_id: String,
    pub notification: SessionNotification,
}

/// Listener that forwards every notification to a queue, tagged with the
/// tab id, for a consumer outside the tab task.
#[derive(Clone)]
pub struct NotificationSink {
    tab_id: String,
    tx: mpsc::UnboundedSender<TabNotification>,
}

impl NotificationSink {
    pub fn new(tab_id: impl Into<String>, tx: mpsc::UnboundedSender<TabNotification>) -> Self {
        Self {
            tab_id: tab_id.into(),
            tx,
        }
    }

    fn emit(&self, notification: SessionNotification) {
        let notice = TabNotification {
            tab_id: self.tab_id.clone(),
            notification,
        };
        if self.tx.send(notice).is_err() {
            debug!(tab_id = %self.tab_id, "Notification consumer gone");
        }
    }
}

impl SessionListener for NotificationSink {
    fn on_role_change(&mut self, role: Role) {
        self.emit(SessionNotification::RoleChanged(role));
    }

    fn on_event(&mut self, event: &PendingIssueEvent) {
        self.emit(SessionNotification::Event(event.clone()));
    }

    fn on_deleted(&mut self, event: &PendingIssueEvent) {
        self.emit(SessionNotification::Deleted(event.clone()));
    }

    fn on_batch(&mut self, batch: &BatchedUpdateNotification) {
        self.emit(SessionNotification::Batch(batch.clone()));
    }

    fn on_state_change(&mut self, state: ConnectionState) {
        self.emit(SessionNotification::StateChanged(state));
    }

    fn on_disconnect_warning(&mut self, disconnected_for: Duration) {
        self.emit(SessionNotification::DisconnectWarning(disconnected_for));
    }

    fn on_mirroring_unavailable(&mut self) {
        self.emit(SessionNotification::MirroringUnavailable);
    }
}
