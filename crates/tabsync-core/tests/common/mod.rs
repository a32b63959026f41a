#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;

use tabsync_core::config::DEFAULT_LEASE_KEY;
use tabsync_core::error::{ChannelError, StorageError, TransportError};
use tabsync_core::relay::model::BroadcastMessage;
use tabsync_core::stream::model::{ConnectionId, ConnectionState};
use tabsync_core::stream::transport::{Transport, TransportFactory};
use tabsync_core::{
    ChannelBackend, LeaseStore, ManualClock, MemoryBackend, SessionNotification, SessionParts,
    StorageBackend, TabSession, TabSyncConfig,
};

pub type Tab = TabSession<Vec<SessionNotification>>;

/// Channel shared by every simulated tab. Messages queue until delivered.
#[derive(Clone, Default)]
pub struct Bus {
    posted: Arc<Mutex<Vec<BroadcastMessage>>>,
}

impl Bus {
    pub fn drain(&self) -> Vec<BroadcastMessage> {
        std::mem::take(&mut *self.posted.lock())
    }
}

impl ChannelBackend for Bus {
    fn post(&self, message: &BroadcastMessage) -> Result<(), ChannelError> {
        self.posted.lock().push(message.clone());
        Ok(())
    }
}

/// Records connections; never produces signals on its own.
#[derive(Clone, Default)]
pub struct Connections {
    pub opened: Arc<Mutex<Vec<ConnectionId>>>,
    pub closed: Arc<Mutex<Vec<ConnectionId>>>,
}

struct RecordedTransport {
    id: ConnectionId,
    closed: Arc<Mutex<Vec<ConnectionId>>>,
}

impl Transport for RecordedTransport {
    fn close(&mut self) {
        self.closed.lock().push(self.id);
    }
}

impl TransportFactory for Connections {
    fn connect(
        &mut self,
        id: ConnectionId,
        _url: &str,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.opened.lock().push(id);
        Ok(Box::new(RecordedTransport {
            id,
            closed: self.closed.clone(),
        }))
    }
}

/// Storage whose lease reads can be held at an earlier value while
/// writes still land, so several tabs can read before any of them writes.
#[derive(Clone)]
struct RacyStorage {
    inner: MemoryBackend,
    pinned: Arc<Mutex<Option<Option<String>>>>,
}

impl StorageBackend for RacyStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let live = self.inner.get_item(key)?;
        match &*self.pinned.lock() {
            Some(snapshot) if key == DEFAULT_LEASE_KEY => Ok(snapshot.clone()),
            _ => Ok(live),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(key)
    }
}

/// One browser: shared clock, storage and channel.
#[derive(Clone, Default)]
pub struct Browser {
    pub clock: ManualClock,
    pub storage: MemoryBackend,
    pub bus: Bus,
    pinned_lease: Arc<Mutex<Option<Option<String>>>>,
}

impl Browser {
    pub fn open_tab(&self, tab_id: &str) -> (Tab, Connections) {
        self.open_tab_with(tab_id, TabSyncConfig::default(), true)
    }

    pub fn open_tab_with(
        &self,
        tab_id: &str,
        config: TabSyncConfig,
        with_channel: bool,
    ) -> (Tab, Connections) {
        let connections = Connections::default();
        let channel: Option<Box<dyn ChannelBackend>> = if with_channel {
            Some(Box::new(self.bus.clone()))
        } else {
            None
        };
        let parts = SessionParts {
            storage: LeaseStore::new(Box::new(RacyStorage {
                inner: self.storage.clone(),
                pinned: self.pinned_lease.clone(),
            })),
            channel,
            transport: Box::new(connections.clone()),
            clock: Arc::new(self.clock.clone()),
        };
        let mut tab = TabSession::with_tab_id(tab_id, &config, parts, Vec::new())
            .expect("valid session");
        tab.init();
        (tab, connections)
    }

    /// Until [`Browser::unpin_lease_reads`], every tab reads the lease as
    /// it is now, whatever gets written meanwhile.
    pub fn pin_lease_reads(&self) {
        *self.pinned_lease.lock() = Some(self.lease_raw());
    }

    pub fn unpin_lease_reads(&self) {
        *self.pinned_lease.lock() = None;
    }

    pub fn lease_raw(&self) -> Option<String> {
        self.storage.peek(tabsync_core::config::DEFAULT_LEASE_KEY)
    }

    /// Hand every queued broadcast to every tab.
    pub fn deliver(&self, tabs: &mut [&mut Tab]) {
        for message in self.bus.drain() {
            for tab in tabs.iter_mut() {
                tab.handle_broadcast(message.clone());
            }
        }
    }
}

/// Small deterministic generator for interleaving schedules.
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn below(&mut self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i + 1);
            items.swap(i, j);
        }
    }
}

pub fn states(tab: &Tab) -> Vec<ConnectionState> {
    tab.listener()
        .iter()
        .filter_map(|n| match n {
            SessionNotification::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect()
}

pub fn batches(tab: &Tab) -> Vec<Vec<String>> {
    tab.listener()
        .iter()
        .filter_map(|n| match n {
            SessionNotification::Batch(b) => Some(b.issue_ids.clone()),
            _ => None,
        })
        .collect()
}

pub fn issue_payload(id: &str, status: &str) -> String {
    format!(r#"{{"issue":{{"id":"{id}","title":"Issue {id}","status":"{status}"}}}}"#)
}
