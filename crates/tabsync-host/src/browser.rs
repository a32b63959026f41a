//! One simulated browser: what its tabs share.

use std::sync::Arc;
use tokio::sync::mpsc;

use tabsync_core::{
    ChannelBackend, LeaseStore, SessionListener, SessionParts, TabSession, TabSyncConfig,
    TabSyncResult,
};

use crate::channel::MemoryChannel;
use crate::clock::TokioClock;
use crate::runner::{spawn_tab, TabHandle, TabInputs};
use crate::storage::MemoryStorage;
use crate::transport::SseTransportFactory;

/// Storage, relay channel, HTTP client and clock shared across tabs.
#[derive(Clone)]
pub struct Browser {
    config: Arc<TabSyncConfig>,
    storage: MemoryStorage,
    channel: Option<MemoryChannel>,
    client: reqwest::Client,
    clock: TokioClock,
}

impl Browser {
    pub fn new(config: TabSyncConfig) -> TabSyncResult<Self> {
        config.validate()?;
        let channel = MemoryChannel::new(config.relay.channel_name.clone());

        Ok(Self {
            config: Arc::new(config),
            storage: MemoryStorage::new(),
            channel: Some(channel),
            client: reqwest::Client::new(),
            clock: TokioClock::new(),
        })
    }

    /// A browser whose tabs cannot relay to each other.
    pub fn without_channel(mut self) -> Self {
        self.channel = None;
        self
    }

    pub fn config(&self) -> &TabSyncConfig {
        &self.config
    }

    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }

    /// Open a tab and start its event loop. Must be called within a tokio
    /// runtime.
    pub fn open_tab<L>(&self, tab_id: impl Into<String>, listener: L) -> TabSyncResult<TabHandle>
    where
        L: SessionListener + Send + 'static,
    {
        let (signal_tx, signals) = mpsc::unbounded_channel();
        let (storage, storage_events) = self.storage.attach();
        let (port, messages) = match &self.channel {
            Some(channel) => {
                let (port, messages) = channel.attach();
                (Some(Box::new(port) as Box<dyn ChannelBackend>), Some(messages))
            }
            None => (None, None),
        };

        let parts = SessionParts {
            storage: LeaseStore::new(Box::new(storage)),
            channel: port,
            transport: Box::new(SseTransportFactory::new(self.client.clone(), signal_tx)),
            clock: Arc::new(self.clock),
        };
        let session = TabSession::with_tab_id(tab_id, &self.config, parts, listener)?;

        Ok(spawn_tab(
            session,
            TabInputs {
                clock: self.clock,
                signals,
                storage: storage_events,
                channel: messages,
            },
        ))
    }
}
