//! Shared storage for the tabs of one in-process browser.
//!
//! Writes from one tab raise a change notice in every other tab, the way a
//! browser fires `storage` events. The writing tab never sees its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use tabsync_core::error::StorageError;
use tabsync_core::{MemoryBackend, StorageBackend};

const CHANGE_CAPACITY: usize = 100;

/// A key changed in shared storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    origin: u64,
}

/// The browser-wide store. Clones share contents and notices.
#[derive(Clone)]
pub struct MemoryStorage {
    backend: MemoryBackend,
    changes: broadcast::Sender<StorageChange>,
    next_origin: Arc<AtomicU64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            backend: MemoryBackend::new(),
            changes,
            next_origin: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Make every operation fail, as a disabled or full store would.
    pub fn set_available(&self, available: bool) {
        self.backend.set_available(available);
    }

    /// Raw value under `key`.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.backend.peek(key)
    }

    /// A handle for one tab plus that tab's feed of foreign changes.
    pub fn attach(&self) -> (TabStorage, StorageEvents) {
        let origin = self.next_origin.fetch_add(1, Ordering::Relaxed);
        let storage = TabStorage {
            backend: self.backend.clone(),
            changes: self.changes.clone(),
            origin,
        };
        let events = StorageEvents {
            rx: self.changes.subscribe(),
            origin,
        };
        (storage, events)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// One tab's view of [`MemoryStorage`].
pub struct TabStorage {
    backend: MemoryBackend,
    changes: broadcast::Sender<StorageChange>,
    origin: u64,
}

impl TabStorage {
    fn notify(&self, key: &str) {
        let change = StorageChange {
            key: key.to_string(),
            origin: self.origin,
        };
        // No receivers just means no other tab is open.
        let _ = self.changes.send(change);
    }
}

impl StorageBackend for TabStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.backend.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let previous = self.backend.get_item(key)?;
        self.backend.set_item(key, value)?;
        if previous.as_deref() != Some(value) {
            self.notify(key);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let previous = self.backend.get_item(key)?;
        self.backend.remove_item(key)?;
        if previous.is_some() {
            self.notify(key);
        }
        Ok(())
    }
}

/// Changes made by other tabs.
pub struct StorageEvents {
    rx: broadcast::Receiver<StorageChange>,
    origin: u64,
}

impl StorageEvents {
    /// Next changed key, `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.origin == self.origin => continue,
                Ok(change) => return Some(change.key),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Storage notices dropped, relying on safety check");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Storage notices closed");
                    return None;
                }
            }
        }
    }
}
