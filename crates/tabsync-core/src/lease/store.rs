//! Lease Store: JSON lease records on top of a shared string store.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::model::LeaseRecord;
use crate::error::StorageError;

/// A same-origin, cross-tab persistent string store.
pub trait StorageBackend: Send {
    /// `false` when the store is disabled (private mode, quota, policy).
    fn is_available(&self) -> bool {
        true
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Typed access to lease records.
///
/// Without a backend, or with an unavailable one, every operation fails
/// with [`StorageError::Unavailable`] and has no effect.
pub struct LeaseStore {
    backend: Option<Box<dyn StorageBackend>>,
}

impl LeaseStore {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A store for hosts with no shared storage at all.
    pub fn unsupported() -> Self {
        Self { backend: None }
    }

    pub fn is_supported(&self) -> bool {
        self.backend.as_ref().is_some_and(|b| b.is_available())
    }

    fn backend(&self) -> Result<&dyn StorageBackend, StorageError> {
        match &self.backend {
            Some(backend) if backend.is_available() => Ok(backend.as_ref()),
            _ => Err(StorageError::Unavailable),
        }
    }

    /// Read the record under `key`. Unparseable values read as absent.
    pub fn read(&self, key: &str) -> Result<Option<LeaseRecord>, StorageError> {
        let Some(raw) = self.backend()?.get_item(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring unreadable lease record");
                Ok(None)
            }
        }
    }

    pub fn write(&self, key: &str, record: &LeaseRecord) -> Result<(), StorageError> {
        let backend = self.backend()?;
        let raw = serde_json::to_string(record)?;
        backend.set_item(key, &raw)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.backend()?.remove_item(key)
    }
}

/// In-process [`StorageBackend`]. Clones share the same map, so handing a
/// clone to each simulated tab models one browser's storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    items: Arc<Mutex<HashMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate storage being disabled or throwing.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Raw value under `key`, bypassing availability.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Backend("storage disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.items.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    const KEY: &str = "tabsync:leader";

    #[test]
    fn test_write_read_remove() {
        let backend = MemoryBackend::new();
        let store = LeaseStore::new(Box::new(backend.clone()));
        let record = LeaseRecord::new("tab-a", DateTime::<Utc>::UNIX_EPOCH);

        store.write(KEY, &record).unwrap();
        assert_eq!(store.read(KEY).unwrap(), Some(record));
        assert!(backend.peek(KEY).unwrap().contains("\"ownerId\":\"tab-a\""));

        store.remove(KEY).unwrap();
        assert_eq!(store.read(KEY).unwrap(), None);
    }

    #[test]
    fn test_garbage_reads_as_absent() {
        let backend = MemoryBackend::new();
        backend.set_item(KEY, "not a lease").unwrap();
        let store = LeaseStore::new(Box::new(backend));
        assert_eq!(store.read(KEY).unwrap(), None);
    }

    #[test]
    fn test_unsupported_store_is_inert() {
        let store = LeaseStore::unsupported();
        assert!(!store.is_supported());
        assert!(matches!(store.read(KEY), Err(StorageError::Unavailable)));
        let record = LeaseRecord::new("tab-a", DateTime::<Utc>::UNIX_EPOCH);
        assert!(matches!(store.write(KEY, &record), Err(StorageError::Unavailable)));
        assert!(matches!(store.remove(KEY), Err(StorageError::Unavailable)));
    }

    #[test]
    fn test_backend_failure_surfaces() {
        let backend = MemoryBackend::new();
        let store = LeaseStore::new(Box::new(backend.clone()));
        backend.set_available(false);
        assert!(matches!(store.read(KEY), Err(StorageError::Backend(_))));
        backend.set_available(true);
        assert!(store.read(KEY).is_ok());
    }
}
