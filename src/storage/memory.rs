use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::types::{Collection, StorageError, Store};

/// Process-local store. Snapshots are kept as JSON text so encoding behaves
/// exactly as it does against the durable store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: Mutex<HashMap<Collection, String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: while set, every read and write fails with
    /// [`StorageError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn read(&self, collection: Collection) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        Ok(snapshots.get(&collection).cloned())
    }

    async fn write(&self, collection: Collection, snapshot: String) -> Result<(), StorageError> {
        self.check_available()?;
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".into()))?;
        snapshots.insert(collection, snapshot);
        Ok(())
    }
}
