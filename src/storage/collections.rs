use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use super::types::{Collection, StorageError, Store};

/// Read a collection and decode it. A never-written collection is empty.
pub async fn read_collection<T: DeserializeOwned>(
    store: &dyn Store,
    collection: Collection,
) -> Result<Vec<T>, StorageError> {
    match store.read(collection).await? {
        Some(snapshot) if !snapshot.trim().is_empty() => Ok(serde_json::from_str(&snapshot)?),
        _ => Ok(Vec::new()),
    }
}

/// Encode `records` and replace the collection with them.
///
/// Encoding happens before the store is touched, so a serialization failure
/// leaves the stored snapshot as it was.
pub async fn write_collection<T: Serialize>(
    store: &dyn Store,
    collection: Collection,
    records: &[T],
) -> Result<(), StorageError> {
    let snapshot = serde_json::to_string(records)?;
    store.write(collection, snapshot).await
}

/// One async mutex per collection.
///
/// Every read-modify-write of a collection holds its guard for exactly that
/// sequence. Registry mutations and reconciler merges share one instance so
/// whole-collection replaces never clobber each other.
#[derive(Debug, Default)]
pub struct CollectionLocks {
    sources: Mutex<()>,
    items: Mutex<()>,
}

impl CollectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, collection: Collection) -> MutexGuard<'_, ()> {
        match collection {
            Collection::Sources => self.sources.lock().await,
            Collection::Items => self.items.lock().await,
        }
    }
}
