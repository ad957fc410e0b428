use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Persistence failures. Fatal to the operation that hit them.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The medium could not be reached (closed pool, poisoned lock, simulated outage)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A snapshot could not be encoded or decoded as JSON
    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration failed when opening the database
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ============================================================================
// Collections
// ============================================================================

/// The two persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Sources,
    Items,
}

impl Collection {
    /// Storage key of the collection.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Sources => "sources",
            Collection::Items => "items",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Store
// ============================================================================

/// Durable keyed storage for whole collections.
///
/// A snapshot is the JSON text of the entire collection. `write` replaces the
/// stored snapshot atomically: readers observe either the old or the new
/// snapshot, never a mix. The store does not serialize concurrent writers;
/// that is the job of [`CollectionLocks`](super::CollectionLocks).
#[async_trait]
pub trait Store: Send + Sync {
    /// Current snapshot, or `None` if the collection was never written.
    async fn read(&self, collection: Collection) -> Result<Option<String>, StorageError>;

    /// Replace the whole collection with `snapshot`.
    async fn write(&self, collection: Collection, snapshot: String) -> Result<(), StorageError>;
}
