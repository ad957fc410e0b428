//! Whole-collection snapshot persistence.
//!
//! State lives in two named collections, `sources` and `items`, each an
//! ordered JSON array. A [`Store`] only knows how to read and atomically
//! replace a collection; callers do read-modify-write under the matching
//! lock from [`CollectionLocks`].
//!
//! - [`MemoryStore`] - process-local, for tests and ephemeral runs
//! - [`SqliteStore`] - durable, one row per collection

mod collections;
mod memory;
mod schema;
mod types;

pub use collections::{read_collection, write_collection, CollectionLocks};
pub use memory::MemoryStore;
pub use schema::SqliteStore;
pub use types::{Collection, StorageError, Store};
