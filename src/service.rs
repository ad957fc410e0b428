//! The read/write surface a presentation layer calls into.
//!
//! Sources go through the [`Registry`], items are read straight from the
//! store, and `trigger_sync` hands a registry snapshot to the [`Reconciler`].
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::feed::FeedFetcher;
use crate::model::{ItemFilter, NewSource, RssItem, RssSource};
use crate::registry::{Registry, RegistryError};
use crate::storage::{read_collection, write_collection, Collection, CollectionLocks, StorageError, Store};
use crate::sync::{ProgressSender, Reconciler, SyncCancel, SyncReport, SyncSettings};

pub struct FeedService {
    store: Arc<dyn Store>,
    locks: Arc<CollectionLocks>,
    registry: Registry,
    reconciler: Reconciler,
}

impl FeedService {
    /// Wire registry and reconciler to one store and one set of collection
    /// locks.
    pub fn new(store: Arc<dyn Store>, fetcher: Arc<dyn FeedFetcher>, config: &Config) -> Self {
        let locks = Arc::new(CollectionLocks::new());
        let registry = Registry::new(store.clone(), locks.clone(), config.url_policy());
        let reconciler = Reconciler::new(
            store.clone(),
            locks.clone(),
            fetcher,
            SyncSettings::from_config(config),
        );
        Self {
            store,
            locks,
            registry,
            reconciler,
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn list_sources(&self) -> Result<Vec<RssSource>, RegistryError> {
        self.registry.list().await
    }

    /// Items in store order, optionally narrowed to one source and/or to
    /// sources that are currently subscribed. Orphaned items only show up
    /// without `subscribed_only`.
    pub async fn list_items(&self, filter: &ItemFilter) -> Result<Vec<RssItem>, StorageError> {
        let items: Vec<RssItem> = read_collection(self.store.as_ref(), Collection::Items).await?;

        let subscribed: Option<HashSet<String>> = if filter.subscribed_only {
            let sources: Vec<RssSource> = read_collection(self.store.as_ref(), Collection::Sources).await?;
            Some(
                sources
                    .into_iter()
                    .filter(|s| s.is_subscribed)
                    .map(|s| s.id)
                    .collect(),
            )
        } else {
            None
        };

        Ok(items
            .into_iter()
            .filter(|item| {
                filter
                    .source_id
                    .as_deref()
                    .is_none_or(|id| item.source_id == id)
            })
            .filter(|item| {
                subscribed
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&item.source_id))
            })
            .collect())
    }

    // ========================================================================
    // Source mutations
    // ========================================================================

    pub async fn add_source(&self, source: NewSource) -> Result<RssSource, RegistryError> {
        self.registry.add(source).await
    }

    pub async fn update_source(&self, source: RssSource) -> Result<RssSource, RegistryError> {
        self.registry.update(source).await
    }

    /// Remove a source and keep its items.
    pub async fn delete_source(&self, id: &str) -> Result<bool, RegistryError> {
        self.registry.delete(id).await
    }

    /// Remove a source together with every item it produced. Returns how many
    /// items were removed.
    ///
    /// Items are purged even when the source itself is already gone, so this
    /// also cleans up orphans.
    pub async fn delete_source_cascade(&self, id: &str) -> Result<usize, RegistryError> {
        self.registry.delete(id).await?;

        let _guard = self.locks.lock(Collection::Items).await;
        let mut items: Vec<RssItem> = read_collection(self.store.as_ref(), Collection::Items).await?;
        let before = items.len();
        items.retain(|item| item.source_id != id);
        let removed = before - items.len();
        if removed > 0 {
            write_collection(self.store.as_ref(), Collection::Items, &items).await?;
        }

        tracing::info!(id = %id, items = removed, "Source items purged");
        Ok(removed)
    }

    pub async fn set_subscribed(&self, id: &str, subscribed: bool) -> Result<RssSource, RegistryError> {
        self.registry.set_subscribed(id, subscribed).await
    }

    // ========================================================================
    // Item mutations
    // ========================================================================

    /// Delete one item. Returns whether it existed.
    pub async fn delete_item(&self, id: &str) -> Result<bool, StorageError> {
        let _guard = self.locks.lock(Collection::Items).await;
        let mut items: Vec<RssItem> = read_collection(self.store.as_ref(), Collection::Items).await?;
        let before = items.len();
        items.retain(|item| item.id != id);
        if items.len() == before {
            return Ok(false);
        }
        write_collection(self.store.as_ref(), Collection::Items, &items).await?;
        Ok(true)
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Run one cycle over all subscribed sources, or over `source_ids`.
    ///
    /// Per-source problems end up in the report. Only a failure to read the
    /// registry snapshot is returned as an error.
    pub async fn trigger_sync(&self, source_ids: Option<&[String]>) -> Result<SyncReport, RegistryError> {
        self.trigger_sync_with(source_ids, &SyncCancel::new(), None).await
    }

    /// [`trigger_sync`](Self::trigger_sync) with a cancel handle and an
    /// optional `(completed, total)` progress channel.
    pub async fn trigger_sync_with(
        &self,
        source_ids: Option<&[String]>,
        cancel: &SyncCancel,
        progress: Option<&ProgressSender>,
    ) -> Result<SyncReport, RegistryError> {
        let snapshot = self.registry.list().await?;
        Ok(self.reconciler.sync(&snapshot, source_ids, cancel, progress).await)
    }
}
