//! Source Registry: CRUD over the `sources` collection.
//!
//! Every mutation is one read-modify-write of the whole collection under the
//! sources lock. Nothing here touches the network, and the sync path never
//! writes sources.
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{NewSource, RssSource};
use crate::storage::{read_collection, write_collection, Collection, CollectionLocks, StorageError, Store};
use crate::util::{validate_url, UrlPolicy};

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Bad input to a mutation. Not retried.
    #[error("Invalid source: {0}")]
    Validation(String),
    #[error("Source not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct Registry {
    store: Arc<dyn Store>,
    locks: Arc<CollectionLocks>,
    policy: UrlPolicy,
}

impl Registry {
    pub fn new(store: Arc<dyn Store>, locks: Arc<CollectionLocks>, policy: UrlPolicy) -> Self {
        Self {
            store,
            locks,
            policy,
        }
    }

    /// All sources in insertion order.
    pub async fn list(&self) -> Result<Vec<RssSource>, RegistryError> {
        Ok(read_collection(self.store.as_ref(), Collection::Sources).await?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<RssSource>, RegistryError> {
        Ok(self.list().await?.into_iter().find(|s| s.id == id))
    }

    /// Validate and append a new, unsubscribed source with a fresh id.
    pub async fn add(&self, source: NewSource) -> Result<RssSource, RegistryError> {
        let (name, url) = self.validate(&source.name, &source.url)?;
        let created = RssSource {
            id: Uuid::new_v4().to_string(),
            name,
            kind: source.kind.trim().to_string(),
            url,
            is_subscribed: false,
        };

        let record = created.clone();
        self.mutate(move |sources| {
            sources.push(record);
            Ok(true)
        })
        .await?;

        tracing::info!(id = %created.id, url = %created.url, "Source added");
        Ok(created)
    }

    /// Replace the record whose id matches `source.id`.
    pub async fn update(&self, source: RssSource) -> Result<RssSource, RegistryError> {
        let (name, url) = self.validate(&source.name, &source.url)?;
        let updated = RssSource {
            name,
            url,
            ..source
        };

        let record = updated.clone();
        self.mutate(move |sources| {
            let slot = sources
                .iter_mut()
                .find(|s| s.id == record.id)
                .ok_or_else(|| RegistryError::NotFound(record.id.clone()))?;
            *slot = record;
            Ok(true)
        })
        .await?;

        tracing::debug!(id = %updated.id, "Source updated");
        Ok(updated)
    }

    /// Remove a source. Returns whether it existed; an unknown id is not an error.
    ///
    /// Items of the source are left in place.
    pub async fn delete(&self, id: &str) -> Result<bool, RegistryError> {
        let removed = self
            .mutate(|sources| {
                let before = sources.len();
                sources.retain(|s| s.id != id);
                Ok(sources.len() != before)
            })
            .await?;

        if removed {
            tracing::info!(id = %id, "Source deleted");
        }
        Ok(removed)
    }

    pub async fn set_subscribed(&self, id: &str, subscribed: bool) -> Result<RssSource, RegistryError> {
        let mut changed = None;
        self.mutate(|sources| {
            let source = sources
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            source.is_subscribed = subscribed;
            changed = Some(source.clone());
            Ok(true)
        })
        .await?;

        tracing::debug!(id = %id, subscribed = subscribed, "Subscription changed");
        changed.ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    fn validate(&self, name: &str, url: &str) -> Result<(String, String), RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::Validation("name must not be empty".to_string()));
        }
        let url = url.trim();
        validate_url(url, self.policy).map_err(|e| RegistryError::Validation(e.to_string()))?;
        Ok((name.to_string(), url.to_string()))
    }

    /// Read, apply `f`, write back. `f` returns whether it changed anything;
    /// nothing is written if it fails or reports no change. Returns that flag.
    async fn mutate<F>(&self, f: F) -> Result<bool, RegistryError>
    where
        F: FnOnce(&mut Vec<RssSource>) -> Result<bool, RegistryError>,
    {
        let _guard = self.locks.lock(Collection::Sources).await;
        let mut sources: Vec<RssSource> = read_collection(self.store.as_ref(), Collection::Sources).await?;
        if !f(&mut sources)? {
            return Ok(false);
        }
        write_collection(self.store.as_ref(), Collection::Sources, &sources).await?;
        Ok(true)
    }
}
