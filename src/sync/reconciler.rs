use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::merge::{merge_items, MergeCounts};
use super::report::{FailureReason, SkipReason, SourceOutcome, SourceReport, SyncReport, SyncState};
use crate::config::{Config, RssConfig};
use crate::feed::{normalize, FeedDocument, FeedFetcher, FetchError, NormalizeLimits};
use crate::model::{RssItem, RssSource};
use crate::storage::{read_collection, write_collection, Collection, CollectionLocks, StorageError, Store};

/// Channel for `(completed, total)` progress updates during a cycle.
pub type ProgressSender = mpsc::Sender<(usize, usize)>;

/// Knobs the reconciler reads at cycle time.
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub rss: RssConfig,
    pub limits: NormalizeLimits,
    pub max_concurrent_fetches: usize,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rss: config.rss(),
            limits: config.normalize_limits(),
            max_concurrent_fetches: config.max_concurrent_fetches,
        }
    }
}

impl SyncSettings {
    /// Worker-pool size for a cycle over `sources` sources: one per source,
    /// capped by `max_concurrent_fetches` and never zero.
    pub fn fetch_concurrency(&self, sources: usize) -> usize {
        sources.min(self.max_concurrent_fetches).max(1)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Cancels an in-flight cycle.
///
/// Cancelling stops new fetches (including retries) from being issued.
/// Fetches already in flight run to completion or to their own deadline, and
/// sources already merged stay merged.
#[derive(Debug, Clone, Default)]
pub struct SyncCancel(Arc<AtomicBool>);

impl SyncCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives fetch → normalize → merge for a set of sources.
///
/// Fetch and normalize run concurrently with no lock held. Every merge is a
/// read-modify-write of the whole `items` collection under the items lock,
/// so concurrent sources cannot clobber each other's inserts.
pub struct Reconciler {
    store: Arc<dyn Store>,
    locks: Arc<CollectionLocks>,
    fetcher: Arc<dyn FeedFetcher>,
    settings: SyncSettings,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        locks: Arc<CollectionLocks>,
        fetcher: Arc<dyn FeedFetcher>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            locks,
            fetcher,
            settings,
        }
    }

    /// Run one cycle over a point-in-time registry snapshot.
    ///
    /// With `requested = None` every source is considered; unsubscribed ones
    /// are reported as skipped. With `Some(ids)` only those ids are reported,
    /// and ids missing from the snapshot are reported as unknown.
    ///
    /// Never fails: every per-source problem becomes a [`SourceOutcome`].
    /// Reports follow snapshot order regardless of completion order.
    pub async fn sync(
        &self,
        snapshot: &[RssSource],
        requested: Option<&[String]>,
        cancel: &SyncCancel,
        progress: Option<&ProgressSender>,
    ) -> SyncReport {
        let wanted: Option<HashSet<&str>> =
            requested.map(|ids| ids.iter().map(String::as_str).collect());

        let mut slots: Vec<Option<SourceReport>> = vec![None; snapshot.len()];
        let mut candidates = Vec::new();
        for (index, source) in snapshot.iter().enumerate() {
            if wanted.as_ref().is_some_and(|w| !w.contains(source.id.as_str())) {
                continue;
            }
            if source.is_subscribed {
                candidates.push((index, source));
            } else {
                slots[index] = Some(report_for(source, SourceOutcome::Skipped {
                    reason: SkipReason::NotSubscribed,
                }));
            }
        }

        let total = candidates.len();
        let concurrency = self.settings.fetch_concurrency(total);
        let completed = AtomicUsize::new(0);
        let completed = &completed;

        tracing::info!(sources = total, concurrency = concurrency, "Starting sync cycle");

        let results: Vec<(usize, SourceReport)> = stream::iter(candidates)
            .map(|(index, source)| async move {
                let outcome = if cancel.is_cancelled() {
                    tracing::debug!(source_id = %source.id, state = %SyncState::Pending, "Cycle cancelled, source not fetched");
                    SourceOutcome::Skipped {
                        reason: SkipReason::Cancelled,
                    }
                } else {
                    self.sync_source(source, cancel).await
                };

                let done = completed.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                if let Some(tx) = progress {
                    if let Err(e) = tx.send((done, total)).await {
                        tracing::warn!(error = %e, done = done, total = total, "Progress channel send failed (receiver dropped)");
                    }
                }

                (index, report_for(source, outcome))
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (index, report) in results {
            slots[index] = Some(report);
        }
        let mut sources: Vec<SourceReport> = slots.into_iter().flatten().collect();

        if let Some(ids) = requested {
            let known: HashSet<&str> = snapshot.iter().map(|s| s.id.as_str()).collect();
            let mut seen = HashSet::new();
            for id in ids {
                if !known.contains(id.as_str()) && seen.insert(id.as_str()) {
                    sources.push(SourceReport::new(
                        id.clone(),
                        String::new(),
                        SourceOutcome::Skipped {
                            reason: SkipReason::UnknownSource,
                        },
                    ));
                }
            }
        }

        let report = SyncReport { sources };
        let (inserted, updated) = report.totals();
        tracing::info!(
            sources = report.sources.len(),
            inserted = inserted,
            updated = updated,
            failed = report.failed(),
            cancelled = cancel.is_cancelled(),
            "Sync cycle finished"
        );
        report
    }

    async fn sync_source(&self, source: &RssSource, cancel: &SyncCancel) -> SourceOutcome {
        transition(source, SyncState::Fetching);
        let (document, attempts) = match self.fetch_with_retry(source, cancel).await {
            Ok(fetched) => fetched,
            Err((err, attempts)) => {
                transition(source, SyncState::Failed);
                tracing::warn!(
                    source_id = %source.id,
                    url = %source.url,
                    kind = %err.kind(),
                    attempts = attempts,
                    error = %err,
                    "Feed fetch failed"
                );
                return SourceOutcome::Failed {
                    reason: FailureReason::Fetch(err.kind()),
                    attempts,
                };
            }
        };

        transition(source, SyncState::Normalizing);
        let (items, skipped) = self.normalize_all(source, &document);

        transition(source, SyncState::Merging);
        match self.merge(items).await {
            Ok(MergeCounts { inserted, updated }) => {
                transition(source, SyncState::Done);
                tracing::info!(
                    source_id = %source.id,
                    inserted = inserted,
                    updated = updated,
                    skipped = skipped,
                    "Source synced"
                );
                SourceOutcome::Ok {
                    inserted,
                    updated,
                    skipped,
                }
            }
            Err(err) => {
                transition(source, SyncState::Failed);
                tracing::warn!(source_id = %source.id, error = %err, "Merging items failed");
                SourceOutcome::Failed {
                    reason: FailureReason::Storage(err.to_string()),
                    attempts,
                }
            }
        }
    }

    /// One attempt, plus one immediate retry for transient failures.
    async fn fetch_with_retry(
        &self,
        source: &RssSource,
        cancel: &SyncCancel,
    ) -> Result<(FeedDocument, u32), (FetchError, u32)> {
        match self.fetcher.fetch(&source.url, self.settings.rss).await {
            Ok(document) => return Ok((document, 1)),
            Err(err) if err.kind().is_transient() && !cancel.is_cancelled() => {
                tracing::info!(
                    source_id = %source.id,
                    kind = %err.kind(),
                    "Transient fetch failure, retrying once"
                );
            }
            Err(err) => return Err((err, 1)),
        }

        self.fetcher
            .fetch(&source.url, self.settings.rss)
            .await
            .map(|document| (document, 2))
            .map_err(|err| (err, 2))
    }

    /// Normalize every entry in feed order. Returns the items and how many
    /// entries were dropped.
    fn normalize_all(&self, source: &RssSource, document: &FeedDocument) -> (Vec<RssItem>, usize) {
        let mut items = Vec::with_capacity(document.entries.len());
        let mut skipped = 0;
        for entry in &document.entries {
            match normalize(entry, &source.id, &self.settings.limits) {
                Ok(normalized) => items.push(normalized.item),
                Err(reason) => {
                    skipped += 1;
                    tracing::debug!(source_id = %source.id, reason = %reason, "Entry dropped");
                }
            }
        }
        (items, skipped)
    }

    async fn merge(&self, items: Vec<RssItem>) -> Result<MergeCounts, StorageError> {
        if items.is_empty() {
            return Ok(MergeCounts::default());
        }

        let _guard = self.locks.lock(Collection::Items).await;
        let mut stored: Vec<RssItem> = read_collection(self.store.as_ref(), Collection::Items).await?;
        let counts = merge_items(&mut stored, items);
        write_collection(self.store.as_ref(), Collection::Items, &stored).await?;
        Ok(counts)
    }
}

fn transition(source: &RssSource, state: SyncState) {
    tracing::debug!(source_id = %source.id, state = %state, "Sync state");
}

fn report_for(source: &RssSource, outcome: SourceOutcome) -> SourceReport {
    SourceReport::new(source.id.clone(), source.name.clone(), outcome)
}
