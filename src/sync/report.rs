use serde::Serialize;
use std::fmt;

use crate::feed::FetchErrorKind;

/// Lifecycle of one source within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    Fetching,
    Normalizing,
    Merging,
    Done,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncState::Pending => "pending",
            SyncState::Fetching => "fetching",
            SyncState::Normalizing => "normalizing",
            SyncState::Merging => "merging",
            SyncState::Done => "done",
            SyncState::Failed => "failed",
        })
    }
}

/// Why a source ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    Fetch(FetchErrorKind),
    /// The item collection could not be read or written.
    Storage(String),
}

/// Why a source was not synced at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotSubscribed,
    /// Requested id is not in the registry snapshot.
    UnknownSource,
    /// The cycle was cancelled before this source was fetched.
    Cancelled,
}

/// Final outcome of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Ok {
        inserted: usize,
        updated: usize,
        /// Entries dropped by the normalizer.
        skipped: usize,
    },
    Failed {
        reason: FailureReason,
        /// Fetch attempts made, including the retry.
        attempts: u32,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl SourceOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, SourceOutcome::Ok { .. })
    }

    /// `(inserted, updated)` for a successful source.
    pub fn counts(&self) -> Option<(usize, usize)> {
        match self {
            SourceOutcome::Ok {
                inserted, updated, ..
            } => Some((*inserted, *updated)),
            _ => None,
        }
    }

    /// State the source was left in. A skipped source never left `Pending`.
    pub fn state(&self) -> SyncState {
        match self {
            SourceOutcome::Ok { .. } => SyncState::Done,
            SourceOutcome::Failed { .. } => SyncState::Failed,
            SourceOutcome::Skipped { .. } => SyncState::Pending,
        }
    }

    pub fn fetch_failure(&self) -> Option<FetchErrorKind> {
        match self {
            SourceOutcome::Failed {
                reason: FailureReason::Fetch(kind),
                ..
            } => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOutcome::Ok {
                inserted,
                updated,
                skipped,
            } => {
                write!(f, "ok({}, {})", inserted, updated)?;
                if *skipped > 0 {
                    write!(f, " [{} dropped]", skipped)?;
                }
                Ok(())
            }
            SourceOutcome::Failed { reason, attempts } => match reason {
                FailureReason::Fetch(kind) => write!(f, "failed({}) after {} attempt(s)", kind, attempts),
                FailureReason::Storage(msg) => write!(f, "failed(storage): {}", msg),
            },
            SourceOutcome::Skipped { reason } => {
                let reason = match reason {
                    SkipReason::NotSubscribed => "not subscribed",
                    SkipReason::UnknownSource => "unknown source",
                    SkipReason::Cancelled => "cancelled",
                };
                write!(f, "skipped({})", reason)
            }
        }
    }
}

/// Outcome for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub source_id: String,
    pub name: String,
    /// Last state reached in the cycle.
    pub state: SyncState,
    pub outcome: SourceOutcome,
}

impl SourceReport {
    pub fn new(source_id: impl Into<String>, name: impl Into<String>, outcome: SourceOutcome) -> Self {
        Self {
            source_id: source_id.into(),
            name: name.into(),
            state: outcome.state(),
            outcome,
        }
    }
}

/// Per-source result of a sync cycle, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub sources: Vec<SourceReport>,
}

impl SyncReport {
    pub fn outcome(&self, source_id: &str) -> Option<&SourceOutcome> {
        self.source(source_id).map(|r| &r.outcome)
    }

    pub fn source(&self, source_id: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|r| r.source_id == source_id)
    }

    /// Sum of `(inserted, updated)` over successful sources.
    pub fn totals(&self) -> (usize, usize) {
        self.sources
            .iter()
            .filter_map(|r| r.outcome.counts())
            .fold((0, 0), |(i, u), (di, du)| (i + di, u + du))
    }

    pub fn failed(&self) -> usize {
        self.sources
            .iter()
            .filter(|r| matches!(r.outcome, SourceOutcome::Failed { .. }))
            .count()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.sources {
            writeln!(f, "{} ({}): {}", report.name, report.source_id, report.outcome)?;
        }
        Ok(())
    }
}
