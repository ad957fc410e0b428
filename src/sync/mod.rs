//! Sync cycles: fetch every selected source, normalize its entries and merge
//! them into the item store.
//!
//! A cycle never fails as a whole. Each source ends with its own
//! [`SourceOutcome`], and one source timing out or returning garbage has no
//! effect on the others.

mod merge;
mod reconciler;
mod report;

pub use merge::{merge_items, MergeCounts};
pub use reconciler::{ProgressSender, Reconciler, SyncCancel, SyncSettings};
pub use report::{FailureReason, SkipReason, SourceOutcome, SourceReport, SyncReport, SyncState};
