//! Feed synchronization engine.
//!
//! Keeps a registry of RSS/Atom sources, fetches them under a bounded
//! resource budget, normalizes entries across feed dialects and merges them
//! into a deduplicated item store.
//!
//! - [`registry`] - source CRUD over the `sources` collection
//! - [`feed`] - HTTP fetching, dialect parsing and item normalization
//! - [`sync`] - per-cycle reconciliation with retry and partial-failure isolation
//! - [`storage`] - whole-collection snapshot persistence
//! - [`service`] - the read/write surface presentation layers call into

pub mod config;
pub mod feed;
pub mod model;
pub mod registry;
pub mod service;
pub mod storage;
pub mod sync;
pub mod util;

pub use config::{Config, RssConfig};
pub use model::{ItemFilter, NewSource, RssItem, RssSource};
pub use service::FeedService;
