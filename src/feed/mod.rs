//! Feed retrieval and normalization.
//!
//! - [`fetcher`] - bounded HTTP retrieval behind the [`FeedFetcher`] trait
//! - [`parser`] - RSS/Atom parsing via `feed-rs` into a [`FeedDocument`]
//! - [`extract`] - configurable custom-field extraction (`content:encoded`,
//!   `media:content`, ...) run alongside the parser
//! - [`normalizer`] - maps a [`RawEntry`] to a canonical [`RssItem`](crate::model::RssItem)
//!
//! # Example
//!
//! ```ignore
//! let fetcher = HttpFetcher::new(&config)?;
//! let document = fetcher.fetch(&source.url, config.rss()).await?;
//! for entry in &document.entries {
//!     let normalized = normalize(entry, &source.id, &config.normalize_limits())?;
//! }
//! ```

mod document;
pub mod extract;
pub mod fetcher;
pub mod normalizer;
pub mod parser;

pub use document::{FeedDocument, RawEntry};
pub use extract::{default_extraction_rules, fields, ExtractionRule};
pub use fetcher::{FeedFetcher, FetchError, FetchErrorKind, HttpFetcher};
pub use normalizer::{item_id, normalize, IdentitySeed, NormalizeError, NormalizeLimits, Normalized};
pub use parser::{parse_document, ParseError};
