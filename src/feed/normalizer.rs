//! Maps raw feed entries to the canonical [`RssItem`] shape.
//!
//! Field resolution (first non-empty wins):
//!
//! | item field    | candidates                                   |
//! |---------------|----------------------------------------------|
//! | `description` | `content_encoded`, `content`, `description`  |
//! | identity seed | `guid`, primary link, title                  |
//! | `link`        | primary link                                 |
//! | `pub_date`    | `published`, only if it parses as a date     |
//!
//! The item id is a SHA-256 over the source id and the identity seed, so
//! the same article yields the same id on every cycle and two sources can
//! never collide.
use chrono::DateTime;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::document::RawEntry;
use crate::model::RssItem;
use crate::util::{strip_control_chars, truncate_chars};

/// Why an entry was dropped instead of becoming an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// No guid, no link, and title identity unavailable or empty
    #[error("entry has no usable identity")]
    MissingIdentity,
    /// Nothing left to show: no title, no link, no content
    #[error("entry is empty after normalization")]
    EmptyContent,
}

/// Which field the item id was derived from.
///
/// `Title` is a weak signal: titles are not guaranteed unique, so two
/// different articles with the same title collapse into one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySeed {
    Guid,
    Link,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeLimits {
    /// Sanity ceiling on `description`, in characters.
    pub max_content_chars: usize,
    /// Allow the title as last-resort identity seed.
    pub allow_title_identity: bool,
}

impl NormalizeLimits {
    pub const DEFAULT_MAX_CONTENT_CHARS: usize = 100_000;
}

impl Default for NormalizeLimits {
    fn default() -> Self {
        Self {
            max_content_chars: Self::DEFAULT_MAX_CONTENT_CHARS,
            allow_title_identity: true,
        }
    }
}

/// A normalized item plus the quality signal of its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub item: RssItem,
    pub seed: IdentitySeed,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Stable item id for `seed` within `source_id`.
pub fn item_id(source_id: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    // Unit separator keeps ("ab", "c") and ("a", "bc") apart
    hasher.update([0x1f]);
    hasher.update(seed.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn is_parseable_date(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok() || DateTime::parse_from_rfc2822(value).is_ok()
}

/// Normalize one raw entry for `source_id`. Pure and deterministic.
pub fn normalize(
    raw: &RawEntry,
    source_id: &str,
    limits: &NormalizeLimits,
) -> Result<Normalized, NormalizeError> {
    let title = raw
        .title
        .as_deref()
        .map(|t| strip_control_chars(t).trim().to_string())
        .unwrap_or_default();
    let link = raw.primary_link().unwrap_or_default().to_string();

    let (seed, seed_value) = if let Some(guid) = non_empty(raw.guid.as_deref()) {
        (IdentitySeed::Guid, guid)
    } else if !link.is_empty() {
        (IdentitySeed::Link, link.as_str())
    } else if limits.allow_title_identity && !title.is_empty() {
        (IdentitySeed::Title, title.as_str())
    } else {
        return Err(NormalizeError::MissingIdentity);
    };
    let id = item_id(source_id, seed_value);

    let content = non_empty(raw.content_encoded.as_deref())
        .or_else(|| non_empty(raw.content.as_deref()))
        .or_else(|| non_empty(raw.description.as_deref()))
        .unwrap_or_default();
    let (description, truncated) = truncate_chars(content, limits.max_content_chars);
    let description = description.into_owned();

    if title.is_empty() && link.is_empty() && description.trim().is_empty() {
        return Err(NormalizeError::EmptyContent);
    }

    let pub_date = non_empty(raw.published.as_deref())
        .filter(|d| is_parseable_date(d))
        .unwrap_or_default()
        .to_string();

    if seed == IdentitySeed::Title {
        tracing::debug!(source_id = %source_id, title = %title, "Entry identified by title only");
    }
    if truncated {
        tracing::debug!(
            source_id = %source_id,
            id = %id,
            max_chars = limits.max_content_chars,
            "Item content truncated"
        );
    }

    Ok(Normalized {
        item: RssItem {
            id,
            title,
            link,
            description,
            pub_date,
            source_id: source_id.to_string(),
            enclosure: non_empty(raw.enclosure_url.as_deref()).map(str::to_string),
            truncated,
            extra: raw.extra.clone(),
        },
        seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn entry() -> RawEntry {
        RawEntry {
            title: Some("Title".into()),
            links: vec!["https://example.com/a".into()],
            description: Some("desc".into()),
            content: Some("content".into()),
            content_encoded: Some("encoded".into()),
            enclosure_url: Some("https://cdn.example.com/a.jpg".into()),
            guid: Some("guid-a".into()),
            published: Some("2024-01-02T10:00:00+00:00".into()),
            ..RawEntry::default()
        }
    }

    fn limits() -> NormalizeLimits {
        NormalizeLimits::default()
    }

    #[test]
    fn test_content_priority() {
        let mut raw = entry();
        assert_eq!(normalize(&raw, "s", &limits()).unwrap().item.description, "encoded");

        raw.content_encoded = Some("   ".into());
        assert_eq!(normalize(&raw, "s", &limits()).unwrap().item.description, "content");

        raw.content = None;
        assert_eq!(normalize(&raw, "s", &limits()).unwrap().item.description, "desc");

        raw.description = None;
        assert_eq!(normalize(&raw, "s", &limits()).unwrap().item.description, "");
    }

    #[test]
    fn test_identity_priority() {
        let mut raw = entry();
        let by_guid = normalize(&raw, "s", &limits()).unwrap();
        assert_eq!(by_guid.seed, IdentitySeed::Guid);
        assert_eq!(by_guid.item.id, item_id("s", "guid-a"));

        raw.guid = None;
        let by_link = normalize(&raw, "s", &limits()).unwrap();
        assert_eq!(by_link.seed, IdentitySeed::Link);
        assert_eq!(by_link.item.id, item_id("s", "https://example.com/a"));

        raw.links.clear();
        let by_title = normalize(&raw, "s", &limits()).unwrap();
        assert_eq!(by_title.seed, IdentitySeed::Title);
        assert_eq!(by_title.item.id, item_id("s", "Title"));
    }

    #[test]
    fn test_title_identity_can_be_disabled() {
        let raw = RawEntry {
            title: Some("Only a title".into()),
            ..RawEntry::default()
        };
        let strict = NormalizeLimits {
            allow_title_identity: false,
            ..limits()
        };
        assert_eq!(normalize(&raw, "s", &strict), Err(NormalizeError::MissingIdentity));
        assert!(normalize(&raw, "s", &limits()).is_ok());
    }

    #[test]
    fn test_no_identity_at_all() {
        let raw = RawEntry {
            description: Some("orphan text".into()),
            ..RawEntry::default()
        };
        assert_eq!(normalize(&raw, "s", &limits()), Err(NormalizeError::MissingIdentity));
    }

    #[test]
    fn test_guid_only_entry_is_empty() {
        let raw = RawEntry {
            guid: Some("g".into()),
            ..RawEntry::default()
        };
        assert_eq!(normalize(&raw, "s", &limits()), Err(NormalizeError::EmptyContent));
    }

    #[test]
    fn test_same_seed_different_source_differs() {
        assert_ne!(item_id("a", "x"), item_id("b", "x"));
        assert_ne!(item_id("ab", "c"), item_id("a", "bc"));
    }

    #[test]
    fn test_pub_date_passed_verbatim_when_parseable() {
        let mut raw = entry();
        raw.published = Some("Mon, 02 Jan 2006 15:04:05 GMT".into());
        assert_eq!(
            normalize(&raw, "s", &limits()).unwrap().item.pub_date,
            "Mon, 02 Jan 2006 15:04:05 GMT"
        );

        raw.published = Some("last tuesday".into());
        assert_eq!(normalize(&raw, "s", &limits()).unwrap().item.pub_date, "");

        raw.published = None;
        assert_eq!(normalize(&raw, "s", &limits()).unwrap().item.pub_date, "");
    }

    #[test]
    fn test_truncation_is_marked_not_fatal() {
        let mut raw = entry();
        raw.content_encoded = Some("x".repeat(50));
        let capped = NormalizeLimits {
            max_content_chars: 10,
            ..limits()
        };
        let item = normalize(&raw, "s", &capped).unwrap().item;
        assert_eq!(item.description, "x".repeat(10));
        assert!(item.truncated);

        let item = normalize(&entry(), "s", &capped).unwrap().item;
        assert!(!item.truncated);
    }

    #[test]
    fn test_title_control_chars_stripped() {
        let mut raw = entry();
        raw.title = Some("  Bad\x1b title\x07 ".into());
        assert_eq!(normalize(&raw, "s", &limits()).unwrap().item.title, "Bad title");
    }

    #[test]
    fn test_enclosure_and_source_carried() {
        let item = normalize(&entry(), "source-1", &limits()).unwrap().item;
        assert_eq!(item.source_id, "source-1");
        assert_eq!(item.link, "https://example.com/a");
        assert_eq!(item.enclosure.as_deref(), Some("https://cdn.example.com/a.jpg"));
    }

    #[test]
    fn test_custom_fields_carried() {
        let mut raw = entry();
        raw.extra.insert("dc_creator".into(), "Jane".into());
        let item = normalize(&raw, "s", &limits()).unwrap().item;
        assert_eq!(item.extra.get("dc_creator").map(String::as_str), Some("Jane"));
    }

    proptest! {
        #[test]
        fn prop_identity_is_stable(guid in "[a-z0-9:/.-]{1,40}", title in ".{0,40}", source in "[a-f0-9-]{1,36}") {
            let raw = RawEntry {
                guid: Some(guid),
                title: Some(title),
                links: vec!["https://example.com/x".into()],
                ..RawEntry::default()
            };
            let first = normalize(&raw, &source, &limits()).unwrap();
            let second = normalize(&raw.clone(), &source, &limits()).unwrap();
            prop_assert_eq!(&first.item.id, &second.item.id);
            prop_assert_eq!(first.item, second.item);
        }
    }
}
