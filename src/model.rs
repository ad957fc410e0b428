use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Sources
// ============================================================================

/// A configured feed endpoint.
///
/// Serialized with the camelCase field names of the `sources` collection
/// (`isSubscribed`, `type`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RssSource {
    /// Opaque id assigned by the registry on creation. Never changes.
    pub id: String,
    pub name: String,
    /// Dialect hint such as "rss" or "atom". Advisory only.
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    /// Only subscribed sources take part in sync cycles.
    #[serde(default)]
    pub is_subscribed: bool,
}

/// Input for [`Registry::add`](crate::registry::Registry::add).
///
/// Carries no id; the registry generates one. New sources start unsubscribed.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub kind: String,
    pub url: String,
}

impl NewSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            url: url.into(),
        }
    }
}

// ============================================================================
// Items
// ============================================================================

/// A normalized article as stored in the `items` collection.
///
/// `id` is derived from the source id and the entry's identity seed, so the
/// same article maps to the same record across sync cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RssItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub description: String,
    /// ISO-8601 / RFC 2822 date as published by the feed, or empty.
    #[serde(default)]
    pub pub_date: String,
    /// Foreign key into the registry. Not enforced; orphans are kept.
    pub source_id: String,
    /// Media enclosure URL (`media:content`, `<enclosure>`), when the feed has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<String>,
    /// Set when `description` was cut at the content ceiling.
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,
    /// Values of custom extraction rules, keyed by field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Read-side filter for [`FeedService::list_items`](crate::service::FeedService::list_items).
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub source_id: Option<String>,
    /// Keep only items whose source is currently subscribed.
    pub subscribed_only: bool,
}

impl ItemFilter {
    pub fn source(source_id: impl Into<String>) -> Self {
        Self {
            source_id: Some(source_id.into()),
            subscribed_only: false,
        }
    }

    pub fn subscribed() -> Self {
        Self {
            source_id: None,
            subscribed_only: true,
        }
    }
}
