use std::collections::BTreeMap;

/// A parsed feed, independent of its dialect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: Option<String>,
    /// Entries in the order the feed declares them.
    pub entries: Vec<RawEntry>,
}

/// One feed entry with every field its dialect exposed.
///
/// A superset shape: the normalizer picks among the content and identity
/// variants by priority, so nothing here is resolved yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: Option<String>,
    /// All `<link>` hrefs, first is the primary one.
    pub links: Vec<String>,
    /// RSS `<description>` / Atom `<summary>`.
    pub description: Option<String>,
    /// Atom `<content>` or whatever body the parser found.
    pub content: Option<String>,
    /// RSS `content:encoded`, via the extraction table.
    pub content_encoded: Option<String>,
    pub enclosure_url: Option<String>,
    /// Feed-provided guid (RSS `<guid>`, Atom `<id>`). Never synthesized.
    pub guid: Option<String>,
    /// Publication date as RFC 3339, or the raw string when unparsed.
    pub published: Option<String>,
    /// Extraction-table fields with no dedicated slot, keyed by field name.
    pub extra: BTreeMap<String, String>,
}

impl RawEntry {
    /// First link that is not blank.
    pub fn primary_link(&self) -> Option<&str> {
        self.links
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
    }
}
