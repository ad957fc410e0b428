use std::collections::{BTreeMap, HashMap};

use feed_rs::parser;
use thiserror::Error;

use super::document::{FeedDocument, RawEntry};
use super::extract::{extract_fields, fields, ExtractionRule};

/// The body is not a feed `feed-rs` recognizes.
#[derive(Debug, Error)]
#[error("Feed parse error: {0}")]
pub struct ParseError(#[from] parser::ParseFeedError);

/// Parse a feed body into a [`FeedDocument`].
///
/// `feed-rs` supplies the dialect-independent fields (title, links, summary,
/// content, dates). The extraction table is run over the same bytes and its
/// per-entry results are joined by position. If the two passes disagree on
/// the number of entries the join falls back to matching on the guid, so a
/// guid-bearing entry keeps its guid and only unmatched entries lose their
/// custom fields.
pub fn parse_document(bytes: &[u8], rules: &[ExtractionRule]) -> Result<FeedDocument, ParseError> {
    let feed = parser::parse(bytes)?;

    let extracted = match extract_fields(bytes, rules) {
        Ok(found) if found.len() == feed.entries.len() => found,
        Ok(found) => {
            tracing::warn!(
                parsed = feed.entries.len(),
                extracted = found.len(),
                "Entry count mismatch between parser and extraction table, joining on guid"
            );
            let ids: Vec<&str> = feed.entries.iter().map(|e| e.id.as_str()).collect();
            align_by_guid(&ids, found)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Custom field extraction failed, ignoring custom fields");
            Vec::new()
        }
    };
    let mut extracted = extracted.into_iter();

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let mut custom = extracted.next().unwrap_or_default();

            let media_url = entry
                .media
                .iter()
                .flat_map(|m| m.content.iter())
                .find_map(|c| c.url.as_ref().map(|u| u.to_string()));

            // Alternate links first; Blogger puts replies/edit links ahead of it
            let (mut links, others): (Vec<_>, Vec<_>) = entry
                .links
                .into_iter()
                .partition(|l| matches!(l.rel.as_deref(), None | Some("alternate")));
            links.extend(others);

            RawEntry {
                title: entry.title.map(|t| t.content),
                links: links.into_iter().map(|l| l.href).collect(),
                description: entry.summary.map(|s| s.content),
                content: entry.content.and_then(|c| c.body),
                content_encoded: custom.remove(fields::CONTENT_ENCODED),
                enclosure_url: custom.remove(fields::ENCLOSURE).or(media_url),
                guid: custom.remove(fields::GUID),
                published: entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.to_rfc3339()),
                extra: custom,
            }
        })
        .collect();

    Ok(FeedDocument {
        title: feed.title.map(|t| t.content),
        entries,
    })
}

/// Reorder extracted field maps to follow `ids`, matching each parser entry id
/// against an extracted guid. Entries without a match get an empty map. The
/// first extracted map wins when a guid repeats.
fn align_by_guid(ids: &[&str], extracted: Vec<BTreeMap<String, String>>) -> Vec<BTreeMap<String, String>> {
    let mut by_guid: HashMap<String, BTreeMap<String, String>> = HashMap::new();
    for found in extracted {
        let Some(guid) = found.get(fields::GUID).map(|g| g.trim().to_string()) else {
            continue;
        };
        if !guid.is_empty() {
            by_guid.entry(guid).or_insert(found);
        }
    }

    ids.iter()
        .map(|id| by_guid.remove(id.trim()).unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{default_extraction_rules, item_id, normalize, NormalizeLimits};
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel>
  <title>Example</title>
  <link>https://example.com</link>
  <description>Example feed</description>
  <item>
    <title>Hello</title>
    <link>https://example.com/hello</link>
    <guid>hello-guid</guid>
    <description>Short</description>
    <content:encoded><![CDATA[<p>Long form</p>]]></content:encoded>
    <pubDate>Mon, 02 Jan 2006 15:04:05 GMT</pubDate>
  </item>
  <item>
    <title>No guid</title>
    <link>https://example.com/no-guid</link>
  </item>
</channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>urn:feed</id>
  <title>Atom Example</title>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <id>urn:entry:1</id>
    <title>Entry</title>
    <link href="https://example.com/entry"/>
    <updated>2024-01-02T10:00:00Z</updated>
    <summary>Sum</summary>
    <content type="html">Body</content>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_fields() {
        let doc = parse_document(RSS.as_bytes(), &default_extraction_rules()).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Example"));
        assert_eq!(doc.entries.len(), 2);

        let first = &doc.entries[0];
        assert_eq!(first.title.as_deref(), Some("Hello"));
        assert_eq!(first.primary_link(), Some("https://example.com/hello"));
        assert_eq!(first.guid.as_deref(), Some("hello-guid"));
        assert_eq!(first.description.as_deref(), Some("Short"));
        assert_eq!(first.content_encoded.as_deref(), Some("<p>Long form</p>"));
        assert!(first.published.as_deref().unwrap().starts_with("2006-01-02T15:04:05"));

        // No <guid>: stays empty rather than taking a synthesized id
        assert_eq!(doc.entries[1].guid, None);
    }

    #[test]
    fn test_parse_atom_fields() {
        let doc = parse_document(ATOM.as_bytes(), &default_extraction_rules()).unwrap();
        let entry = &doc.entries[0];
        assert_eq!(entry.guid.as_deref(), Some("urn:entry:1"));
        assert_eq!(entry.description.as_deref(), Some("Sum"));
        assert_eq!(entry.content.as_deref(), Some("Body"));
        assert!(entry.published.as_deref().unwrap().starts_with("2024-01-02T10:00:00"));
    }

    #[test]
    fn test_entries_keep_document_order() {
        let doc = parse_document(RSS.as_bytes(), &default_extraction_rules()).unwrap();
        let titles: Vec<_> = doc.entries.iter().filter_map(|e| e.title.as_deref()).collect();
        assert_eq!(titles, vec!["Hello", "No guid"]);
    }

    #[test]
    fn test_empty_rules_leave_custom_fields_unset() {
        let doc = parse_document(RSS.as_bytes(), &[]).unwrap();
        assert_eq!(doc.entries[0].guid, None);
        assert_eq!(doc.entries[0].content_encoded, None);
    }

    #[test]
    fn test_alternate_link_comes_first() {
        let blogger = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>tag:blogger.com,1999:blog-1</id>
  <title>Blog</title>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <id>tag:blogger.com,1999:blog-1.post-7</id>
    <title>Post</title>
    <updated>2024-01-02T10:00:00Z</updated>
    <link rel="replies" type="text/html" href="https://blog.example.com/2024/01/post.html#comment-form"/>
    <link rel="edit" type="application/atom+xml" href="https://www.blogger.com/feeds/1/posts/default/7"/>
    <link rel="self" type="application/atom+xml" href="https://www.blogger.com/feeds/1/posts/default/7"/>
    <link rel="alternate" type="text/html" href="https://blog.example.com/2024/01/post.html"/>
  </entry>
</feed>"#;
        let doc = parse_document(blogger.as_bytes(), &default_extraction_rules()).unwrap();
        let entry = &doc.entries[0];
        assert_eq!(entry.primary_link(), Some("https://blog.example.com/2024/01/post.html"));
        assert_eq!(entry.links.len(), 4);
    }

    #[test]
    fn test_atom_source_element_keeps_entry_guids_distinct() {
        let planet = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>urn:planet</id>
  <title>Planet</title>
  <updated>2024-01-01T00:00:00Z</updated>
  <entry>
    <source><id>urn:upstream</id><title>Upstream</title></source>
    <id>urn:e1</id>
    <title>One</title>
    <updated>2024-01-02T10:00:00Z</updated>
  </entry>
  <entry>
    <source><id>urn:upstream</id><title>Upstream</title></source>
    <id>urn:e2</id>
    <title>Two</title>
    <updated>2024-01-03T10:00:00Z</updated>
  </entry>
</feed>"#;
        let doc = parse_document(planet.as_bytes(), &default_extraction_rules()).unwrap();
        let guids: Vec<_> = doc.entries.iter().map(|e| e.guid.as_deref()).collect();
        assert_eq!(guids, vec![Some("urn:e1"), Some("urn:e2")]);
    }

    #[test]
    fn test_trailing_empty_item_keeps_item_ids_stable() {
        let with_empty = RSS.replace("</channel>", "<item/></channel>");
        let limits = NormalizeLimits::default();
        let ids = |body: &str| -> Vec<String> {
            parse_document(body.as_bytes(), &default_extraction_rules())
                .unwrap()
                .entries
                .iter()
                .filter_map(|e| normalize(e, "src", &limits).ok())
                .map(|n| n.item.id)
                .collect()
        };

        let plain = ids(RSS);
        assert_eq!(plain.len(), 2);
        assert_eq!(ids(&with_empty), plain);
        assert_eq!(plain[0], item_id("src", "hello-guid"));
    }

    #[test]
    fn test_align_by_guid_on_count_mismatch() {
        let map = |guid: &str, extra: &str| -> BTreeMap<String, String> {
            BTreeMap::from([
                (fields::GUID.to_string(), guid.to_string()),
                ("x".to_string(), extra.to_string()),
            ])
        };
        let extracted = vec![
            BTreeMap::new(),
            map(" b ", "from-b"),
            map("a", "from-a"),
            map("a", "duplicate"),
        ];

        let aligned = align_by_guid(&["a", "synthesized", "b"], extracted);

        assert_eq!(aligned.len(), 3);
        assert_eq!(aligned[0].get("x").map(String::as_str), Some("from-a"));
        assert!(aligned[1].is_empty());
        assert_eq!(aligned[2].get("x").map(String::as_str), Some("from-b"));
    }

    #[test]
    fn test_not_a_feed_is_parse_error() {
        assert!(parse_document(b"<not valid xml", &default_extraction_rules()).is_err());
        assert!(parse_document(b"<html><body>hi</body></html>", &[]).is_err());
    }

    #[test]
    fn test_empty_channel_parses_to_no_entries() {
        let empty = r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#;
        let doc = parse_document(empty.as_bytes(), &default_extraction_rules()).unwrap();
        assert!(doc.entries.is_empty());
    }
}
