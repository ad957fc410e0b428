//! Configurable custom-field extraction.
//!
//! Dialects put useful data under namespaced tags the generic parser does not
//! surface the same way everywhere (`content:encoded`, `media:content url=..`).
//! An extraction table maps a qualified tag name, optionally an attribute of
//! it, to a named field. Supporting a new dialect means adding rows, not code.
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field names with a dedicated slot on [`RawEntry`](super::RawEntry).
/// Any other field name is kept in `RawEntry::extra` and stored on the item.
pub mod fields {
    pub const GUID: &str = "guid";
    pub const CONTENT_ENCODED: &str = "content_encoded";
    pub const ENCLOSURE: &str = "enclosure";
}

/// One row of the extraction table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRule {
    /// Qualified tag name as written in the document, e.g. `media:content`.
    pub tag: String,
    /// Take this attribute's value instead of the element text.
    #[serde(default)]
    pub attribute: Option<String>,
    /// Destination field name.
    pub field: String,
}

impl ExtractionRule {
    pub fn text(tag: &str, field: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attribute: None,
            field: field.to_string(),
        }
    }

    pub fn attribute(tag: &str, attribute: &str, field: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attribute: Some(attribute.to_string()),
            field: field.to_string(),
        }
    }

    fn matches(&self, name: &[u8]) -> bool {
        self.tag.as_bytes() == name
    }
}

/// Rules applied when the config does not override them.
pub fn default_extraction_rules() -> Vec<ExtractionRule> {
    vec![
        ExtractionRule::text("guid", fields::GUID),
        ExtractionRule::text("id", fields::GUID),
        ExtractionRule::text("content:encoded", fields::CONTENT_ENCODED),
        ExtractionRule::attribute("media:content", "url", fields::ENCLOSURE),
        ExtractionRule::attribute("enclosure", "url", fields::ENCLOSURE),
    ]
}

fn is_entry_tag(name: &[u8]) -> bool {
    matches!(name, b"item" | b"entry")
}

struct Capture {
    field: String,
    depth: usize,
    text: String,
}

/// Scan `bytes` and return, per `<item>`/`<entry>` in document order, the
/// fields the rules matched.
///
/// The first match for a field wins. Elements outside entries are ignored,
/// so a channel-level `<id>` never leaks into an entry. Text rules apply to
/// direct children of the entry only; attribute rules apply at any depth
/// (`media:content` often sits inside `media:group`). An empty `<item/>`
/// yields an empty map so positions line up with the parser's entries.
///
/// XXE: quick-xml 0.37 does not expand `<!ENTITY>` declarations; custom
/// entities fail to unescape and the raw text is kept instead.
pub fn extract_fields(
    bytes: &[u8],
    rules: &[ExtractionRule],
) -> Result<Vec<BTreeMap<String, String>>, quick_xml::Error> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();
    let mut current: Option<BTreeMap<String, String>> = None;
    // Depth below the open entry element
    let mut depth: usize = 0;
    let mut capture: Option<Capture> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match current.as_mut() {
                None => {
                    if is_entry_tag(e.name().as_ref()) {
                        current = Some(BTreeMap::new());
                        depth = 0;
                    }
                }
                Some(found) => {
                    depth += 1;
                    if capture.is_none() {
                        apply_attribute_rules(&e, rules, &reader, found);
                        // Text rules only see direct children, so nested
                        // elements like Atom <source><id> never match.
                        if depth == 1 {
                            capture = text_rule_for(&e, rules, found).map(|field| Capture {
                                field,
                                depth,
                                text: String::new(),
                            });
                        }
                    }
                }
            },
            Event::Empty(e) => match current.as_mut() {
                // `<item/>` is still an entry to the parser
                None => {
                    if is_entry_tag(e.name().as_ref()) {
                        entries.push(BTreeMap::new());
                    }
                }
                Some(found) => {
                    if capture.is_none() {
                        apply_attribute_rules(&e, rules, &reader, found);
                    }
                }
            },
            Event::Text(t) => {
                if let Some(c) = capture.as_mut() {
                    match t.unescape() {
                        Ok(text) => c.text.push_str(&text),
                        Err(_) => c.text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Event::CData(data) => {
                if let Some(c) = capture.as_mut() {
                    c.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => {
                if current.is_some() {
                    if depth == 0 {
                        if let Some(found) = current.take() {
                            entries.push(found);
                        }
                    } else {
                        if capture.as_ref().is_some_and(|c| c.depth == depth) {
                            if let (Some(done), Some(found)) = (capture.take(), current.as_mut()) {
                                let value = done.text.trim();
                                if !value.is_empty() {
                                    found
                                        .entry(done.field)
                                        .or_insert_with(|| value.to_string());
                                }
                            }
                        }
                        depth -= 1;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

fn apply_attribute_rules(
    e: &BytesStart<'_>,
    rules: &[ExtractionRule],
    reader: &Reader<&[u8]>,
    found: &mut BTreeMap<String, String>,
) {
    let name = e.name();
    for rule in rules.iter().filter(|r| r.matches(name.as_ref())) {
        let Some(wanted) = rule.attribute.as_deref() else {
            continue;
        };
        if found.contains_key(&rule.field) {
            continue;
        }
        for attr in e.attributes().flatten() {
            if attr.key.as_ref() != wanted.as_bytes() {
                continue;
            }
            match attr.decode_and_unescape_value(reader.decoder()) {
                Ok(value) if !value.trim().is_empty() => {
                    found.insert(rule.field.clone(), value.trim().to_string());
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(tag = %rule.tag, error = %err, "Skipping undecodable attribute");
                }
            }
            break;
        }
    }
}

fn text_rule_for(
    e: &BytesStart<'_>,
    rules: &[ExtractionRule],
    found: &BTreeMap<String, String>,
) -> Option<String> {
    let name = e.name();
    rules
        .iter()
        .find(|r| {
            r.attribute.is_none() && r.matches(name.as_ref()) && !found.contains_key(&r.field)
        })
        .map(|r| r.field.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS_WITH_NAMESPACES: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/"
     xmlns:media="http://search.yahoo.com/mrss/">
<channel>
  <title>Channel</title>
  <item>
    <title>First</title>
    <guid isPermaLink="false">abc-1</guid>
    <content:encoded><![CDATA[<p>Full <b>body</b></p>]]></content:encoded>
    <media:content url="https://cdn.example.com/a.jpg" medium="image"/>
  </item>
  <item>
    <title>Second</title>
    <enclosure url="https://cdn.example.com/b.mp3" type="audio/mpeg" length="1"/>
  </item>
</channel></rss>"#;

    #[test]
    fn test_default_rules_extract_per_item() {
        let entries =
            extract_fields(RSS_WITH_NAMESPACES.as_bytes(), &default_extraction_rules()).unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].get(fields::GUID).map(String::as_str), Some("abc-1"));
        assert_eq!(
            entries[0].get(fields::CONTENT_ENCODED).map(String::as_str),
            Some("<p>Full <b>body</b></p>")
        );
        assert_eq!(
            entries[0].get(fields::ENCLOSURE).map(String::as_str),
            Some("https://cdn.example.com/a.jpg")
        );

        assert_eq!(entries[1].get(fields::GUID), None);
        assert_eq!(
            entries[1].get(fields::ENCLOSURE).map(String::as_str),
            Some("https://cdn.example.com/b.mp3")
        );
    }

    #[test]
    fn test_atom_id_is_guid_and_feed_level_id_ignored() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>urn:feed</id>
  <title>Atom</title>
  <entry><id>urn:entry:1</id><title>One</title></entry>
  <entry><title>No id</title></entry>
</feed>"#;
        let entries = extract_fields(atom.as_bytes(), &default_extraction_rules()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].get(fields::GUID).map(String::as_str), Some("urn:entry:1"));
        assert!(entries[1].is_empty());
    }

    #[test]
    fn test_nested_source_id_is_not_the_entry_guid() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>urn:planet</id>
  <entry>
    <source><id>urn:upstream</id><title>Upstream</title></source>
    <id>urn:e1</id>
    <title>One</title>
  </entry>
  <entry>
    <source><id>urn:upstream</id></source>
    <id>urn:e2</id>
    <title>Two</title>
  </entry>
</feed>"#;
        let entries = extract_fields(atom.as_bytes(), &default_extraction_rules()).unwrap();
        let guids: Vec<_> = entries
            .iter()
            .map(|e| e.get(fields::GUID).map(String::as_str))
            .collect();
        assert_eq!(guids, vec![Some("urn:e1"), Some("urn:e2")]);
    }

    #[test]
    fn test_grouped_media_content_still_matches() {
        let xml = r#"<rss><channel><item>
            <media:group><media:content url="https://a.example/v.mp4"/></media:group>
        </item></channel></rss>"#;
        let entries = extract_fields(xml.as_bytes(), &default_extraction_rules()).unwrap();
        assert_eq!(
            entries[0].get(fields::ENCLOSURE).map(String::as_str),
            Some("https://a.example/v.mp4")
        );
    }

    #[test]
    fn test_empty_item_element_is_counted() {
        let xml = r#"<rss><channel>
            <item><guid>a</guid></item>
            <item/>
            <item><guid>b</guid></item>
        </channel></rss>"#;
        let entries = extract_fields(xml.as_bytes(), &default_extraction_rules()).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[1].is_empty());
        assert_eq!(entries[2].get(fields::GUID).map(String::as_str), Some("b"));
    }

    #[test]
    fn test_custom_rule_lands_under_its_field_name() {
        let xml = r#"<rss><channel><item><dc:creator>Ada &amp; Co</dc:creator></item></channel></rss>"#;
        let rules = vec![ExtractionRule::text("dc:creator", "author")];
        let entries = extract_fields(xml.as_bytes(), &rules).unwrap();
        assert_eq!(entries[0].get("author").map(String::as_str), Some("Ada & Co"));
    }

    #[test]
    fn test_first_match_wins() {
        let xml = r#"<rss><channel><item>
            <media:content url="https://a.example/1.jpg"/>
            <media:content url="https://a.example/2.jpg"/>
        </item></channel></rss>"#;
        let entries = extract_fields(xml.as_bytes(), &default_extraction_rules()).unwrap();
        assert_eq!(
            entries[0].get(fields::ENCLOSURE).map(String::as_str),
            Some("https://a.example/1.jpg")
        );
    }

    #[test]
    fn test_blank_values_are_not_recorded() {
        let xml = r#"<rss><channel><item><guid>   </guid></item></channel></rss>"#;
        let entries = extract_fields(xml.as_bytes(), &default_extraction_rules()).unwrap();
        assert!(entries[0].get(fields::GUID).is_none());
    }

    #[test]
    fn test_rules_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Table {
            extract: Vec<ExtractionRule>,
        }
        let table: Table = toml::from_str(
            r#"
[[extract]]
tag = "media:thumbnail"
attribute = "url"
field = "enclosure"
"#,
        )
        .unwrap();
        assert_eq!(
            table.extract,
            vec![ExtractionRule::attribute("media:thumbnail", "url", fields::ENCLOSURE)]
        );
    }
}
