use std::collections::HashMap;

use crate::model::RssItem;

/// Result of merging one source's items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeCounts {
    pub inserted: usize,
    pub updated: usize,
}

/// Merge `incoming` into `existing` in order.
///
/// A new id is appended. A known id has its mutable fields (title, link,
/// description, pub date, enclosure, truncation mark, custom fields) replaced
/// in place and counts as updated whether or not anything changed. Ids never
/// duplicate, even if `incoming` repeats one.
pub fn merge_items(existing: &mut Vec<RssItem>, incoming: Vec<RssItem>) -> MergeCounts {
    let mut index: HashMap<String, usize> = existing
        .iter()
        .enumerate()
        .map(|(i, item)| (item.id.clone(), i))
        .collect();
    let mut counts = MergeCounts::default();

    for item in incoming {
        match index.get(&item.id) {
            Some(&pos) => {
                let stored = &mut existing[pos];
                stored.title = item.title;
                stored.link = item.link;
                stored.description = item.description;
                stored.pub_date = item.pub_date;
                stored.enclosure = item.enclosure;
                stored.truncated = item.truncated;
                stored.extra = item.extra;
                counts.updated += 1;
            }
            None => {
                index.insert(item.id.clone(), existing.len());
                existing.push(item);
                counts.inserted += 1;
            }
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(id: &str, title: &str) -> RssItem {
        RssItem {
            id: id.into(),
            title: title.into(),
            link: format!("https://example.com/{id}"),
            description: String::new(),
            pub_date: String::new(),
            source_id: "s".into(),
            enclosure: None,
            truncated: false,
            extra: Default::default(),
        }
    }

    #[test]
    fn test_inserts_new_in_order() {
        let mut store = vec![item("a", "A")];
        let counts = merge_items(&mut store, vec![item("b", "B"), item("c", "C")]);
        assert_eq!(counts, MergeCounts { inserted: 2, updated: 0 });
        let ids: Vec<_> = store.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_existing_id_updated_in_place() {
        let mut store = vec![item("x", "Old"), item("y", "Y")];
        let mut changed = item("x", "New");
        changed.pub_date = "2024-01-01T00:00:00Z".into();

        let counts = merge_items(&mut store, vec![changed]);
        assert_eq!(counts, MergeCounts { inserted: 0, updated: 1 });
        assert_eq!(store.len(), 2);
        assert_eq!(store[0].title, "New");
        assert_eq!(store[0].pub_date, "2024-01-01T00:00:00Z");
        assert_eq!(store.iter().filter(|i| i.id == "x").count(), 1);
    }

    #[test]
    fn test_custom_fields_replaced_on_update() {
        let mut stored = item("x", "X");
        stored.extra.insert("dc_creator".into(), "Old".into());
        let mut store = vec![stored];

        let mut incoming = item("x", "X");
        incoming.extra.insert("dc_creator".into(), "New".into());
        merge_items(&mut store, vec![incoming]);

        assert_eq!(store[0].extra.get("dc_creator").map(String::as_str), Some("New"));
    }

    #[test]
    fn test_source_id_never_rewritten() {
        let mut store = vec![item("x", "Old")];
        let mut incoming = item("x", "New");
        incoming.source_id = "other".into();
        merge_items(&mut store, vec![incoming]);
        assert_eq!(store[0].source_id, "s");
    }

    #[test]
    fn test_repeated_id_in_one_batch_is_not_duplicated() {
        let mut store = Vec::new();
        let counts = merge_items(&mut store, vec![item("d", "First"), item("d", "Second")]);
        assert_eq!(counts, MergeCounts { inserted: 1, updated: 1 });
        assert_eq!(store.len(), 1);
        assert_eq!(store[0].title, "Second");
    }

    #[test]
    fn test_identical_merge_is_idempotent() {
        let batch = vec![item("a", "A"), item("b", "B")];
        let mut store = Vec::new();
        merge_items(&mut store, batch.clone());
        let snapshot = store.clone();

        let counts = merge_items(&mut store, batch);
        assert_eq!(counts, MergeCounts { inserted: 0, updated: 2 });
        assert_eq!(store, snapshot);
    }
}
