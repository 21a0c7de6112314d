//! Deduper: two-pass, order-preserving removal of documents already merged by
//! UUID. Pure function, no I/O.

use std::collections::HashSet;

use ragchat_core::Document;

/// Removes duplicates first by content `hash` (keep first occurrence), then by
/// `url` among survivors (keep first occurrence). Documents lacking both
/// `hash` and `url` are retained unconditionally. Order is strictly preserved.
pub fn dedupe(documents: Vec<Document>) -> Vec<Document> {
    let mut seen_hashes: HashSet<String> = HashSet::new();
    let after_hash: Vec<Document> = documents
        .into_iter()
        .filter(|doc| match doc.hash() {
            Some(hash) => seen_hashes.insert(hash.to_string()),
            None => true,
        })
        .collect();

    let mut seen_urls: HashSet<String> = HashSet::new();
    after_hash
        .into_iter()
        .filter(|doc| match doc.url() {
            Some(url) => seen_urls.insert(url.to_string()),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::DocumentMetadata;

    fn doc(id: &str, url: Option<&str>, hash: Option<&str>) -> Document {
        Document::new(id, format!("text-{id}"), 1.0, "c1").with_metadata(DocumentMetadata {
            url: url.map(str::to_string),
            hash: hash.map(str::to_string),
            ..Default::default()
        })
    }

    #[test]
    fn s3_three_layer_dedup_example() {
        let a = doc("a", Some("u1"), Some("h1"));
        let b = doc("b", Some("u1"), Some("h2"));
        let c = doc("c", Some("u2"), Some("h1"));
        let d = doc("d", Some("u3"), Some("h3"));

        let result = dedupe(vec![a.clone(), b.clone(), c, d.clone()]);
        assert_eq!(result.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["a", "d"]);
    }

    #[test]
    fn documents_without_hash_or_url_are_always_kept() {
        let bare1 = doc("x", None, None);
        let bare2 = doc("y", None, None);
        let result = dedupe(vec![bare1, bare2]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let a = doc("a", Some("u1"), Some("h1"));
        let b = doc("b", Some("u2"), Some("h2"));
        let once = dedupe(vec![a, b]);
        let twice = dedupe(once.clone());
        assert_eq!(
            once.iter().map(|d| &d.id).collect::<Vec<_>>(),
            twice.iter().map(|d| &d.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn preserves_relative_order_of_survivors() {
        let docs = vec![
            doc("a", Some("u1"), Some("h1")),
            doc("b", Some("u2"), Some("h2")),
            doc("c", Some("u1"), Some("h3")), // dup url -> dropped
            doc("d", Some("u3"), Some("h4")),
        ];
        let result = dedupe(docs);
        assert_eq!(
            result.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "d"]
        );
    }
}
