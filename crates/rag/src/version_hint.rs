//! Version Hint Extractor: detects a trailing Java version token in a query and
//! produces a synonym-boosted query string plus a server/client filter hint.

use regex::Regex;
use std::sync::OnceLock;

/// Server-side filter plus client-side fallback substrings for a detected
/// version. When the vector store can't push `docVersion` down as a filter
/// (e.g. a collection without that payload field indexed), the Hybrid Searcher
/// falls back to accepting documents whose URL or title contains one of
/// `url_substrings`, or whose text contains one of `text_substrings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFilterHint {
    pub doc_version: String,
    pub url_substrings: Vec<String>,
    pub text_substrings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionHint {
    pub boosted_query: String,
    pub filter: Option<VersionFilterHint>,
}

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:java[\s-]*se|javase|java|jdk)[\s-]*([0-9]{1,3})\b").unwrap()
    })
}

/// Detects a version token and returns the boosted query and filter hint. If no
/// version is detected, the boosted query equals the original and `filter` is
/// `None`.
pub fn extract(query: &str) -> VersionHint {
    match pattern().captures(query) {
        Some(caps) => {
            let version = caps.get(1).unwrap().as_str().to_string();
            let boosted_query = format!(
                "JDK {v} Java SE {v} Java {v} release features documentation: {q}",
                v = version,
                q = query
            );
            let filter = VersionFilterHint {
                doc_version: version.clone(),
                url_substrings: vec![
                    format!("java{v}", v = version),
                    format!("jdk{v}", v = version),
                    format!("java-{v}", v = version),
                    format!("jdk-{v}", v = version),
                    format!("/javase/{v}", v = version),
                ],
                text_substrings: vec![
                    format!("java se {v}", v = version),
                    format!("jdk {v}", v = version),
                ],
            };
            VersionHint {
                boosted_query,
                filter: Some(filter),
            }
        }
        None => VersionHint {
            boosted_query: query.to_string(),
            filter: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_version_boost_and_filter() {
        let hint = extract("What is new in Java 25?");
        assert_eq!(
            hint.boosted_query,
            "JDK 25 Java SE 25 Java 25 release features documentation: What is new in Java 25?"
        );
        let filter = hint.filter.expect("version filter expected");
        assert_eq!(filter.doc_version, "25");
        assert_eq!(
            filter.url_substrings,
            vec!["java25", "jdk25", "java-25", "jdk-25", "/javase/25"]
        );
        assert_eq!(filter.text_substrings, vec!["java se 25", "jdk 25"]);
    }

    #[test]
    fn no_version_passes_query_through_unchanged() {
        let hint = extract("How do I use a HashMap?");
        assert_eq!(hint.boosted_query, "How do I use a HashMap?");
        assert!(hint.filter.is_none());
    }

    #[test]
    fn detects_jdk_with_hyphen_separator() {
        let hint = extract("jdk-17 migration guide");
        let filter = hint.filter.expect("version filter expected");
        assert_eq!(filter.doc_version, "17");
    }

    #[test]
    fn detects_javase_compact_form() {
        let hint = extract("javase21 new features");
        let filter = hint.filter.expect("version filter expected");
        assert_eq!(filter.doc_version, "21");
    }
}
