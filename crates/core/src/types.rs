//! Data model: documents, sparse vectors, scored points, citations, and the
//! structured prompt's segment types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tokens::estimate_tokens;

/// Metadata attached to a document at ingestion. Every field is optional; which
/// ones are populated depends on the collection and the ingestion pipeline (out of
/// scope here).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    pub url: Option<String>,
    pub title: Option<String>,
    /// Stable SHA-256 hex content fingerprint set at ingestion.
    pub hash: Option<String>,
    pub doc_set: Option<String>,
    pub source_name: Option<String>,
    pub source_kind: Option<String>,
    pub doc_type: Option<String>,
    pub doc_version: Option<String>,
    pub chunk_index: Option<u32>,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
}

/// A retrieved unit. Immutable within a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// The point's UUID, as returned by the vector store. Used as the merge key
    /// for cross-collection deduplication.
    pub id: String,
    pub text: String,
    /// Fused RRF score from the collection that produced this document (higher
    /// is better).
    pub score: f32,
    pub collection: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, score: f32, collection: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            score,
            collection: collection.into(),
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn url(&self) -> Option<&str> {
        self.metadata.url.as_deref()
    }

    pub fn hash(&self) -> Option<&str> {
        self.metadata.hash.as_deref()
    }
}

/// A server-returned candidate before it is converted into a `Document`: a UUID,
/// a fused score, and a raw metadata payload.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

/// A sparse term-frequency vector: strictly index-ascending, equal-length
/// `indices`/`values`, at most 256 entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u64>,
    pub values: Vec<u32>,
}

impl SparseVector {
    pub const MAX_LEN: usize = 256;

    /// Builds a sparse vector from a hash -> count mapping, truncating to the 256
    /// highest counts (ties broken by first occurrence, via `first_seen_order`)
    /// and emitting indices in ascending order.
    pub fn from_counts(mut counts: Vec<(u64, u32, usize)>) -> Self {
        if counts.len() > Self::MAX_LEN {
            // Highest count first; for ties, earliest first-occurrence wins, so
            // stable-sort ascending by (-count, first_seen) and keep a prefix.
            counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
            counts.truncate(Self::MAX_LEN);
        }
        counts.sort_by_key(|(hash, _, _)| *hash);
        let indices = counts.iter().map(|(hash, _, _)| *hash).collect();
        let values = counts.iter().map(|(_, count, _)| *count).collect();
        SparseVector { indices, values }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// A citation derived from the top reranked documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    pub url: String,
    pub title: String,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
}

/// Truncation priority tiers. Ordering matches the spec: CRITICAL > HIGH > MEDIUM
/// > LOW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// One segment of a Structured Prompt. Forms a closed variant set: System,
/// Context, History, Query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum PromptSegment {
    System { text: String },
    Context { marker: u32, url: String, text: String },
    History { role: crate::session::TurnRole, text: String },
    Query { text: String },
}

impl PromptSegment {
    pub fn priority(&self) -> Priority {
        match self {
            PromptSegment::System { .. } => Priority::Critical,
            PromptSegment::Query { .. } => Priority::High,
            PromptSegment::History { .. } => Priority::Medium,
            PromptSegment::Context { .. } => Priority::Low,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            PromptSegment::System { text } => text,
            PromptSegment::Context { text, .. } => text,
            PromptSegment::History { text, .. } => text,
            PromptSegment::Query { text } => text,
        }
    }

    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(self.text())
    }

    /// The text actually sent to the model: CONTEXT entries are prefixed with
    /// their `[CTX N]` marker and canonical URL per the data model; every
    /// other segment renders as its raw text.
    pub fn rendered_text(&self) -> String {
        match self {
            PromptSegment::Context { marker, url, text } => {
                format!("[CTX {marker}] {url}\n{text}")
            }
            other => other.text().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_vector_ascending_and_bounded() {
        let counts: Vec<(u64, u32, usize)> = (0..300).map(|i| (i as u64, 1, i)).collect();
        let sv = SparseVector::from_counts(counts);
        assert_eq!(sv.indices.len(), SparseVector::MAX_LEN);
        assert!(sv.indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn sparse_vector_keeps_highest_counts_on_truncation() {
        // Index 0 has the lowest count; it should be the one discarded.
        let mut counts: Vec<(u64, u32, usize)> = (0..300).map(|i| (i as u64, 2, i)).collect();
        counts[0] = (0, 1, 0);
        let sv = SparseVector::from_counts(counts);
        assert!(!sv.indices.contains(&0));
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn context_segment_renders_with_marker_and_url_prefix() {
        let segment = PromptSegment::Context {
            marker: 2,
            url: "https://example.com/doc".to_string(),
            text: "body text".to_string(),
        };
        assert_eq!(segment.rendered_text(), "[CTX 2] https://example.com/doc\nbody text");
        // Raw text() (used for token-budget estimation) stays unprefixed.
        assert_eq!(segment.text(), "body text");
    }

    #[test]
    fn non_context_segments_render_as_raw_text() {
        let segment = PromptSegment::Query { text: "hello".to_string() };
        assert_eq!(segment.rendered_text(), "hello");
    }
}
