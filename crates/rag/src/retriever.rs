//! Hybrid Searcher: fans a query across a fixed set of collections in
//! parallel, each via a dense + sparse query fused client-side by RRF, then
//! merges the per-collection results into a single insertion-ordered list keyed
//! by point UUID (higher score wins on collision).
//!
//! Grounded in the teacher's `HybridRetriever` (`tokio::join!` concurrency,
//! `RetrieverConfig`), generalized from single-collection/single-vector search
//! to the spec's multi-collection fan-out with a single shared deadline and a
//! strict/lenient partial-failure policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ragchat_core::Document;

use crate::embeddings::EmbeddingClient;
use crate::sparse::SparseEncoder;
use crate::vector_store::{metadata_from_payload, MetadataFilter, QdrantVectorStore};
use crate::version_hint::{self, VersionHint};
use crate::RagError;

#[derive(Debug, Clone)]
pub struct HybridSearcherConfig {
    pub collections: Vec<String>,
    pub prefetch_limit: usize,
    pub rrf_k: f32,
    pub query_timeout: Duration,
    /// Strict mode (default true, per spec's Open Question): any collection
    /// failure aborts the whole search. When false, failed collections
    /// contribute zero results and are listed in the outcome's notice.
    pub fail_on_partial_search_error: bool,
    pub search_top_k: usize,
}

impl Default for HybridSearcherConfig {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            prefetch_limit: 20,
            rrf_k: 60.0,
            query_timeout: Duration::from_secs(5),
            fail_on_partial_search_error: true,
            search_top_k: 20,
        }
    }
}

/// Outcome of a hybrid search under the lenient (`fail_on_partial_search_error
/// = false`) policy: the merged documents plus the names of collections that
/// failed or timed out.
#[derive(Debug, Clone)]
pub struct HybridSearchOutcome {
    pub documents: Vec<Document>,
    pub failed_collections: Vec<String>,
}

/// Why a single collection's query didn't contribute results, tracked so the
/// strict-mode error can distinguish a fully elapsed fan-out
/// (`HybridSearchTimeout`) from a partial failure where at least one
/// collection failed for a non-timeout reason (`HybridSearchPartialFailure`).
#[derive(Debug)]
enum CollectionFailure {
    TimedOut,
    Other(String),
}

pub struct HybridSearcher {
    config: HybridSearcherConfig,
    embedder: Arc<dyn EmbeddingClient>,
    sparse_encoder: SparseEncoder,
    store: Arc<QdrantVectorStore>,
}

impl HybridSearcher {
    pub fn new(
        config: HybridSearcherConfig,
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<QdrantVectorStore>,
    ) -> Self {
        Self {
            config,
            embedder,
            sparse_encoder: SparseEncoder::new(),
            store,
        }
    }

    /// Runs the full fan-out for `query`, honoring any version-hint filter,
    /// and returns the merged, limit-truncated document list.
    pub async fn search(&self, query: &str, limit: usize) -> Result<HybridSearchOutcome, RagError> {
        let hint = version_hint::extract(query);
        let dense = self
            .embedder
            .embed(&hint.boosted_query)
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        let sparse = self.sparse_encoder.encode(&hint.boosted_query);

        let filter = hint.filter.as_ref().map(|f| {
            MetadataFilter::default().with_match("docVersion", f.doc_version.clone())
        });

        let deadline = self.config.query_timeout;
        let mut tasks = Vec::with_capacity(self.config.collections.len());
        for collection in &self.config.collections {
            let store = Arc::clone(&self.store);
            let collection = collection.clone();
            let dense = dense.clone();
            let sparse = sparse.clone();
            let filter = filter.clone();
            let prefetch_limit = self.config.prefetch_limit;
            let top_k = self.config.search_top_k;
            let rrf_k = self.config.rrf_k;

            let task = tokio::spawn(async move {
                let result = tokio::time::timeout(
                    deadline,
                    store.query_hybrid(&collection, &dense, &sparse, filter, prefetch_limit, top_k, rrf_k),
                )
                .await;
                (collection, result)
            });
            tasks.push(task);
        }

        let mut per_collection: HashMap<String, Result<Vec<ragchat_core::ScoredPoint>, CollectionFailure>> =
            HashMap::new();
        let mut collection_order: Vec<String> = Vec::new();
        for task in tasks {
            let (collection, result) = task
                .await
                .map_err(|e| RagError::Search(format!("collection task panicked: {e}")))?;
            collection_order.push(collection.clone());
            let outcome = match result {
                Ok(Ok(points)) => Ok(points),
                Ok(Err(e)) => Err(CollectionFailure::Other(e.to_string())),
                Err(_elapsed) => Err(CollectionFailure::TimedOut),
            };
            per_collection.insert(collection, outcome);
        }

        let mut failed = Vec::new();
        for (collection, outcome) in &per_collection {
            if outcome.is_err() {
                failed.push(collection.clone());
            }
        }
        failed.sort();

        if !failed.is_empty() && self.config.fail_on_partial_search_error {
            // A fully elapsed fan-out (every collection hit the shared
            // deadline, none merely errored for another reason) is the
            // spec's `HybridSearchTimeout`, distinct from a partial failure
            // where some collections succeeded or failed for other reasons.
            let all_timed_out = failed.len() == self.config.collections.len()
                && per_collection
                    .values()
                    .all(|outcome| matches!(outcome, Err(CollectionFailure::TimedOut)));
            if all_timed_out {
                return Err(RagError::HybridSearchTimeout(deadline));
            }
            return Err(RagError::HybridSearchPartialFailure(failed));
        }

        // Insertion-ordered merge keyed by point UUID; higher score wins on
        // collision. Iterate collections in the order they were dispatched so
        // "first observation" is deterministic for a fixed collection set,
        // independent of completion order.
        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, Document> = HashMap::new();

        for collection in &collection_order {
            let Some(Ok(points)) = per_collection.get(collection) else {
                continue;
            };
            for point in points {
                let text = point
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let metadata = metadata_from_payload(&point.payload);
                let candidate = Document::new(point.id.clone(), text, point.score, collection.clone())
                    .with_metadata(metadata);

                match merged.get(&point.id) {
                    Some(existing) if existing.score >= candidate.score => {}
                    Some(_) => {
                        merged.insert(point.id.clone(), candidate);
                    }
                    None => {
                        order.push(point.id.clone());
                        merged.insert(point.id.clone(), candidate);
                    }
                }
            }
        }

        let mut documents: Vec<Document> = order
            .into_iter()
            .filter_map(|id| merged.remove(&id))
            .collect();
        documents.truncate(limit);

        Ok(HybridSearchOutcome {
            documents,
            failed_collections: failed,
        })
    }
}

/// Exposed for tests exercising property 1 (permutation-invariant UUID set).
#[cfg(test)]
pub(crate) fn hint_for(query: &str) -> VersionHint {
    version_hint::extract(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_are_strict() {
        let config = HybridSearcherConfig::default();
        assert!(config.fail_on_partial_search_error);
        assert_eq!(config.rrf_k, 60.0);
        assert_eq!(config.prefetch_limit, 20);
    }

    #[test]
    fn version_hint_flows_through() {
        let hint = hint_for("What is new in Java 25?");
        assert!(hint.filter.is_some());
    }
}
