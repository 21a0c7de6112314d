//! Vector Store Client: executes a hybrid (dense + sparse) query against a
//! named Qdrant collection, with client-side Reciprocal Rank Fusion.
//!
//! Grounded in the teacher's `VectorStore`/`SearchFilter` shape (Qdrant client
//! construction, builder-based request assembly, `Condition`/`Filter` use), but
//! generalized from a single flat-vector `search()` call to the spec's
//! two named vectors (`dense`, `bm25`) per collection. Qdrant's
//! query-API `Fusion::Rrf` variant carries no fields — its server-side RRF
//! uses a fixed internal constant, so it cannot honor the spec's configurable
//! `rrfK` (default 60). Fusion is therefore done client-side instead, the way
//! the teacher's own `HybridRetriever::rrf_fusion` does it (`tokio::join!` the
//! two single-vector queries, then combine by rank), which keeps `rrfK`
//! meaningful.

use std::collections::HashMap;

use qdrant_client::qdrant::{Condition, Filter, Query, QueryPointsBuilder, Value as QdrantValue};
use qdrant_client::Qdrant;
use serde_json::Value;

use ragchat_core::{DocumentMetadata, ScoredPoint, SparseVector};

use crate::RagError;

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub dense_vector_name: String,
    pub bm25_vector_name: String,
}

/// A server-side metadata filter, pushed down as a Qdrant `Filter` on an
/// exact-match keyword field (used for the Version Hint Extractor's
/// `docVersion` filter, among others).
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub must_match: Vec<(String, String)>,
}

impl MetadataFilter {
    pub fn with_match(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.must_match.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must_match.is_empty()
    }

    fn into_qdrant(self) -> Filter {
        let conditions = self
            .must_match
            .into_iter()
            .map(|(field, value)| Condition::matches(field, value))
            .collect();
        Filter {
            must: conditions,
            ..Default::default()
        }
    }
}

/// Vector Store Client, consumed by the Hybrid Searcher. One instance is
/// shared across collections; `collection` is passed per call.
pub struct QdrantVectorStore {
    client: Qdrant,
    dense_vector_name: String,
    bm25_vector_name: String,
}

impl QdrantVectorStore {
    pub fn connect(config: VectorStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(api_key) = config.api_key {
            builder = builder.api_key(api_key);
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            dense_vector_name: config.dense_vector_name,
            bm25_vector_name: config.bm25_vector_name,
        })
    }

    /// Runs one hybrid query against `collection`: a dense-vector query against
    /// `dense_vector_name`, and (when `sparse` is non-empty) a sparse-vector
    /// query against `bm25_vector_name`, run concurrently and fused client-side
    /// by RRF with parameter `rrf_k`. Returns up to `top_k` fused points.
    pub async fn query_hybrid(
        &self,
        collection: &str,
        dense: &[f32],
        sparse: &SparseVector,
        filter: Option<MetadataFilter>,
        prefetch_limit: usize,
        top_k: usize,
        rrf_k: f32,
    ) -> Result<Vec<ScoredPoint>, RagError> {
        let qdrant_filter = filter.map(MetadataFilter::into_qdrant);

        let dense_future = self.single_vector_query(
            collection,
            Query::new_nearest(dense.to_vec()),
            &self.dense_vector_name,
            qdrant_filter.clone(),
            prefetch_limit,
        );

        let sparse_future = async {
            if sparse.is_empty() {
                return Ok(Vec::new());
            }
            let sparse_vector = qdrant_client::qdrant::Vector::new_sparse(
                sparse.indices.iter().map(|&i| i as u32).collect::<Vec<u32>>(),
                sparse.values.iter().map(|&v| v as f32).collect::<Vec<f32>>(),
            );
            self.single_vector_query(
                collection,
                Query::new_nearest(sparse_vector),
                &self.bm25_vector_name,
                qdrant_filter.clone(),
                prefetch_limit,
            )
            .await
        };

        let (dense_points, sparse_points) = tokio::try_join!(dense_future, sparse_future)?;

        Ok(rrf_fuse(&dense_points, &sparse_points, rrf_k, top_k))
    }

    /// Runs a single named-vector query (no fusion), ranked by the store's
    /// own similarity score. Used for both the dense and sparse legs of
    /// [`Self::query_hybrid`]; the two legs are combined client-side by rank.
    async fn single_vector_query(
        &self,
        collection: &str,
        query: Query,
        using: &str,
        filter: Option<Filter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, RagError> {
        let mut request = QueryPointsBuilder::new(collection)
            .query(query)
            .using(using.to_string())
            .limit(limit as u64)
            .with_payload(true);
        if let Some(f) = filter {
            request = request.filter(f);
        }

        let response = self
            .client
            .query(request)
            .await
            .map_err(|e| RagError::Search(format!("collection {collection}: {e}")))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let id = point_id(&point);
                let payload = point
                    .payload
                    .into_iter()
                    .map(|(k, v)| (k, qdrant_value_to_json(v)))
                    .collect();
                ScoredPoint {
                    id,
                    score: point.score,
                    payload,
                }
            })
            .collect())
    }
}

/// Client-side Reciprocal Rank Fusion: `score = Σ 1/(k + rank + 1)` over each
/// stage a point appears in, unweighted (the spec draws no distinction in
/// per-stage importance, unlike the teacher's `dense_weight`). Ties within a
/// stage are broken by stable input order; the result is sorted by fused
/// score descending and truncated to `top_k`.
fn rrf_fuse(dense: &[ScoredPoint], sparse: &[ScoredPoint], rrf_k: f32, top_k: usize) -> Vec<ScoredPoint> {
    let mut fused: HashMap<String, (f32, ScoredPoint)> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for stage in [dense, sparse] {
        for (rank, point) in stage.iter().enumerate() {
            let contribution = 1.0 / (rrf_k + rank as f32 + 1.0);
            match fused.get_mut(&point.id) {
                Some((score, _)) => *score += contribution,
                None => {
                    order.push(point.id.clone());
                    fused.insert(point.id.clone(), (contribution, point.clone()));
                }
            }
        }
    }

    let mut results: Vec<ScoredPoint> = order
        .into_iter()
        .filter_map(|id| fused.remove(&id))
        .map(|(score, mut point)| {
            point.score = score;
            point
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(top_k);
    results
}

fn point_id(point: &qdrant_client::qdrant::ScoredPoint) -> String {
    match point
        .id
        .as_ref()
        .and_then(|id| id.point_id_options.clone())
    {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

fn qdrant_value_to_json(value: QdrantValue) -> Value {
    use qdrant_client::qdrant::value::Kind;
    match value.kind {
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null)
        }
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_value_to_json(v)))
                .collect(),
        ),
        Some(Kind::ListValue(l)) => {
            Value::Array(l.values.into_iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}

/// Converts a raw payload map into the typed `DocumentMetadata` the rest of the
/// core operates on. Fields the payload doesn't carry are left `None`.
pub fn metadata_from_payload(payload: &HashMap<String, Value>) -> DocumentMetadata {
    DocumentMetadata {
        url: string_field(payload, "url"),
        title: string_field(payload, "title"),
        hash: string_field(payload, "hash"),
        doc_set: string_field(payload, "docSet"),
        source_name: string_field(payload, "sourceName"),
        source_kind: string_field(payload, "sourceKind"),
        doc_type: string_field(payload, "docType"),
        doc_version: string_field(payload, "docVersion"),
        chunk_index: payload.get("chunkIndex").and_then(Value::as_u64).map(|n| n as u32),
        page_start: payload.get("pageStart").and_then(Value::as_u64).map(|n| n as u32),
        page_end: payload.get("pageEnd").and_then(Value::as_u64).map(|n| n as u32),
    }
}

fn string_field(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_from_payload_extracts_known_fields() {
        let mut payload = HashMap::new();
        payload.insert("url".to_string(), Value::String("https://example.com".into()));
        payload.insert("chunkIndex".to_string(), Value::from(3u64));
        let metadata = metadata_from_payload(&payload);
        assert_eq!(metadata.url.as_deref(), Some("https://example.com"));
        assert_eq!(metadata.chunk_index, Some(3));
        assert!(metadata.title.is_none());
    }

    fn point(id: &str, score: f32) -> ScoredPoint {
        ScoredPoint {
            id: id.to_string(),
            score,
            payload: HashMap::new(),
        }
    }

    #[test]
    fn rrf_fuse_combines_scores_for_points_in_both_stages() {
        let dense = vec![point("a", 0.9), point("b", 0.8)];
        let sparse = vec![point("b", 5.0), point("a", 4.0)];

        let fused = rrf_fuse(&dense, &sparse, 60.0, 10);

        assert_eq!(fused.len(), 2);
        // "a" ranks 0 in dense, 1 in sparse; "b" ranks 1 in dense, 0 in
        // sparse. Symmetric ranks under an unweighted fusion score equally.
        assert!((fused[0].score - fused[1].score).abs() < 1e-6);
    }

    #[test]
    fn rrf_fuse_favors_points_ranked_highly_in_both_stages() {
        let dense = vec![point("a", 0.9), point("b", 0.1)];
        let sparse = vec![point("a", 5.0), point("c", 0.1)];

        let fused = rrf_fuse(&dense, &sparse, 60.0, 10);

        assert_eq!(fused[0].id, "a");
    }

    #[test]
    fn rrf_fuse_truncates_to_top_k() {
        let dense = vec![point("a", 1.0), point("b", 0.9), point("c", 0.8)];
        let fused = rrf_fuse(&dense, &[], 60.0, 2);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn metadata_filter_builder_accumulates_matches() {
        let filter = MetadataFilter::default().with_match("docVersion", "25");
        assert!(!filter.is_empty());
        assert_eq!(filter.must_match[0], ("docVersion".to_string(), "25".to_string()));
    }
}
