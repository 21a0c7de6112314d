//! Reranker: orders dedup'd candidates by LLM judgment, with a bounded,
//! TTL-evicted result cache keyed on query + candidate identity.
//!
//! Grounded in the teacher's `RerankerConfig`/cache-stats bookkeeping idiom
//! (`reranker.rs`), substantially rewritten from an ONNX cross-encoder cascade
//! toward an LLM-HTTP-call design built on `ragchat_llm::LlmClient`. The
//! teacher's keyword-overlap fallback scorer is deliberately not reused: the
//! spec forbids silently substituting input order on failure.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use ragchat_core::Document;
use ragchat_llm::LlmClient;

use crate::RagError;

const MAX_SNIPPET_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct RerankerConfig {
    pub timeout: Duration,
    pub cache_max_entries: u64,
    pub cache_ttl: Duration,
    pub model: String,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(12),
            cache_max_entries: 10_000,
            cache_ttl: Duration::from_secs(1_800),
            model: "claude-haiku-4-5".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RerankerStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct Reranker {
    config: RerankerConfig,
    llm: Arc<dyn LlmClient>,
    cache: Cache<String, Vec<String>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Reranker {
    pub fn new(config: RerankerConfig, llm: Arc<dyn LlmClient>) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_max_entries)
            .time_to_live(config.cache_ttl)
            .build();
        Self {
            config,
            llm,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> RerankerStats {
        RerankerStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Orders `documents` by LLM judgment and returns the top `return_k`.
    /// Fails (no silent fallback to input order) on timeout, network error,
    /// unparseable response, or an empty resulting order.
    pub async fn rerank(
        &self,
        query: &str,
        documents: Vec<Document>,
        return_k: usize,
    ) -> Result<Vec<Document>, RagError> {
        if documents.is_empty() {
            return Ok(documents);
        }

        let key = cache_key(query, &documents, return_k);

        if let Some(cached_order) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(project_onto(&cached_order, documents));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let prompt = build_prompt(query, &documents);
        let response = self
            .llm
            .complete(&prompt, 0.0, self.config.timeout)
            .await
            .map_err(|e| RagError::Reranking(e.to_string()))?;

        let order = parse_order(&response)
            .ok_or_else(|| RagError::Reranking("unparseable rerank response".to_string()))?;

        let mut seen = HashSet::new();
        let mut surviving_indices = Vec::new();
        for idx in order.into_iter().flatten() {
            if idx < 0 || idx as usize >= documents.len() {
                continue;
            }
            if seen.insert(idx) {
                surviving_indices.push(idx as usize);
            }
        }

        if surviving_indices.is_empty() {
            return Err(RagError::Reranking("empty rerank order".to_string()));
        }

        surviving_indices.truncate(return_k);

        let identifiers: Vec<String> = surviving_indices
            .iter()
            .map(|&i| identifier(&documents[i]))
            .collect();
        self.cache.insert(key, identifiers);

        let mut by_index: Vec<Option<Document>> = documents.into_iter().map(Some).collect();
        Ok(surviving_indices
            .into_iter()
            .filter_map(|i| by_index[i].take())
            .collect())
    }
}

fn identifier(doc: &Document) -> String {
    doc.url().unwrap_or(&doc.id).to_string()
}

fn project_onto(order: &[String], documents: Vec<Document>) -> Vec<Document> {
    let mut by_identifier: std::collections::HashMap<String, Document> = documents
        .into_iter()
        .map(|doc| (identifier(&doc), doc))
        .collect();
    order
        .iter()
        .filter_map(|id| by_identifier.remove(id))
        .collect()
}

fn cache_key(query: &str, documents: &[Document], return_k: usize) -> String {
    let query_hash = sha256_hex(query.as_bytes());
    let joined: String = documents
        .iter()
        .map(|doc| doc.url().unwrap_or(&doc.id))
        .collect::<Vec<_>>()
        .join("|");
    let docs_hash = sha256_hex(joined.as_bytes());
    format!("{query_hash}{docs_hash}{return_k}")
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn build_prompt(query: &str, documents: &[Document]) -> String {
    let mut body = String::new();
    body.push_str(
        "You are ranking documentation search results. Prioritize domain relevance, \
         version relevance, source authority (official > vendor > other), stable over \
         preview content, and pedagogical value. Respond with a JSON object of the form \
         {\"order\": [indices]} listing candidate indices best-first.\n\n",
    );
    body.push_str(&format!("Query: {query}\n\nCandidates:\n"));
    for (i, doc) in documents.iter().enumerate() {
        let title = doc.metadata.title.as_deref().unwrap_or("untitled");
        let url = doc.url().unwrap_or("");
        let snippet: String = doc.text.chars().take(MAX_SNIPPET_CHARS).collect();
        body.push_str(&format!("[{i}] {title} | {url}\n{snippet}\n\n"));
    }
    body
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    /// `Option<i64>` rather than `i64`: a `null` entry in the model's
    /// `order` array is a candidate the model declined to place, not a
    /// parse failure — it is skipped rather than rejecting the whole
    /// response.
    order: Vec<Option<i64>>,
}

/// Extracts `{"order": [...]}` from the LLM response: prefer a fenced code
/// block if present, otherwise find the first balanced `{...}` by
/// brace-depth counting.
fn parse_order(response: &str) -> Option<Vec<Option<i64>>> {
    let candidate = extract_fenced_json(response).or_else(|| extract_balanced_braces(response))?;
    serde_json::from_str::<OrderResponse>(&candidate)
        .ok()
        .map(|r| r.order)
}

fn extract_fenced_json(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let after_fence = after_fence
        .find('\n')
        .map(|i| &after_fence[i + 1..])
        .unwrap_or(after_fence);
    let end = after_fence.find("```")?;
    Some(after_fence[..end].trim().to_string())
}

fn extract_balanced_braces(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragchat_core::DocumentMetadata;

    fn doc(id: &str, url: &str) -> Document {
        Document::new(id, format!("body for {id}"), 1.0, "c1").with_metadata(DocumentMetadata {
            url: Some(url.to_string()),
            title: Some(format!("title {id}")),
            ..Default::default()
        })
    }

    #[test]
    fn parses_fenced_json() {
        let response = "Here is the order:\n```json\n{\"order\": [2, 0, 1]}\n```\nThanks.";
        assert_eq!(parse_order(response), Some(vec![Some(2), Some(0), Some(1)]));
    }

    #[test]
    fn parses_balanced_braces_without_fence() {
        let clean = "the answer is {\"order\": [1, 0]} ok";
        assert_eq!(parse_order(clean), Some(vec![Some(1), Some(0)]));
    }

    #[test]
    fn parses_order_containing_a_null_entry() {
        let response = "{\"order\": [2, null, 0]}";
        assert_eq!(parse_order(response), Some(vec![Some(2), None, Some(0)]));
    }

    #[test]
    fn skips_null_negative_oob_and_duplicate_indices() {
        let docs = vec![doc("a", "u1"), doc("b", "u2")];
        let order: Vec<Option<i64>> = vec![Some(0), None, Some(-1), Some(5), Some(0), Some(1)];
        let mut seen = HashSet::new();
        let mut kept = Vec::new();
        for idx in order.into_iter().flatten() {
            if idx < 0 || idx as usize >= docs.len() {
                continue;
            }
            if seen.insert(idx) {
                kept.push(idx as usize);
            }
        }
        assert_eq!(kept, vec![0, 1]);
    }

    #[tokio::test]
    async fn rerank_keeps_surviving_prefix_when_response_contains_null() {
        struct NullOrderLlm;
        #[async_trait::async_trait]
        impl LlmClient for NullOrderLlm {
            async fn stream(
                &self,
                _prompt: &str,
                _temperature: f32,
            ) -> Result<ragchat_llm::TokenStream, ragchat_llm::LlmError> {
                unreachable!()
            }
            async fn complete(
                &self,
                _prompt: &str,
                _temperature: f32,
                _timeout: Duration,
            ) -> Result<String, ragchat_llm::LlmError> {
                Ok("{\"order\": [2, null, 0]}".to_string())
            }
            fn model_name(&self) -> &str {
                "null-order"
            }
        }

        let docs = vec![doc("a", "u1"), doc("b", "u2"), doc("c", "u3")];
        let reranker = Reranker::new(RerankerConfig::default(), Arc::new(NullOrderLlm));
        let ranked = reranker.rerank("q", docs, 5).await.unwrap();
        assert_eq!(
            ranked.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            vec!["c", "a"]
        );
    }

    #[test]
    fn cache_key_is_stable_for_same_inputs() {
        let docs = vec![doc("a", "u1")];
        let k1 = cache_key("q", &docs, 5);
        let k2 = cache_key("q", &docs, 5);
        assert_eq!(k1, k2);
    }

    #[test]
    fn project_onto_skips_missing_and_preserves_order() {
        let docs = vec![doc("a", "u1"), doc("b", "u2"), doc("c", "u3")];
        let order = vec!["u3".to_string(), "u1".to_string(), "u-gone".to_string()];
        let projected = project_onto(&order, docs);
        assert_eq!(
            projected.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
            vec!["c", "a"]
        );
    }

    #[tokio::test]
    async fn empty_input_returns_empty_without_calling_llm() {
        struct PanicLlm;
        #[async_trait::async_trait]
        impl LlmClient for PanicLlm {
            async fn stream(
                &self,
                _prompt: &str,
                _temperature: f32,
            ) -> Result<ragchat_llm::TokenStream, ragchat_llm::LlmError> {
                unreachable!()
            }
            async fn complete(
                &self,
                _prompt: &str,
                _temperature: f32,
                _timeout: Duration,
            ) -> Result<String, ragchat_llm::LlmError> {
                unreachable!()
            }
            fn model_name(&self) -> &str {
                "panic"
            }
        }

        let reranker = Reranker::new(RerankerConfig::default(), Arc::new(PanicLlm));
        let result = reranker.rerank("q", vec![], 5).await.unwrap();
        assert!(result.is_empty());
    }
}
