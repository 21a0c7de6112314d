//! Hybrid retrieval for a programming-documentation corpus.
//!
//! Pipeline: version-hint extraction -> dense + sparse hybrid search fused by
//! RRF across a fixed collection set -> cross-collection dedup -> LLM
//! reranking -> priority-truncated prompt assembly. Each stage is its own
//! module so the orchestrator (in the server crate) can compose them.

pub mod dedupe;
pub mod embeddings;
pub mod prompt;
pub mod reranker;
pub mod retriever;
pub mod sparse;
pub mod version_hint;
pub mod vector_store;

pub use dedupe::dedupe;
pub use embeddings::{EmbeddingClient, HttpEmbeddingClient, HttpEmbeddingConfig};
pub use prompt::{PromptAssembler, PromptAssemblerConfig, SearchQualityLevel};
pub use reranker::{Reranker, RerankerConfig, RerankerStats};
pub use retriever::{HybridSearchOutcome, HybridSearcher, HybridSearcherConfig};
pub use sparse::SparseEncoder;
pub use vector_store::{MetadataFilter, QdrantVectorStore, VectorStoreConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("search error: {0}")]
    Search(String),

    /// Raised when `fail_on_partial_search_error` is set and at least one
    /// collection in the fan-out failed for a non-timeout reason; carries the
    /// names of the failing collections.
    #[error("search failed for collections: {0:?}")]
    HybridSearchPartialFailure(Vec<String>),

    /// Raised when `fail_on_partial_search_error` is set and every collection
    /// in the fan-out hit the shared `queryTimeout` deadline.
    #[error("hybrid search timed out after {0:?}")]
    HybridSearchTimeout(std::time::Duration),

    #[error("reranking error: {0}")]
    Reranking(String),

    #[error("prompt assembly error: {0}")]
    PromptTooSmall(String),

    #[error("connection error: {0}")]
    Connection(String),
}

impl From<RagError> for ragchat_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Embedding(m) => ragchat_core::Error::EmbeddingUnavailable(m),
            RagError::HybridSearchPartialFailure(collections) => {
                ragchat_core::Error::HybridSearchPartialFailure(collections)
            }
            RagError::HybridSearchTimeout(d) => ragchat_core::Error::HybridSearchTimeout(d),
            RagError::Reranking(m) => ragchat_core::Error::RerankingFailure(m),
            RagError::PromptTooSmall(_) => ragchat_core::Error::PromptTooSmall,
            other => ragchat_core::Error::Rag(other.to_string()),
        }
    }
}
