//! Crate-wide error type.
//!
//! Every component funnels its failures into this single enum rather than returning
//! ad hoc strings, so call sites can propagate with `?` end to end. Each downstream
//! crate keeps its own `thiserror` enum for the detail of what went wrong internally
//! and bridges it here with a `From` impl (see `ragchat_rag::RagError`,
//! `ragchat_llm::LlmError`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Upstream embedding provider failed or returned a malformed vector. No
    /// fallback embedding is ever substituted.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// One or more collections failed under strict hybrid-search mode.
    #[error("hybrid search partial failure in collections: {0:?}")]
    HybridSearchPartialFailure(Vec<String>),

    /// The whole fan-out exceeded its deadline.
    #[error("hybrid search timed out after {0:?}")]
    HybridSearchTimeout(std::time::Duration),

    /// Reranker call failed: unreachable, timed out, unparseable response, or an
    /// empty order. Never silently substitutes input order.
    #[error("reranking failed: {0}")]
    RerankingFailure(String),

    /// System + query alone already exceed the prompt budget.
    #[error("prompt too small: system and query alone exceed the token budget")]
    PromptTooSmall,

    /// A malformed upstream stream frame. Recoverable only if no token has yet
    /// reached the client.
    #[error("stream protocol error: {0}")]
    StreamProtocolError(String),

    /// Returned by session validation; a session is never implicitly created.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("rag error: {0}")]
    Rag(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, Error>;
