//! LLM client trait and a streaming Claude (Anthropic Messages API) backend.
//!
//! Two operations only, per the spec's external interface: `stream` for the
//! chat turn (token-by-token), `complete` for the reranker's single blocking
//! call. No cross-provider failover lives here — a provider error propagates
//! directly to the caller (spec §1 Non-goals).

pub mod backend;
pub mod claude;

pub use backend::{LlmClient, TokenStream};
pub use claude::{ClaudeClient, ClaudeConfig, ClaudeModel};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),
    #[error("http {status}: {body}")]
    Api { status: u16, body: String },
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("stream protocol error: {0}")]
    StreamProtocol(String),
}

impl LlmError {
    /// True for the transient upstream failures the streaming layer is allowed
    /// to retry before any `text` event has reached the client: malformed
    /// upstream frames, network resets, and gateway 5xx. Rate-limit and auth
    /// errors are never retried (spec §7).
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::StreamProtocol(_) | LlmError::Network(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::Timeout(_) | LlmError::InvalidResponse(_) | LlmError::Configuration(_) => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for ragchat_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::StreamProtocol(m) => ragchat_core::Error::StreamProtocolError(m),
            other => ragchat_core::Error::Llm(other.to_string()),
        }
    }
}
