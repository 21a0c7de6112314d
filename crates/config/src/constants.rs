//! Env-var-backed default endpoints, read once and cached for the process
//! lifetime. Grounded in the same "Lazy-initialized constant with an env var
//! override" idiom the rest of this codebase uses for external endpoints.

use std::env;
use std::sync::OnceLock;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// External service endpoints, resolved from the environment with sane local
/// defaults.
pub mod endpoints {
    use super::*;

    static QDRANT: OnceLock<String> = OnceLock::new();
    static ANTHROPIC: OnceLock<String> = OnceLock::new();
    static EMBEDDING: OnceLock<String> = OnceLock::new();

    pub fn qdrant_url() -> &'static str {
        QDRANT.get_or_init(|| env_or("QDRANT_URL", "http://localhost:6334"))
    }

    pub fn anthropic_base_url() -> &'static str {
        ANTHROPIC.get_or_init(|| env_or("ANTHROPIC_BASE_URL", "https://api.anthropic.com"))
    }

    pub fn embedding_url() -> &'static str {
        EMBEDDING.get_or_init(|| env_or("EMBEDDING_URL", "http://localhost:11434/api/embed"))
    }
}

/// Timeout defaults, in milliseconds, used when a setting is not explicitly
/// configured.
pub mod timeouts {
    pub const QUERY_TIMEOUT_MS: u64 = 5_000;
    pub const RERANKER_TIMEOUT_MS: u64 = 12_000;
}

/// Retrieval tuning defaults.
pub mod retrieval {
    pub const PREFETCH_LIMIT: usize = 20;
    pub const RRF_K: f32 = 60.0;
    pub const SEARCH_TOP_K: usize = 20;
    pub const SEARCH_RETURN_K: usize = 8;
    pub const SEARCH_CITATIONS: usize = 5;
    pub const EMBEDDING_DIMENSION: usize = 1536;
}
