//! Process settings, loaded once at startup from environment variables layered
//! over built-in defaults.

use config::{Config, Environment};
use serde::{Deserialize, Serialize};

use crate::constants::{endpoints, retrieval, timeouts};
use crate::ConfigError;

/// Hybrid search tuning and the collections it fans out across.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Fixed set of collections queried in parallel for every request.
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,
    #[serde(default = "default_dense_vector_name")]
    pub dense_vector_name: String,
    #[serde(default = "default_bm25_vector_name")]
    pub bm25_vector_name: String,
    #[serde(default = "default_prefetch_limit")]
    pub prefetch_limit: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub fail_on_partial_search_error: bool,
    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,
    #[serde(default = "default_search_return_k")]
    pub search_return_k: usize,
    #[serde(default = "default_search_citations")]
    pub search_citations: usize,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            collections: default_collections(),
            dense_vector_name: default_dense_vector_name(),
            bm25_vector_name: default_bm25_vector_name(),
            prefetch_limit: default_prefetch_limit(),
            rrf_k: default_rrf_k(),
            query_timeout_ms: default_query_timeout_ms(),
            fail_on_partial_search_error: true,
            search_top_k: default_search_top_k(),
            search_return_k: default_search_return_k(),
            search_citations: default_search_citations(),
            embedding_dimension: default_embedding_dimension(),
            qdrant_url: default_qdrant_url(),
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
        }
    }
}

/// Reranker tuning: model, timeout, and the bounded result cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerSettings {
    #[serde(default = "default_reranker_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_reranker_cache_max_entries")]
    pub cache_max_entries: u64,
    #[serde(default = "default_reranker_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_reranker_model")]
    pub model: String,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_reranker_timeout_ms(),
            cache_max_entries: default_reranker_cache_max_entries(),
            cache_ttl_secs: default_reranker_cache_ttl_secs(),
            model: default_reranker_model(),
        }
    }
}

/// Per-model-family prompt token budgets, plus the Streaming Transport's
/// coalescing/heartbeat tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSettings {
    /// Budget for constrained model families (e.g. small-context models).
    #[serde(default = "default_constrained_budget")]
    pub constrained_token_budget: usize,
    /// Budget for everything else.
    #[serde(default = "default_token_budget")]
    pub default_token_budget: usize,
    /// Model name substrings that should use the constrained budget.
    #[serde(default = "default_constrained_model_markers")]
    pub constrained_model_markers: Vec<String>,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            constrained_token_budget: default_constrained_budget(),
            default_token_budget: default_token_budget(),
            constrained_model_markers: default_constrained_model_markers(),
        }
    }
}

impl PromptSettings {
    pub fn token_budget_for(&self, model: &str) -> usize {
        if self
            .constrained_model_markers
            .iter()
            .any(|marker| model.contains(marker.as_str()))
        {
            self.constrained_token_budget
        } else {
            self.default_token_budget
        }
    }
}

/// Streaming transport tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingSettings {
    #[serde(default = "default_coalesce_max_tokens")]
    pub coalesce_max_tokens: usize,
    #[serde(default = "default_coalesce_max_ms")]
    pub coalesce_max_ms: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_max_stream_retries")]
    pub max_stream_retries: u8,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            coalesce_max_tokens: default_coalesce_max_tokens(),
            coalesce_max_ms: default_coalesce_max_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            max_stream_retries: default_max_stream_retries(),
        }
    }
}

/// Session memory bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_session_max_turns")]
    pub max_turns: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_turns: default_session_max_turns(),
        }
    }
}

/// HTTP server bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// Top-level process settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub reranker: RerankerSettings,
    #[serde(default)]
    pub prompt: PromptSettings,
    #[serde(default)]
    pub streaming: StreamingSettings,
    #[serde(default)]
    pub session: SessionSettings,
    /// API key for the LLM client. Never logged; not included in `Debug` output
    /// by any caller that cares, though this type derives `Debug` for
    /// convenience in tests run without a real key.
    #[serde(default = "default_anthropic_api_key")]
    pub anthropic_api_key: String,
    #[serde(default = "endpoints_anthropic_base_url")]
    pub anthropic_base_url: String,
    /// Model used for the chat generation turn itself (distinct from
    /// `reranker.model`, which is typically a smaller/cheaper model).
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
}

/// Load settings from environment variables with a `RAGCHAT__` prefix
/// (double-underscore section separator), falling back to the built-in
/// defaults above for anything unset. Config *loading* is an ambient
/// necessity for running the service, not a feature under test; there is
/// deliberately no file-based layering or hot reload here.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let builder = Config::builder().add_source(
        Environment::with_prefix("RAGCHAT")
            .separator("__")
            .try_parsing(true),
    );
    let config = builder.build()?;
    // `try_deserialize` on an empty source still resolves every field via its
    // `#[serde(default = ...)]`, so an unconfigured environment is valid.
    let settings: Settings = config.try_deserialize().unwrap_or_default();
    Ok(settings)
}

fn default_true() -> bool {
    true
}
fn default_collections() -> Vec<String> {
    vec!["java_docs".to_string(), "java_tutorials".to_string()]
}
fn default_dense_vector_name() -> String {
    "dense".to_string()
}
fn default_bm25_vector_name() -> String {
    "bm25".to_string()
}
fn default_prefetch_limit() -> usize {
    retrieval::PREFETCH_LIMIT
}
fn default_rrf_k() -> f32 {
    retrieval::RRF_K
}
fn default_query_timeout_ms() -> u64 {
    timeouts::QUERY_TIMEOUT_MS
}
fn default_search_top_k() -> usize {
    retrieval::SEARCH_TOP_K
}
fn default_search_return_k() -> usize {
    retrieval::SEARCH_RETURN_K
}
fn default_search_citations() -> usize {
    retrieval::SEARCH_CITATIONS
}
fn default_embedding_dimension() -> usize {
    retrieval::EMBEDDING_DIMENSION
}
fn default_qdrant_url() -> String {
    endpoints::qdrant_url().to_string()
}
fn default_embedding_url() -> String {
    endpoints::embedding_url().to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_reranker_timeout_ms() -> u64 {
    timeouts::RERANKER_TIMEOUT_MS
}
fn default_reranker_cache_max_entries() -> u64 {
    10_000
}
fn default_reranker_cache_ttl_secs() -> u64 {
    1_800
}
fn default_reranker_model() -> String {
    "claude-haiku-4-5".to_string()
}
fn default_constrained_budget() -> usize {
    7_000
}
fn default_token_budget() -> usize {
    100_000
}
fn default_constrained_model_markers() -> Vec<String> {
    vec!["haiku".to_string()]
}
fn default_coalesce_max_tokens() -> usize {
    10
}
fn default_coalesce_max_ms() -> u64 {
    100
}
fn default_heartbeat_interval_secs() -> u64 {
    20
}
fn default_max_stream_retries() -> u8 {
    1
}
fn default_session_max_turns() -> usize {
    40
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn endpoints_anthropic_base_url() -> String {
    endpoints::anthropic_base_url().to_string()
}
fn default_anthropic_api_key() -> String {
    std::env::var("ANTHROPIC_API_KEY").unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_populate_every_field() {
        let settings = Settings::default();
        assert_eq!(settings.retrieval.prefetch_limit, 20);
        assert!(settings.retrieval.fail_on_partial_search_error);
        assert_eq!(settings.prompt.constrained_token_budget, 7_000);
        assert_eq!(settings.prompt.default_token_budget, 100_000);
    }

    #[test]
    fn token_budget_selects_constrained_family() {
        let prompt = PromptSettings::default();
        assert_eq!(prompt.token_budget_for("claude-haiku-4-5"), 7_000);
        assert_eq!(prompt.token_budget_for("claude-opus-4-5"), 100_000);
    }

    #[test]
    fn load_settings_succeeds_with_empty_environment() {
        let settings = load_settings().expect("defaults must be loadable");
        assert_eq!(settings.server.port, 8080);
    }
}
