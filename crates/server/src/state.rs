//! Application State
//!
//! Shared, `Clone`-cheap handle to every collaborator a request handler needs:
//! the hybrid searcher, reranker, prompt assembler, LLM client, and session
//! store, plus the settings they were built from.

use std::sync::Arc;

use ragchat_config::Settings;
use ragchat_core::SessionStore;
use ragchat_llm::LlmClient;
use ragchat_rag::{HybridSearcher, PromptAssembler, Reranker};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub searcher: Arc<HybridSearcher>,
    pub reranker: Arc<Reranker>,
    pub prompt_assembler: Arc<PromptAssembler>,
    pub llm: Arc<dyn LlmClient>,
    pub sessions: Arc<dyn SessionStore>,
}

impl AppState {
    pub fn new(
        config: Arc<Settings>,
        searcher: Arc<HybridSearcher>,
        reranker: Arc<Reranker>,
        prompt_assembler: Arc<PromptAssembler>,
        llm: Arc<dyn LlmClient>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            searcher,
            reranker,
            prompt_assembler,
            llm,
            sessions,
        }
    }
}
