//! Retrieval-augmented chat service entry point: loads settings, wires every
//! collaborator behind `AppState`, and serves the HTTP surface with graceful
//! shutdown on Ctrl+C/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ragchat_config::{load_settings, Settings};
use ragchat_core::InMemorySessionStore;
use ragchat_llm::{ClaudeClient, ClaudeConfig, LlmClient};
use ragchat_rag::{
    HttpEmbeddingClient, HttpEmbeddingConfig, HybridSearcher, HybridSearcherConfig,
    PromptAssembler, PromptAssemblerConfig, Reranker, RerankerConfig, QdrantVectorStore,
    VectorStoreConfig,
};
use ragchat_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_settings().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load configuration: {e}. Using defaults.");
        Settings::default()
    });

    init_tracing();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting ragchat server");

    let state = build_state(config)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.server.port));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

fn build_state(config: Settings) -> Result<AppState, Box<dyn std::error::Error>> {
    let config = Arc::new(config);

    let store = Arc::new(QdrantVectorStore::connect(VectorStoreConfig {
        endpoint: config.retrieval.qdrant_url.clone(),
        api_key: None,
        dense_vector_name: config.retrieval.dense_vector_name.clone(),
        bm25_vector_name: config.retrieval.bm25_vector_name.clone(),
    })?);

    let embedder: Arc<dyn ragchat_rag::EmbeddingClient> = Arc::new(HttpEmbeddingClient::new(
        HttpEmbeddingConfig {
            endpoint: config.retrieval.embedding_url.clone(),
            model: config.retrieval.embedding_model.clone(),
            api_key: None,
            dimension: config.retrieval.embedding_dimension,
        },
    ));

    let searcher = Arc::new(HybridSearcher::new(
        HybridSearcherConfig {
            collections: config.retrieval.collections.clone(),
            prefetch_limit: config.retrieval.prefetch_limit,
            rrf_k: config.retrieval.rrf_k,
            query_timeout: Duration::from_millis(config.retrieval.query_timeout_ms),
            fail_on_partial_search_error: config.retrieval.fail_on_partial_search_error,
            search_top_k: config.retrieval.search_top_k,
        },
        embedder,
        store,
    ));

    let reranker_llm: Arc<dyn LlmClient> = Arc::new(ClaudeClient::new(ClaudeConfig::new(
        config.anthropic_api_key.clone(),
        config.anthropic_base_url.clone(),
        config.reranker.model.clone(),
    ))?);
    let reranker = Arc::new(Reranker::new(
        RerankerConfig {
            timeout: Duration::from_millis(config.reranker.timeout_ms),
            cache_max_entries: config.reranker.cache_max_entries,
            cache_ttl: Duration::from_secs(config.reranker.cache_ttl_secs),
            model: config.reranker.model.clone(),
        },
        reranker_llm,
    ));

    let prompt_assembler = Arc::new(PromptAssembler::new(PromptAssemblerConfig {
        token_budget: config.prompt.token_budget_for(&config.chat_model),
    }));

    let chat_llm: Arc<dyn LlmClient> = Arc::new(ClaudeClient::new(ClaudeConfig::new(
        config.anthropic_api_key.clone(),
        config.anthropic_base_url.clone(),
        config.chat_model.clone(),
    ))?);

    let sessions = InMemorySessionStore::new(config.session.max_turns);

    Ok(AppState::new(
        config,
        searcher,
        reranker,
        prompt_assembler,
        chat_llm,
        sessions,
    ))
}

/// Console-only structured logging: `tracing-subscriber`'s `fmt` layer plus an
/// `EnvFilter` read from `RUST_LOG`, defaulting to info-level for this
/// service and warn-level for its dependencies.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ragchat=info,tower_http=warn".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().boxed())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
