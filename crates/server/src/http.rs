//! HTTP Endpoints
//!
//! The four endpoints named by SPEC_FULL.md §6: the SSE streaming chat turn,
//! a standalone citations lookup, session clear, and session validation.
//!
//! Grounded in the teacher's `create_router`/`build_cors_layer` pattern
//! (`server/src/http.rs`): CORS built from configured origins rather than a
//! blanket `Any`, request tracing via `TraceLayer`, state injected via
//! `axum::extract::State`. Voice/session/tool/MCP/WebRTC/websocket routes
//! have no counterpart in SPEC_FULL.md and are dropped.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use ragchat_core::{Citation, TurnRole};
use ragchat_transport::{stream_chat_response, PassthroughProcessor, TransportConfig};

use crate::error::ApiError;
use crate::orchestrator::{assemble_chat_prompt, retrieve};
use crate::state::AppState;

/// Temperature for the generation turn itself. The spec pins the reranker's
/// LLM call to 0.0 (deterministic ranking); it does not pin this one, so a
/// conventional conversational default is used.
const CHAT_TEMPERATURE: f32 = 0.7;

pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/chat/citations", get(citations))
        .route("/api/chat/clear", post(clear_session))
        .route("/api/chat/session/validate", get(validate_session))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Builds a CORS layer from configured origins. An empty `cors_origins`
/// defaults to `http://localhost:3000` (the pack's own dev-frontend
/// convention), never to a wildcard `Any` — this service's responses carry
/// session-scoped data.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
                None
            }
        })
        .collect();

    let allowed = if parsed.is_empty() {
        vec!["http://localhost:3000".parse::<HeaderValue>().unwrap()]
    } else {
        parsed
    };

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatStreamRequest {
    session_id: String,
    latest: String,
}

/// `POST /api/chat/stream` — the only endpoint that generates. Retrieval
/// errors are surfaced as an ordinary JSON error response *before* the SSE
/// stream is opened (per §7's propagation policy: no partial stream is
/// opened when retrieval fails). Opening the upstream token stream happens
/// inside the Streaming Transport itself, which owns the bounded retry for a
/// transient failure before the first `text` event, plus framing,
/// heartbeats, and citation/error emission for the rest of the turn.
async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatStreamRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let span = tracing::info_span!("chat_stream", session_id = %request.session_id);
    let _enter = span.enter();

    let history = state.sessions.history(&request.session_id).await;
    let (prompt, citations) = assemble_chat_prompt(&state, &history, &request.latest).await?;

    if prompt.minimal {
        tracing::warn!("prompt budget could only fit SYSTEM + QUERY (minimal prompt)");
    }

    state
        .sessions
        .append(&request.session_id, TurnRole::User, request.latest.clone())
        .await;

    let transport_config = TransportConfig {
        coalesce_max_tokens: state.config.streaming.coalesce_max_tokens,
        coalesce_max_delay: Duration::from_millis(state.config.streaming.coalesce_max_ms),
        heartbeat_interval: Duration::from_secs(state.config.streaming.heartbeat_interval_secs),
        citation_top_n: state.config.retrieval.search_citations,
        max_stream_retries: state.config.streaming.max_stream_retries,
    };

    tracing::info!("opening chat stream");

    Ok(stream_chat_response(
        state.llm.clone(),
        prompt.render(),
        CHAT_TEMPERATURE,
        citations,
        state.sessions.clone(),
        request.session_id.clone(),
        Arc::new(PassthroughProcessor),
        transport_config,
    ))
}

#[derive(Debug, Deserialize)]
struct CitationsQuery {
    q: String,
}

/// `GET /api/chat/citations?q=...` — retrieval + rerank only, no generation.
async fn citations(
    State(state): State<AppState>,
    Query(params): Query<CitationsQuery>,
) -> Result<Json<Vec<Citation>>, ApiError> {
    let result = retrieve(&state, &params.q).await?;
    Ok(Json(result.citations))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionIdQuery {
    session_id: String,
}

/// `POST /api/chat/clear?sessionId=...` — removes the session if present.
async fn clear_session(
    State(state): State<AppState>,
    Query(params): Query<SessionIdQuery>,
) -> StatusCode {
    state.sessions.clear(&params.session_id).await;
    StatusCode::OK
}

#[derive(Debug, Serialize)]
struct ValidateResponse {
    exists: bool,
    message: String,
}

/// `GET /api/chat/session/validate?sessionId=...` — never creates a session.
/// A blank id is rejected with 400 before `exists` is ever consulted.
async fn validate_session(
    State(state): State<AppState>,
    Query(params): Query<SessionIdQuery>,
) -> Result<Json<ValidateResponse>, StatusCode> {
    if params.session_id.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let exists = state.sessions.exists(&params.session_id).await;
    let message = if exists {
        "session exists".to_string()
    } else {
        "session not found".to_string()
    };
    Ok(Json(ValidateResponse { exists, message }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_layer_defaults_to_localhost_when_unconfigured() {
        let _layer = build_cors_layer(&[]);
    }

    #[test]
    fn cors_layer_parses_configured_origins() {
        let _layer = build_cors_layer(&["https://docs.example.com".to_string()]);
    }

    #[test]
    fn cors_layer_skips_invalid_origins_without_panicking() {
        let _layer = build_cors_layer(&["not a valid header value \u{0}".to_string()]);
    }
}
