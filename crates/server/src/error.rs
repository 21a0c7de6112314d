//! Maps `ragchat_core::Error` onto an HTTP status code and JSON body at the
//! single outermost boundary (per SPEC_FULL.md §7's ambient error-type note).
//! Errors surfaced before an SSE stream is opened become ordinary JSON error
//! responses; once a stream is open, a failure becomes an `error` SSE event
//! instead (handled in `http::chat_stream`, not here).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use ragchat_core::Error as CoreError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Thin wrapper so `?` works in axum handlers returning `Result<_, ApiError>`.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::EmbeddingUnavailable(_) => StatusCode::BAD_GATEWAY,
        CoreError::HybridSearchPartialFailure(_) => StatusCode::BAD_GATEWAY,
        CoreError::HybridSearchTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CoreError::RerankingFailure(_) => StatusCode::BAD_GATEWAY,
        CoreError::PromptTooSmall => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::StreamProtocolError(_) => StatusCode::BAD_GATEWAY,
        CoreError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::VectorStore(_) => StatusCode::BAD_GATEWAY,
        CoreError::Rag(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::Llm(_) => StatusCode::BAD_GATEWAY,
        CoreError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn kind_label(err: &CoreError) -> &'static str {
    match err {
        CoreError::EmbeddingUnavailable(_) => "embedding_unavailable",
        CoreError::HybridSearchPartialFailure(_) => "hybrid_search_partial_failure",
        CoreError::HybridSearchTimeout(_) => "hybrid_search_timeout",
        CoreError::RerankingFailure(_) => "reranking_failure",
        CoreError::PromptTooSmall => "prompt_too_small",
        CoreError::StreamProtocolError(_) => "stream_protocol_error",
        CoreError::SessionNotFound(_) => "session_not_found",
        CoreError::VectorStore(_) => "vector_store_error",
        CoreError::Rag(_) => "rag_error",
        CoreError::Llm(_) => "llm_error",
        CoreError::Configuration(_) => "configuration_error",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        tracing::error!(kind = kind_label(&self.0), error = %self.0, "request failed");
        let body = ErrorBody {
            error: kind_label(&self.0).to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
