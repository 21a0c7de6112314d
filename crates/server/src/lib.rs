//! HTTP surface for the retrieval-augmented chat service.
//!
//! Exposes exactly the four endpoints named by the spec: the streaming chat
//! turn, a standalone citations lookup, session clear, and session
//! validation. Everything else (retrieval, rerank, prompt assembly,
//! streaming transport, session memory) lives in `ragchat-rag`,
//! `ragchat-llm`, `ragchat-transport`, and `ragchat-core`; this crate only
//! wires those collaborators behind `AppState` and maps their errors onto
//! HTTP responses.

pub mod error;
pub mod http;
pub mod orchestrator;
pub mod state;

pub use error::ApiError;
pub use http::create_router;
pub use orchestrator::{assemble_chat_prompt, retrieve, RetrievalResult};
pub use state::AppState;
