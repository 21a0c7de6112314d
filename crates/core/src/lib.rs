//! Shared types, error handling, and session memory for the RAG chat core.
//!
//! This crate provides the foundational pieces used by every other crate in the
//! workspace:
//! - the data model (`Document`, `SparseVector`, `ScoredPoint`, `Citation`, prompt
//!   segments),
//! - the crate-wide error type,
//! - token estimation,
//! - the chat session memory trait and its in-process implementation.

pub mod error;
pub mod session;
pub mod tokens;
pub mod types;

pub use error::{Error, Result};
pub use session::{InMemorySessionStore, SessionStore, Turn, TurnRole};
pub use tokens::estimate_tokens;
pub use types::{
    Citation, Document, DocumentMetadata, Priority, PromptSegment, ScoredPoint, SparseVector,
};
