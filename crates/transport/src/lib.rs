//! Streaming Transport: consumes the model's token stream, coalesces tokens,
//! normalizes token-join artifacts, frames server-sent events, injects
//! heartbeats, persists the processed final assistant turn, and emits a
//! terminal citation event.
//!
//! Grounded in the teacher's `handle_ptt_stream` (`ptt.rs`): a channel-fed
//! producer task plus `Sse::new(ReceiverStream::new(rx)).keep_alive(...)`,
//! generalized from a fixed voice-pipeline event sequence to the spec's
//! typed `status`/`text`/`citation`/`error` events over an arbitrary LLM
//! token stream.

pub mod sse;

pub use sse::{
    join_normalize, stream_chat_response, FinalTextProcessor, PassthroughProcessor,
    TransportConfig, TransportEvent,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("upstream stream error: {0}")]
    Upstream(String),
}

impl From<TransportError> for ragchat_core::Error {
    fn from(err: TransportError) -> Self {
        ragchat_core::Error::StreamProtocolError(err.to_string())
    }
}
