//! The LLM client interface the core consumes: a token stream for chat turns,
//! and a single blocking completion for the reranker.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;

use crate::LlmError;

/// A boxed stream of incremental text deltas. Each item is one upstream token
/// or token fragment, in delivery order; the Streaming Transport coalesces
/// these before framing them as SSE events.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Streams a chat completion for `prompt` at `temperature`. The stream
    /// yields raw text deltas; cancelling the returned stream's consumer
    /// (dropping it) must stop the upstream request.
    async fn stream(&self, prompt: &str, temperature: f32) -> Result<TokenStream, LlmError>;

    /// A single non-streamed completion, used by the Reranker. Fails with
    /// `LlmError::Timeout` if `timeout` elapses before the upstream responds.
    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}
