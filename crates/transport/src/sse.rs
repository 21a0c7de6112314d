//! Token coalescing, join-normalization, and SSE event framing.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;

use ragchat_core::{Citation, SessionStore, TurnRole};
use ragchat_llm::{LlmClient, LlmError, TokenStream};

/// Punctuation/closing characters that attach tightly to a preceding word
/// with no intervening space, per the token-join normalization rules.
const TIGHT_ATTACH: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '"', '\'', '”', '’', '%'];

/// Appends `delta` onto `buffer`, collapsing whitespace at the junction when
/// the upcoming text attaches tightly (punctuation/closing brackets, or a
/// hyphen continuing a compound word after a letter). The whitespace causing
/// the join may live on either side of the boundary — trailing in `buffer`,
/// leading in `delta`, or both — so both are trimmed before the tight join.
pub fn join_normalize(buffer: &mut String, delta: &str) {
    if delta.is_empty() {
        return;
    }
    let leading_ws_len = delta.len() - delta.trim_start().len();
    let trimmed = &delta[leading_ws_len..];
    let buffer_trailing_ws = buffer.len() - buffer.trim_end().len();

    if let Some(first) = trimmed.chars().next() {
        let is_tight_punct = TIGHT_ATTACH.contains(&first);
        let is_hyphen_attach = first == '-'
            && buffer
                .trim_end()
                .chars()
                .last()
                .map(char::is_alphabetic)
                .unwrap_or(false);

        if (buffer_trailing_ws > 0 || leading_ws_len > 0) && (is_tight_punct || is_hyphen_attach) {
            let keep_len = buffer.trim_end().len();
            buffer.truncate(keep_len);
            buffer.push_str(trimmed);
            return;
        }
    }

    buffer.push_str(delta);
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub coalesce_max_tokens: usize,
    pub coalesce_max_delay: Duration,
    pub heartbeat_interval: Duration,
    pub citation_top_n: usize,
    /// Bounded retry count (0-3, default 1) for a transient upstream failure
    /// that occurs before any `text` event has reached the client. Rate-limit
    /// and auth errors are never retried regardless of this setting (spec §7).
    pub max_stream_retries: u8,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            coalesce_max_tokens: 10,
            coalesce_max_delay: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(20),
            citation_top_n: 5,
            max_stream_retries: 1,
        }
    }
}

/// External final-text post-processor (a markdown renderer in production);
/// the transport's only contract with it is `raw -> processed`.
pub trait FinalTextProcessor: Send + Sync {
    fn process(&self, raw: &str) -> String;
}

pub struct PassthroughProcessor;

impl FinalTextProcessor for PassthroughProcessor {
    fn process(&self, raw: &str) -> String {
        raw.to_string()
    }
}

#[derive(Debug, Serialize)]
struct StatusPayload<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct TextPayload<'a> {
    text: &'a str,
}

pub enum TransportEvent {
    Status { message: String, details: Option<String> },
    Text(String),
    Citation(Vec<Citation>),
    Error { message: String, details: Option<String> },
}

impl TransportEvent {
    fn into_sse_event(self) -> Event {
        match self {
            TransportEvent::Status { message, details } => Event::default()
                .event("status")
                .data(
                    serde_json::to_string(&StatusPayload {
                        message: &message,
                        details: details.as_deref(),
                    })
                    .unwrap_or_default(),
                ),
            TransportEvent::Text(text) => Event::default()
                .event("text")
                .data(serde_json::to_string(&TextPayload { text: &text }).unwrap_or_default()),
            TransportEvent::Citation(citations) => Event::default()
                .event("citation")
                .data(serde_json::to_string(&citations).unwrap_or_default()),
            TransportEvent::Error { message, details } => Event::default()
                .event("error")
                .data(
                    serde_json::to_string(&StatusPayload {
                        message: &message,
                        details: details.as_deref(),
                    })
                    .unwrap_or_default(),
                ),
        }
    }
}

/// Batches raw upstream token deltas into at-most-`max_tokens`/`max_delay`
/// chunks, join-normalizing against one running buffer so a correction
/// (e.g. stripping a trailing space before punctuation) never spans two
/// already-flushed chunks: a chunk that currently ends in whitespace is held
/// past the token-count cap until either it resolves or the delay elapses.
fn coalesce_and_normalize(
    mut input: TokenStream,
    max_tokens: usize,
    max_delay: Duration,
) -> impl Stream<Item = Result<String, LlmError>> + Send {
    async_stream::stream! {
        let mut buffer = String::new();
        let mut flushed_len = 0usize;
        let mut pending_tokens = 0usize;
        let deadline = tokio::time::sleep(max_delay);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                next = input.next() => {
                    match next {
                        Some(Ok(token)) => {
                            join_normalize(&mut buffer, &token);
                            pending_tokens += 1;
                            let ready = pending_tokens >= max_tokens
                                && !buffer.ends_with(char::is_whitespace);
                            if ready {
                                let delta = buffer[flushed_len..].to_string();
                                flushed_len = buffer.len();
                                pending_tokens = 0;
                                deadline.as_mut().reset(tokio::time::Instant::now() + max_delay);
                                if !delta.is_empty() {
                                    yield Ok(delta);
                                }
                            }
                        }
                        Some(Err(e)) => {
                            yield Err(e);
                            return;
                        }
                        None => {
                            let delta = buffer[flushed_len..].to_string();
                            if !delta.is_empty() {
                                yield Ok(delta);
                            }
                            return;
                        }
                    }
                }
                _ = &mut deadline => {
                    let delta = buffer[flushed_len..].to_string();
                    flushed_len = buffer.len();
                    pending_tokens = 0;
                    deadline.as_mut().reset(tokio::time::Instant::now() + max_delay);
                    if !delta.is_empty() {
                        yield Ok(delta);
                    }
                }
            }
        }
    }
}

/// Runs one chat turn's full lifecycle against a channel of [`TransportEvent`]s:
/// opens the model's token stream (retrying a transient failure up to
/// `config.max_stream_retries` times as long as no `text` event has reached
/// the client yet), coalesces and emits it, persists the processed final
/// text, and emits the terminal citation event. Split out from
/// [`stream_chat_response`] so the retry/coalescing logic can be exercised in
/// tests without going through axum's SSE body framing.
async fn run_chat_turn(
    llm: Arc<dyn LlmClient>,
    prompt: String,
    temperature: f32,
    citations: Vec<Citation>,
    session_store: Arc<dyn SessionStore>,
    session_id: String,
    processor: Arc<dyn FinalTextProcessor>,
    config: TransportConfig,
    tx: tokio::sync::mpsc::Sender<TransportEvent>,
) {
    let mut attempt: u8 = 0;
    let mut full_text = String::new();
    let mut first_token_emitted = false;

    'retry: loop {
        let token_stream = match llm.stream(&prompt, temperature).await {
            Ok(stream) => stream,
            Err(e) if !first_token_emitted && e.is_transient() && attempt < config.max_stream_retries => {
                attempt += 1;
                tracing::warn!(attempt, error = %e, "retrying chat stream open after transient failure");
                continue 'retry;
            }
            Err(e) => {
                let _ = tx
                    .send(TransportEvent::Error { message: e.to_string(), details: None })
                    .await;
                return;
            }
        };

        let mut coalesced = coalesce_and_normalize(
            token_stream,
            config.coalesce_max_tokens,
            config.coalesce_max_delay,
        );

        loop {
            match coalesced.next().await {
                Some(Ok(delta)) => {
                    first_token_emitted = true;
                    full_text.push_str(&delta);
                    if tx.send(TransportEvent::Text(delta)).await.is_err() {
                        return;
                    }
                }
                Some(Err(e)) => {
                    if !first_token_emitted && e.is_transient() && attempt < config.max_stream_retries {
                        attempt += 1;
                        tracing::warn!(
                            attempt,
                            error = %e,
                            "retrying chat stream after transient mid-open failure"
                        );
                        full_text.clear();
                        continue 'retry;
                    }
                    let _ = tx
                        .send(TransportEvent::Error { message: e.to_string(), details: None })
                        .await;
                    return;
                }
                None => break,
            }
        }

        break;
    }

    let processed = processor.process(&full_text);
    session_store
        .append(&session_id, TurnRole::Assistant, processed)
        .await;

    let _ = tx.send(TransportEvent::Citation(citations)).await;
}

/// Drives one chat turn end to end over SSE. `citations` is precomputed by
/// the caller from the reranked documents (top `citation_top_n` per config).
pub fn stream_chat_response(
    llm: Arc<dyn LlmClient>,
    prompt: String,
    temperature: f32,
    citations: Vec<Citation>,
    session_store: Arc<dyn SessionStore>,
    session_id: String,
    processor: Arc<dyn FinalTextProcessor>,
    config: TransportConfig,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = tokio::sync::mpsc::channel::<TransportEvent>(32);

    let heartbeat_interval = config.heartbeat_interval;
    tokio::spawn(run_chat_turn(
        llm,
        prompt,
        temperature,
        citations,
        session_store,
        session_id,
        processor,
        config,
        tx,
    ));

    let event_stream =
        ReceiverStream::new(rx).map(|event| Ok::<Event, Infallible>(event.into_sse_event()));

    Sse::new(event_stream)
        .keep_alive(KeepAlive::new().interval(heartbeat_interval).text("heartbeat"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s5_token_join_normalization_example() {
        let tokens = ["bytecode", " ", ".", " Use", " general", " -purpose"];
        let mut buffer = String::new();
        for token in tokens {
            join_normalize(&mut buffer, token);
        }
        assert_eq!(buffer, "bytecode. Use general-purpose");
    }

    #[test]
    fn contraction_boundary_inserts_no_space() {
        let mut buffer = String::new();
        join_normalize(&mut buffer, "don");
        join_normalize(&mut buffer, "'t");
        assert_eq!(buffer, "don't");
    }

    #[test]
    fn plain_word_boundary_keeps_its_space() {
        let mut buffer = String::new();
        join_normalize(&mut buffer, "hello");
        join_normalize(&mut buffer, " world");
        assert_eq!(buffer, "hello world");
    }

    #[test]
    fn closing_paren_attaches_without_leading_space() {
        let mut buffer = String::new();
        join_normalize(&mut buffer, "(note");
        join_normalize(&mut buffer, " ");
        join_normalize(&mut buffer, ")");
        assert_eq!(buffer, "(note)");
    }

    #[tokio::test]
    async fn coalesced_stream_flushes_on_token_count() {
        let tokens: Vec<Result<String, LlmError>> =
            (0..12).map(|i| Ok(format!("w{i} "))).collect();
        let stream: TokenStream = Box::pin(futures::stream::iter(tokens));
        let mut out = coalesce_and_normalize(stream, 10, Duration::from_secs(10));
        let first_batch = out.next().await.unwrap().unwrap();
        assert_eq!(first_batch.matches(' ').count(), 10);
    }

    #[tokio::test]
    async fn coalesced_stream_propagates_upstream_error() {
        let tokens: Vec<Result<String, LlmError>> =
            vec![Ok("a".to_string()), Err(LlmError::Network("boom".to_string()))];
        let stream: TokenStream = Box::pin(futures::stream::iter(tokens));
        let mut out = coalesce_and_normalize(stream, 10, Duration::from_secs(10));
        assert!(out.next().await.unwrap().is_ok());
        assert!(out.next().await.unwrap().is_err());
    }

    /// An `LlmClient` whose first N calls to `stream` fail with a given
    /// error, then succeeds by yielding `remaining_tokens`.
    struct FlakyLlm {
        failures_left: std::sync::atomic::AtomicU8,
        remaining_tokens: Vec<&'static str>,
    }

    #[async_trait::async_trait]
    impl LlmClient for FlakyLlm {
        async fn stream(&self, _prompt: &str, _temperature: f32) -> Result<TokenStream, LlmError> {
            if self.failures_left.load(Ordering::Relaxed) > 0 {
                self.failures_left.fetch_sub(1, Ordering::Relaxed);
                return Err(LlmError::Network("connection reset".to_string()));
            }
            let tokens: Vec<Result<String, LlmError>> = self
                .remaining_tokens
                .iter()
                .map(|t| Ok(t.to_string()))
                .collect();
            Ok(Box::pin(futures::stream::iter(tokens)))
        }

        async fn complete(
            &self,
            _prompt: &str,
            _temperature: f32,
            _timeout: Duration,
        ) -> Result<String, LlmError> {
            unreachable!("not exercised by the streaming transport")
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    use std::sync::atomic::Ordering;

    async fn drain(rx: &mut tokio::sync::mpsc::Receiver<TransportEvent>) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn retries_transient_open_failure_before_first_token() {
        let llm: Arc<dyn LlmClient> = Arc::new(FlakyLlm {
            failures_left: std::sync::atomic::AtomicU8::new(1),
            remaining_tokens: vec!["hello", " world"],
        });
        let sessions = ragchat_core::InMemorySessionStore::new(10);
        let (tx, mut rx) = tokio::sync::mpsc::channel(32);

        run_chat_turn(
            llm,
            "prompt".to_string(),
            0.0,
            vec![],
            sessions.clone(),
            "s1".to_string(),
            Arc::new(PassthroughProcessor),
            TransportConfig {
                max_stream_retries: 1,
                coalesce_max_delay: Duration::from_millis(5),
                ..TransportConfig::default()
            },
            tx,
        )
        .await;

        let events = drain(&mut rx).await;
        assert!(events.iter().any(|e| matches!(e, TransportEvent::Text(_))));
        assert!(events.iter().any(|e| matches!(e, TransportEvent::Citation(_))));
        assert!(!events.iter().any(|e| matches!(e, TransportEvent::Error { .. })));
        assert_eq!(sessions.history("s1").await.len(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_exhausting_retries() {
        let llm: Arc<dyn LlmClient> = Arc::new(FlakyLlm {
            failures_left: std::sync::atomic::AtomicU8::new(5),
            remaining_tokens: vec!["unreachable"],
        });
        let sessions = ragchat_core::InMemorySessionStore::new(10);
        let (tx, mut rx) = tokio::sync::mpsc::channel(32);

        run_chat_turn(
            llm,
            "prompt".to_string(),
            0.0,
            vec![],
            sessions,
            "s1".to_string(),
            Arc::new(PassthroughProcessor),
            TransportConfig {
                max_stream_retries: 1,
                ..TransportConfig::default()
            },
            tx,
        )
        .await;

        let events = drain(&mut rx).await;
        assert!(events.iter().any(|e| matches!(e, TransportEvent::Error { .. })));
        assert!(!events.iter().any(|e| matches!(e, TransportEvent::Text(_))));
    }
}
