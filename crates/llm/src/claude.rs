//! Claude backend: the Anthropic Messages API, consumed via the `LlmClient`
//! interface. Grounded in the teacher's `ClaudeBackend`/`ClaudeConfig` (request
//! building, SSE buffering loop over `ClaudeStreamEvent`), trimmed to the
//! `stream`/`complete` surface this crate exposes — no tool-use, no
//! multi-provider abstraction.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::backend::{LlmClient, TokenStream};
use crate::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaudeModel {
    Opus,
    Sonnet,
    Haiku,
}

impl ClaudeModel {
    pub fn model_id(&self) -> &'static str {
        match self {
            ClaudeModel::Opus => "claude-opus-4-5",
            ClaudeModel::Sonnet => "claude-sonnet-4-5",
            ClaudeModel::Haiku => "claude-haiku-4-5",
        }
    }

    pub fn from_str(s: &str) -> Self {
        if s.contains("opus") {
            ClaudeModel::Opus
        } else if s.contains("haiku") {
            ClaudeModel::Haiku
        } else {
            ClaudeModel::Sonnet
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: usize,
}

impl ClaudeConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            max_tokens: 4096,
        }
    }
}

pub struct ClaudeClient {
    config: ClaudeConfig,
    client: Client,
}

impl ClaudeClient {
    pub fn new(config: ClaudeConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::Configuration(
                "anthropic api key not set".to_string(),
            ));
        }
        Ok(Self {
            client: Client::new(),
            config,
        })
    }

    fn request_body(&self, prompt: &str, temperature: f32, stream: bool) -> ClaudeRequest {
        ClaudeRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature,
            stream,
        }
    }
}

#[async_trait]
impl LlmClient for ClaudeClient {
    async fn stream(&self, prompt: &str, temperature: f32) -> Result<TokenStream, LlmError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&self.request_body(prompt, temperature, true))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(LlmError::Network(e.to_string()));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer = buffer[line_end + 1..].to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let Some(json_str) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let event: ClaudeStreamEvent = match serde_json::from_str(json_str) {
                        Ok(event) => event,
                        Err(_) => continue,
                    };
                    if let ClaudeStreamEvent::ContentBlockDelta { delta: ClaudeDelta::TextDelta { text }, .. } = event {
                        yield Ok(text);
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let request = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&self.request_body(prompt, temperature, false))
            .send();

        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| LlmError::Timeout(timeout))??;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let body: ClaudeApiResponse = tokio::time::timeout(timeout, response.json())
            .await
            .map_err(|_| LlmError::Timeout(timeout))?
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(body
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: usize,
    messages: Vec<ClaudeMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeApiResponse {
    content: Vec<ClaudeContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeStreamEvent {
    MessageStart,
    ContentBlockStart,
    ContentBlockDelta { delta: ClaudeDelta },
    ContentBlockStop,
    MessageDelta,
    MessageStop,
    Ping,
    Error { error: ClaudeErrorBody },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorBody {
    #[allow(dead_code)]
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_ids() {
        assert_eq!(ClaudeModel::Opus.model_id(), "claude-opus-4-5");
        assert_eq!(ClaudeModel::Sonnet.model_id(), "claude-sonnet-4-5");
        assert_eq!(ClaudeModel::Haiku.model_id(), "claude-haiku-4-5");
    }

    #[test]
    fn model_from_str_defaults_to_sonnet() {
        assert_eq!(ClaudeModel::from_str("claude-opus-4-5"), ClaudeModel::Opus);
        assert_eq!(ClaudeModel::from_str("claude-haiku-4-5"), ClaudeModel::Haiku);
        assert_eq!(ClaudeModel::from_str("anything-else"), ClaudeModel::Sonnet);
    }

    #[test]
    fn construction_requires_an_api_key() {
        let config = ClaudeConfig::new("", "https://api.anthropic.com", "claude-sonnet-4-5");
        assert!(ClaudeClient::new(config).is_err());
    }

    #[test]
    fn stream_event_text_delta_parses() {
        let json = r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"hi"}}"#;
        let event: ClaudeStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            ClaudeStreamEvent::ContentBlockDelta { delta: ClaudeDelta::TextDelta { text } } => {
                assert_eq!(text, "hi");
            }
            _ => panic!("expected content_block_delta"),
        }
    }

    #[test]
    fn response_parsing_joins_text_blocks() {
        let json = r#"{"content":[{"type":"text","text":"Hello"},{"type":"text","text":" world"}]}"#;
        let response: ClaudeApiResponse = serde_json::from_str(json).unwrap();
        let joined: String = response.content.into_iter().map(|b| b.text).collect();
        assert_eq!(joined, "Hello world");
    }
}
