//! Embedding Client: maps text to a dense vector of fixed dimension.
//!
//! This is an external collaborator per the spec — the core only consumes the
//! `embed(text) -> float[dim]` interface. No runtime fallback exists for a
//! failed embedding call; callers propagate `RagError::Embedding` (which bridges
//! to `ragchat_core::Error::EmbeddingUnavailable`) rather than substituting a
//! default vector.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::RagError;

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;
    fn dimension(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimension: usize,
}

impl Default for HttpEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/api/embed".to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
            dimension: 1536,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedding client backed by an HTTP embedding provider (Ollama-shaped wire
/// format, the teacher's own `/api/embed` contract in `ollama_embeddings.rs`).
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    config: HttpEmbeddingConfig,
}

impl HttpEmbeddingClient {
    pub fn new(config: HttpEmbeddingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&EmbedRequest {
                model: &self.config.model,
                input: text,
            })
            .send()
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!("HTTP {status}: {body}")));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        let embedding = parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("empty embeddings array".to_string()))?;

        if embedding.len() != self.config.dimension {
            return Err(RagError::Embedding(format!(
                "expected dimension {}, got {}",
                self.config.dimension,
                embedding.len()
            )));
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_has_sane_dimension() {
        let config = HttpEmbeddingConfig::default();
        assert_eq!(config.dimension, 1536);
    }
}
