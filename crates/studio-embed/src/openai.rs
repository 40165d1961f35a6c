//! OpenAI-compatible embedding client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use studio_core::config::EmbeddingConfig;
use studio_core::http::{check_response, client, read_json, transport_error};
use studio_core::{Embedder, Result, RetryPolicy, StudioError};

const PROVIDER: &str = "openai-embeddings";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embedder backed by a hosted `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    retry: RetryPolicy,
}

impl OpenAiEmbedder {
    /// Create an embedder from configuration.
    pub fn new(api_key: impl Into<String>, config: &EmbeddingConfig) -> Result<Self> {
        info!(
            "Embedder initialized: model={}, dim={}, batch={}",
            config.model, config.dimension, config.batch_size
        );

        Ok(Self {
            client: client(Duration::from_secs(60))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            retry: RetryPolicy::rate_limited(),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One embeddings request, without retries.
    async fn request_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let resp = check_response(PROVIDER, resp).await?;
        let parsed: EmbeddingResponse = read_json(PROVIDER, resp).await?;
        into_vectors(parsed, texts.len(), self.dimension)
    }
}

/// Order the returned vectors by input index and validate their shape.
fn into_vectors(
    response: EmbeddingResponse,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(StudioError::embedding(format!(
            "Expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);

    data.into_iter()
        .map(|d| {
            if d.embedding.len() != dimension {
                return Err(StudioError::embedding(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    dimension,
                    d.embedding.len()
                )));
            }
            Ok(d.embedding)
        })
        .collect()
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_idx, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!("Embedding batch {}: size={}", batch_idx, batch.len());
            let batch_vectors = self
                .retry
                .run("embed", || self.request_batch(batch))
                .await?;
            vectors.extend(batch_vectors);
        }

        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_documents(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| StudioError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
