//! NVIDIA NIM embedding client (OpenAI-compatible embeddings API)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

use super::embedding::{EmbeddingInput, EmbeddingProvider};
use super::retry::{with_retries, CallError};

/// Embedding client for an OpenAI-compatible `/embeddings` endpoint.
///
/// The NIM embedding models are asymmetric and take an `input_type` field
/// distinguishing stored passages from search queries.
pub struct NimEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

#[derive(Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
    encoding_format: &'static str,
    input_type: &'static str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl NimEmbedder {
    /// Create a new embedder from config
    pub fn new(config: &EmbeddingConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config: config.clone(),
        }
    }

    /// Embed one request-sized batch (at most `batch_size` texts)
    async fn embed_request(&self, texts: &[String], input: EmbeddingInput) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url);
        let model = self.config.model.clone();
        let api_key = self.config.api_key.clone();
        let client = self.client.clone();
        let input_type = input.as_str();
        let batch: Vec<String> = texts.to_vec();

        let result = with_retries(&self.config.retry, "embedding request", || {
            let url = url.clone();
            let model = model.clone();
            let api_key = api_key.clone();
            let client = client.clone();
            let input = batch.clone();

            async move {
                let request = EmbeddingsRequest {
                    model,
                    input,
                    encoding_format: "float",
                    input_type,
                };

                let response = client
                    .post(&url)
                    .bearer_auth(&api_key)
                    .json(&request)
                    .send()
                    .await
                    .map_err(CallError::transport)?;

                let status = response.status();
                if status.is_server_error() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(CallError::Transient(format!("HTTP {} - {}", status, body)));
                }
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(CallError::Permanent(Error::embedding(format!(
                        "HTTP {} - {}",
                        status, body
                    ))));
                }

                let parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
                    CallError::Permanent(Error::embedding(format!(
                        "Failed to parse embedding response: {}",
                        e
                    )))
                })?;

                Ok(parsed)
            }
        })
        .await;

        let mut parsed = match result {
            Ok(parsed) => parsed,
            Err(CallError::Permanent(e)) => return Err(e),
            Err(CallError::Transient(message)) => return Err(Error::embedding(message)),
        };

        if parsed.data.len() != texts.len() {
            return Err(Error::embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // The API may return entries out of order; the index field is
        // authoritative.
        parsed.data.sort_by_key(|d| d.index);

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();

        for vector in &vectors {
            if vector.len() != self.config.dimensions {
                return Err(Error::embedding(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.config.dimensions,
                    vector.len()
                )));
            }
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for NimEmbedder {
    async fn embed_batch(&self, texts: &[String], input: EmbeddingInput) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.config.batch_size.max(1);
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(batch_size) {
            vectors.extend(self.embed_request(batch, input).await?);
        }

        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "nim"
    }
}
