//! Embedding provider trait

use async_trait::async_trait;

use crate::error::Result;

/// Whether a text is embedded as a stored passage or a search query.
/// Asymmetric embedding models produce different vectors for each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingInput {
    /// Document chunk being indexed
    Passage,
    /// User question being searched
    Query,
}

impl EmbeddingInput {
    /// Wire value for OpenAI-compatible endpoints that accept `input_type`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passage => "passage",
            Self::Query => "query",
        }
    }
}

/// Trait for generating text embeddings
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts, one vector per input text,
    /// in input order.
    async fn embed_batch(&self, texts: &[String], input: EmbeddingInput) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .embed_batch(&[text.to_string()], EmbeddingInput::Query)
            .await?;
        vectors
            .pop()
            .ok_or_else(|| crate::error::Error::embedding("Empty embedding response"))
    }

    /// Fixed output dimensionality
    fn dimensions(&self) -> usize;

    /// Provider name for logging
    fn name(&self) -> &str;
}
