//! Configuration for the RAG service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RagConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Embedding endpoint configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Answer generation configuration
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Vector index configuration
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Metadata/history store configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Upload processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file, then fill secrets from the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Fill empty credentials and endpoints from environment variables
    fn apply_env(&mut self) {
        fill_from_env(&mut self.embedding.api_key, &["NVIDIA_API_KEY"]);
        fill_from_env(&mut self.generation.rag.api_key, &["GROQ_API_KEY"]);
        fill_from_env(
            &mut self.generation.general.api_key,
            &["NVIDIA_API_KEY_KIMI", "NVIDIA_API_KEY"],
        );
        fill_from_env(
            &mut self.generation.vision.api_key,
            &["NVIDIA_API_KEY_KIMI", "NVIDIA_API_KEY"],
        );
        fill_from_env(&mut self.vector_index.url, &["QDRANT_URL"]);
        fill_from_env(&mut self.vector_index.api_key, &["QDRANT_KEY"]);
    }
}

fn fill_from_env(target: &mut String, vars: &[&str]) {
    if !target.is_empty() {
        return;
    }
    for var in vars {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                *target = value;
                return;
            }
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            max_upload_size: 50 * 1024 * 1024,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk size in words
    pub max_chunk_words: usize,
    /// Overlap carried between adjacent chunks, in words
    pub overlap_words: usize,
    /// Chunks below this size are dropped (unless they are the only chunk)
    pub min_chunk_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_words: 320,
            overlap_words: 40,
            min_chunk_words: 25,
        }
    }
}

/// Retry policy for an external-call wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Base delay before the first retry
    pub base_delay_ms: u64,
    /// Ceiling for the exponential backoff
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryConfig {
    /// Backoff delay after the given zero-based attempt
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let exp = 2u64.saturating_pow(attempt);
        let ms = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        std::time::Duration::from_millis(ms)
    }
}

/// Embedding endpoint configuration (OpenAI-compatible embeddings API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the embeddings API
    pub base_url: String,
    /// API key (filled from NVIDIA_API_KEY when empty)
    #[serde(default)]
    pub api_key: String,
    /// Embedding model name
    pub model: String,
    /// Embedding dimensions for the tenant collections
    pub dimensions: usize,
    /// Maximum texts per embedding request
    pub batch_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retry policy for embedding requests
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            api_key: String::new(),
            model: "nvidia/llama-nemotron-embed-vl-1b-v2".to_string(),
            dimensions: 2048,
            batch_size: 32,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// One chat-completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEndpoint {
    /// Base URL of the chat-completions API
    pub base_url: String,
    /// API key (filled from the environment when empty)
    #[serde(default)]
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Answer generation configuration: dual backends plus vision transcription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// RAG backend, tuned for low-latency factual synthesis over context
    pub rag: ModelEndpoint,
    /// General backend, tuned for open-ended conversation
    pub general: ModelEndpoint,
    /// Vision backend for image transcription during ingestion
    pub vision: ModelEndpoint,
    /// Prior conversation turns included in the prompt
    pub history_turns: usize,
    /// Retry policy for generation requests. The user waits synchronously,
    /// so this defaults to a single retry.
    #[serde(default = "default_generation_retry")]
    pub retry: RetryConfig,
}

fn default_generation_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_delay_ms: 500,
        max_delay_ms: 2_000,
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            rag: ModelEndpoint {
                base_url: "https://api.groq.com/openai/v1".to_string(),
                api_key: String::new(),
                model: "llama-3.3-70b-versatile".to_string(),
                temperature: 0.3,
                max_tokens: 1024,
                timeout_secs: 60,
            },
            general: ModelEndpoint {
                base_url: "https://integrate.api.nvidia.com/v1".to_string(),
                api_key: String::new(),
                model: "moonshotai/kimi-k2-instruct".to_string(),
                temperature: 0.3,
                max_tokens: 1024,
                timeout_secs: 120,
            },
            vision: ModelEndpoint {
                base_url: "https://integrate.api.nvidia.com/v1".to_string(),
                api_key: String::new(),
                model: "meta/llama-3.2-11b-vision-instruct".to_string(),
                temperature: 0.2,
                max_tokens: 4096,
                timeout_secs: 120,
            },
            history_turns: 6,
            retry: default_generation_retry(),
        }
    }
}

/// Vector index (Qdrant) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndexConfig {
    /// Qdrant base URL (filled from QDRANT_URL when empty)
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    /// Qdrant API key (filled from QDRANT_KEY when empty)
    #[serde(default)]
    pub api_key: String,
    /// Points per upsert request
    pub upsert_batch_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retry policy for index requests
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: String::new(),
            upsert_batch_size: 32,
            timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per question
    pub top_k: usize,
    /// Minimum similarity for a chunk to be used as context
    pub relevance_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            relevance_threshold: 0.30,
        }
    }
}

/// Metadata/history store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let database_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tenant-rag")
            .join("metadata.db");
        Self { database_path }
    }
}

/// Upload processing configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProcessingConfig {
    /// Concurrent embedding batches per upload (default: CPU count, max 4)
    pub parallel_embed_batches: Option<usize>,
}

impl ProcessingConfig {
    /// Effective embedding parallelism
    pub fn embed_parallelism(&self) -> usize {
        self.parallel_embed_batches
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_is_capped() {
        let retry = RetryConfig {
            max_attempts: 10,
            base_delay_ms: 500,
            max_delay_ms: 4_000,
        };
        assert_eq!(retry.delay_for(0).as_millis(), 500);
        assert_eq!(retry.delay_for(1).as_millis(), 1_000);
        assert_eq!(retry.delay_for(6).as_millis(), 4_000);
    }

    #[test]
    fn test_defaults_are_consistent() {
        let config = RagConfig::default();
        assert!(config.chunking.overlap_words < config.chunking.max_chunk_words);
        assert_eq!(config.generation.retry.max_attempts, 2);
        assert!(config.embedding.batch_size > 0);
    }
}
