//! Application state for the RAG server

use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;
use crate::generation::AnswerGenerator;
use crate::pipeline::{QuestionPipeline, UploadPipeline};
use crate::providers::{
    ChatCompletionsClient, EmbeddingProvider, NimEmbedder, QdrantGateway, VectorIndexProvider,
    VisionExtractor,
};
use crate::storage::MetadataStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Metadata and history store
    store: Arc<MetadataStore>,
    /// Embedding provider
    embedder: Arc<dyn EmbeddingProvider>,
    /// Vector index gateway
    index: Arc<dyn VectorIndexProvider>,
    /// Vision transcription for image uploads
    vision: Arc<dyn VisionExtractor>,
    /// Dual-backend answer generator
    generator: Arc<AnswerGenerator>,
}

impl AppState {
    /// Create new application state, wiring all providers from config
    pub fn new(config: RagConfig) -> Result<Self> {
        tracing::info!("Initializing RAG application state...");

        let store = Arc::new(MetadataStore::open(&config.storage.database_path)?);
        tracing::info!(
            "Metadata store opened at {}",
            config.storage.database_path.display()
        );

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(NimEmbedder::new(&config.embedding));
        tracing::info!(
            "Embedder initialized ({}, {} dimensions)",
            config.embedding.model,
            config.embedding.dimensions
        );

        let index: Arc<dyn VectorIndexProvider> = Arc::new(QdrantGateway::new(
            &config.vector_index,
            config.embedding.dimensions,
        ));
        tracing::info!("Vector index gateway initialized ({})", config.vector_index.url);

        let rag_backend = Arc::new(ChatCompletionsClient::new(
            &config.generation.rag,
            &config.generation.retry,
        ));
        let general_backend = Arc::new(ChatCompletionsClient::new(
            &config.generation.general,
            &config.generation.retry,
        ));
        let vision: Arc<dyn VisionExtractor> = Arc::new(ChatCompletionsClient::new(
            &config.generation.vision,
            &config.generation.retry,
        ));
        tracing::info!(
            "Generation backends initialized (rag: {}, general: {}, vision: {})",
            config.generation.rag.model,
            config.generation.general.model,
            config.generation.vision.model
        );

        let generator = Arc::new(AnswerGenerator::new(
            rag_backend,
            general_backend,
            config.generation.history_turns,
        ));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                embedder,
                index,
                vision,
                generator,
            }),
        })
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    /// Get the metadata store
    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.inner.store
    }

    /// Get the vector index gateway
    pub fn index(&self) -> &Arc<dyn VectorIndexProvider> {
        &self.inner.index
    }

    /// Build an upload pipeline over the shared providers
    pub fn upload_pipeline(&self) -> UploadPipeline {
        UploadPipeline::new(
            Arc::clone(&self.inner.embedder),
            Arc::clone(&self.inner.index),
            Arc::clone(&self.inner.vision),
            Arc::clone(&self.inner.store),
            self.inner.config.chunking.clone(),
            self.inner.config.embedding.clone(),
            self.inner.config.processing.clone(),
        )
    }

    /// Build a question pipeline over the shared providers
    pub fn question_pipeline(&self) -> QuestionPipeline {
        QuestionPipeline::new(
            Arc::clone(&self.inner.embedder),
            Arc::clone(&self.inner.index),
            Arc::clone(&self.inner.generator),
            Arc::clone(&self.inner.store),
            self.inner.config.retrieval.clone(),
        )
    }
}
