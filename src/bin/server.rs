//! RAG server binary
//!
//! Run with: cargo run --bin tenant-rag-server [config.toml]

use std::path::PathBuf;

use tenant_rag::{config::RagConfig, server::RagServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tenant_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path: Option<PathBuf> = std::env::args().nth(1).map(PathBuf::from);
    let config = RagConfig::load(config_path.as_deref())?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedding model: {}", config.embedding.model);
    tracing::info!("  - Embedding dimensions: {}", config.embedding.dimensions);
    tracing::info!("  - RAG model: {}", config.generation.rag.model);
    tracing::info!("  - General model: {}", config.generation.general.model);
    tracing::info!("  - Vector index: {}", config.vector_index.url);
    tracing::info!("  - Chunk size: {} words", config.chunking.max_chunk_words);

    if config.embedding.api_key.is_empty() {
        tracing::warn!("No embedding API key set (NVIDIA_API_KEY); uploads will fail");
    }
    if config.generation.rag.api_key.is_empty() {
        tracing::warn!("No RAG backend API key set (GROQ_API_KEY); document questions will fail");
    }

    let server = RagServer::new(config)?;

    println!("Server starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST   /api/upload/document       - Upload documents");
    println!("  POST   /api/chat/ask              - Ask questions");
    println!("  GET    /api/upload/list/:tenant   - List documents");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
