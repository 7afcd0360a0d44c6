//! Provider abstractions for embeddings, chat models, and the vector index
//!
//! Trait seams keep the pipeline testable and the backends swappable; the
//! concrete clients talk to OpenAI-compatible endpoints and Qdrant over
//! HTTP with injected retry policies.

pub mod chat;
pub mod embedding;
pub mod nim;
pub mod openai_chat;
pub mod qdrant;
pub mod retry;
pub mod vector_index;

pub use chat::{ChatMessage, ChatProvider, VisionExtractor};
pub use embedding::{EmbeddingInput, EmbeddingProvider};
pub use nim::NimEmbedder;
pub use openai_chat::ChatCompletionsClient;
pub use qdrant::QdrantGateway;
pub use vector_index::{ScoredChunk, VectorIndexProvider};
