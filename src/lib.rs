//! tenant-rag: multi-tenant document Q&A service
//!
//! Uploads are parsed, chunked, embedded, and indexed into a per-tenant
//! vector collection; questions are answered either grounded in retrieved
//! chunks (RAG mode) or from conversation context alone (general mode),
//! with chat history retained per tenant and per source document.

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod server;
pub mod storage;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use types::{
    document::{ChatTurn, Chunk, Document, FileType},
    request::AskRequest,
    response::{AnswerMode, AskResponse, UploadResponse},
};
