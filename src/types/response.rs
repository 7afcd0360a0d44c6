//! Response types for the HTTP API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::{ChatTurn, Document};

/// Which backend answered a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Grounded in retrieved document chunks
    Rag,
    /// Conversation context only
    General,
}

/// Response from a successful upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Whether the document was fully indexed
    pub success: bool,
    /// Filename as stored
    pub filename: String,
    /// Number of chunks indexed
    pub chunks_processed: u32,
}

/// Response from a question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    /// Generated answer
    pub answer: String,
    /// Distinct source filenames the answer drew from
    pub sources: Vec<String>,
    /// Number of chunks supplied as context
    pub chunks_used: usize,
    /// Backend mode used
    pub mode: AnswerMode,
    /// Soft warning, e.g. when the turn could not be saved to history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Structured error code when the answer is an apology
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AskResponse {
    /// Conversational apology returned when a question fails. The structured
    /// code stays available to the calling layer without leaking detail.
    pub fn apology(mode: AnswerMode, code: &str) -> Self {
        Self {
            answer: "I ran into a problem while working on your question. Please try again in a moment.".to_string(),
            sources: Vec::new(),
            chunks_used: 0,
            mode,
            warning: None,
            error: Some(code.to_string()),
        }
    }
}

/// Summary of one document for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Document ID
    pub id: Uuid,
    /// Filename
    pub filename: String,
    /// Number of indexed chunks
    pub chunk_count: u32,
    /// Upload timestamp
    pub uploaded_at: DateTime<Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            filename: doc.filename.clone(),
            chunk_count: doc.chunk_count,
            uploaded_at: doc.uploaded_at,
        }
    }
}

/// Response for listing a tenant's documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub success: bool,
    /// Documents ordered by upload time, newest first
    pub documents: Vec<DocumentSummary>,
    pub count: usize,
}

/// Response for document deletion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Response for chat history retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub success: bool,
    /// Turns ordered by creation time, newest first
    pub history: Vec<ChatTurn>,
    pub count: usize,
}
