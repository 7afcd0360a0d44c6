//! Request types for the HTTP API

use serde::{Deserialize, Serialize};

/// One prior conversation message supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    /// "user" or "assistant"
    pub role: String,
    /// Message text
    pub content: String,
}

/// Question request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    /// The question to answer
    pub question: String,

    /// Tenant the question is scoped to
    pub tenant_id: String,

    /// Source document to answer from; None selects general mode
    #[serde(default)]
    pub source_file: Option<String>,

    /// Recent conversation turns for continuity, oldest first
    #[serde(default, alias = "chat_history")]
    pub recent_history: Vec<HistoryMessage>,
}

/// Query parameters for document deletion
#[derive(Debug, Deserialize)]
pub struct DeleteDocumentParams {
    pub tenant_id: String,
}

/// Query parameters for history retrieval
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

/// Query parameters for history clearing
#[derive(Debug, Deserialize)]
pub struct ClearHistoryParams {
    #[serde(default)]
    pub source_file: Option<String>,
}
