//! Chat-completion provider trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One message in a chat-completions conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user", or "assistant"
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Trait for LLM answer generation over a message history
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Run one chat completion and return the assistant message text
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Model name for logging
    fn model(&self) -> &str;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Trait for extracting text from images via a vision-capable model
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    /// Transcribe visible text and tables from an image into Markdown
    async fn transcribe_image(&self, image: &[u8], mime: &str) -> Result<String>;
}
