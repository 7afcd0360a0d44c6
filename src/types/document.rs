//! Document, chunk, and chat-turn types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Supported file types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document
    Pdf,
    /// Microsoft Word document (.docx)
    Docx,
    /// Plain text file
    Txt,
    /// Markdown file
    Markdown,
    /// CSV file
    Csv,
    /// JSON file
    Json,
    /// Image transcribed via a vision model
    Image,
    /// Unknown file type
    Unknown,
}

impl FileType {
    /// Detect file type from a filename extension
    pub fn from_filename(filename: &str) -> Self {
        let extension = filename.rsplit('.').next().unwrap_or("").to_lowercase();
        match extension.as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "txt" | "text" => Self::Txt,
            "md" | "markdown" => Self::Markdown,
            "csv" => Self::Csv,
            "json" => Self::Json,
            "png" | "jpg" | "jpeg" | "webp" => Self::Image,
            _ => Self::Unknown,
        }
    }

    /// Check if this is an accepted file type
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// MIME type used when sending image bytes to the vision model
    pub fn image_mime(filename: &str) -> String {
        mime_guess::from_path(filename)
            .first_raw()
            .unwrap_or("image/png")
            .to_string()
    }

    /// Get display name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "Word Document (.docx)",
            Self::Txt => "Text File",
            Self::Markdown => "Markdown",
            Self::Csv => "CSV",
            Self::Json => "JSON",
            Self::Image => "Image",
            Self::Unknown => "Unknown",
        }
    }
}

/// One uploaded document belonging to a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: String,
    /// Filename, unique per tenant
    pub filename: String,
    /// Number of indexed chunks
    pub chunk_count: u32,
    /// Upload timestamp
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document record
    pub fn new(tenant_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            filename: filename.into(),
            chunk_count: 0,
            uploaded_at: Utc::now(),
        }
    }
}

/// A bounded span of normalized text extracted from a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Owning document
    pub document_id: Uuid,
    /// Owning tenant
    pub tenant_id: String,
    /// Position within the document, contiguous from 0
    pub ordinal: u32,
    /// Chunk text
    pub text: String,
    /// Embedding vector
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    /// Source filename, duplicated into the index payload for filtering
    pub source_file: String,
    /// Page number where the chunk starts, if the format has pages
    pub page: Option<u32>,
    /// Heading the chunk falls under, if one was detected
    pub section: Option<String>,
}

impl Chunk {
    /// Deterministic point ID for the vector index.
    ///
    /// Derived from (document id, ordinal) so re-indexing the same document
    /// overwrites points instead of duplicating them.
    pub fn point_id(&self) -> Uuid {
        let mut hasher = Sha256::new();
        hasher.update(self.document_id.as_bytes());
        hasher.update(self.ordinal.to_be_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uuid::from_bytes(bytes)
    }
}

/// One question/answer exchange, immutable once written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Unique turn ID
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: String,
    /// Question text
    pub question: String,
    /// Answer text
    pub answer: String,
    /// Source document the question was asked against; None for general mode
    pub source_file: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    /// Create a new chat turn
    pub fn new(
        tenant_id: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>,
        source_file: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            question: question.into(),
            answer: answer.into(),
            source_file,
            created_at: Utc::now(),
        }
    }
}
