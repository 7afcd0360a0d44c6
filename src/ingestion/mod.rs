//! Document ingestion: multi-format text extraction and chunking

pub mod chunker;
pub mod parser;

pub use chunker::{ChunkText, SegmentChunker};
pub use parser::{markdown_segments, DocumentParser, TextExtractor};

/// Kind of a normalized text segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Running text
    Prose,
    /// Markdown-formatted table, never split by the chunker
    Table,
    /// Heading line, kept with the text that follows it
    Heading,
}

/// One normalized text segment in document order
#[derive(Debug, Clone)]
pub struct Segment {
    /// Segment text
    pub text: String,
    /// Segment kind
    pub kind: SegmentKind,
    /// Page the segment came from, if the format has pages
    pub page: Option<u32>,
}
