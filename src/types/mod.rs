//! Core data types: documents, chunks, chat turns, and the wire contract

pub mod document;
pub mod request;
pub mod response;

pub use document::{ChatTurn, Chunk, Document, FileType};
pub use request::{AskRequest, HistoryMessage};
pub use response::{AnswerMode, AskResponse, DocumentSummary, UploadResponse};
