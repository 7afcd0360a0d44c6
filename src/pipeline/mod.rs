//! Pipeline orchestration for uploads and questions

pub mod question;
pub mod upload;

use serde::{Deserialize, Serialize};

pub use question::QuestionPipeline;
pub use upload::{UploadPipeline, UploadReceipt};

/// Upload pipeline stage. Failure is reachable from every non-terminal
/// stage; the pipeline rolls back any partial state before reporting it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    Received,
    Parsing,
    Chunking,
    Embedding,
    Indexing,
    MetadataWrite,
    Complete,
    Failed,
}

/// Observer for upload stage transitions. The default logs via tracing;
/// callers that want real progress reporting can hook the transitions
/// instead of simulating them client-side.
pub trait StageObserver: Send + Sync {
    fn on_stage(&self, stage: UploadStage);
}

/// Default observer that logs stage transitions
pub struct LogStageObserver;

impl StageObserver for LogStageObserver {
    fn on_stage(&self, stage: UploadStage) {
        tracing::debug!("Upload stage: {:?}", stage);
    }
}
