//! Upload orchestration: parse, chunk, embed, index, record
//!
//! The pipeline runs received -> parsing -> chunking -> embedding ->
//! indexing -> metadata-write -> complete. A failure at any stage aborts
//! the whole upload and rolls back vectors already written, so a
//! half-indexed document is never visible for querying.

use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::{ChunkingConfig, EmbeddingConfig, ProcessingConfig};
use crate::error::{Error, Result};
use crate::ingestion::{markdown_segments, DocumentParser, Segment, SegmentChunker};
use crate::providers::{EmbeddingInput, EmbeddingProvider, VectorIndexProvider, VisionExtractor};
use crate::storage::MetadataStore;
use crate::types::{Chunk, Document, FileType};

use super::{LogStageObserver, StageObserver, UploadStage};

/// Result of a completed upload
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// The recorded document
    pub document: Document,
    /// Number of chunks indexed
    pub chunks_processed: u32,
}

/// Orchestrates one document upload end to end
pub struct UploadPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndexProvider>,
    vision: Arc<dyn VisionExtractor>,
    store: Arc<MetadataStore>,
    chunking: ChunkingConfig,
    embedding: EmbeddingConfig,
    processing: ProcessingConfig,
    observer: Arc<dyn StageObserver>,
}

impl UploadPipeline {
    /// Create a pipeline over the given providers and store
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndexProvider>,
        vision: Arc<dyn VisionExtractor>,
        store: Arc<MetadataStore>,
        chunking: ChunkingConfig,
        embedding: EmbeddingConfig,
        processing: ProcessingConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            vision,
            store,
            chunking,
            embedding,
            processing,
            observer: Arc::new(LogStageObserver),
        }
    }

    /// Replace the stage observer
    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Process one upload. On failure every stage rolls back vectors
    /// already written for this document and no metadata record survives.
    pub async fn process(
        &self,
        tenant_id: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<UploadReceipt> {
        match self.process_inner(tenant_id, filename, data).await {
            Ok(receipt) => {
                self.observer.on_stage(UploadStage::Complete);
                Ok(receipt)
            }
            Err(e) => {
                self.observer.on_stage(UploadStage::Failed);
                Err(e)
            }
        }
    }

    async fn process_inner(
        &self,
        tenant_id: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<UploadReceipt> {
        self.observer.on_stage(UploadStage::Received);
        tracing::info!(
            "Processing upload '{}' for tenant {} ({} bytes)",
            filename,
            tenant_id,
            data.len()
        );

        let file_type = FileType::from_filename(filename);
        if !file_type.is_supported() {
            return Err(Error::UnsupportedFormat(format!(
                "{} (accepted: pdf, docx, txt, csv, md, json, png, jpg, jpeg, webp)",
                filename
            )));
        }

        self.observer.on_stage(UploadStage::Parsing);
        let segments = self.parse(filename, &file_type, data).await?;
        tracing::info!("Parsed '{}' into {} segments", filename, segments.len());

        self.observer.on_stage(UploadStage::Chunking);
        let chunker = SegmentChunker::new(&self.chunking);
        let pieces = chunker.chunk(&segments);
        if pieces.is_empty() {
            return Err(Error::parse_failure(
                filename,
                "No readable content found in this document",
            ));
        }
        tracing::info!("Created {} chunks from '{}'", pieces.len(), filename);

        // A re-upload under the same name is delete-then-create: the prior
        // document's vectors and record go away before the new ones land
        if let Some(previous) = self.store.get_document(tenant_id, filename)? {
            tracing::info!(
                "Replacing existing document '{}' ({})",
                filename,
                previous.id
            );
            self.index.delete_document(tenant_id, &previous.id).await?;
            self.store.delete_document(tenant_id, filename)?;
        }

        let mut document = Document::new(tenant_id, filename);
        let mut chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(ordinal, piece)| Chunk {
                document_id: document.id,
                tenant_id: tenant_id.to_string(),
                ordinal: ordinal as u32,
                text: piece.text,
                embedding: Vec::new(),
                source_file: filename.to_string(),
                page: piece.page,
                section: piece.section,
            })
            .collect();

        self.observer.on_stage(UploadStage::Embedding);
        self.embed_chunks(&mut chunks).await?;

        self.observer.on_stage(UploadStage::Indexing);
        self.index.ensure_collection(tenant_id).await?;
        if let Err(e) = self.index.upsert_chunks(tenant_id, &chunks).await {
            self.rollback(tenant_id, &document.id).await;
            return Err(e);
        }

        self.observer.on_stage(UploadStage::MetadataWrite);
        document.chunk_count = chunks.len() as u32;
        if let Err(e) = self.store.insert_document(&document) {
            self.rollback(tenant_id, &document.id).await;
            return Err(e);
        }

        tracing::info!(
            "Upload complete: '{}' indexed as {} chunks for tenant {}",
            filename,
            document.chunk_count,
            tenant_id
        );

        Ok(UploadReceipt {
            chunks_processed: document.chunk_count,
            document,
        })
    }

    /// Parse bytes into segments. Images go through the vision model first;
    /// the transcript is re-read as Markdown so transcribed tables stay
    /// table segments.
    async fn parse(
        &self,
        filename: &str,
        file_type: &FileType,
        data: &[u8],
    ) -> Result<Vec<Segment>> {
        if *file_type == FileType::Image {
            let mime = FileType::image_mime(filename);
            let transcript = self
                .vision
                .transcribe_image(data, &mime)
                .await
                .map_err(|e| Error::parse_failure(filename, e.to_string()))?;

            let segments = markdown_segments(&transcript);
            if segments.is_empty() {
                return Err(Error::parse_failure(
                    filename,
                    "Image could not be transcribed",
                ));
            }
            return Ok(segments);
        }

        DocumentParser::parse(filename, file_type, data)
    }

    /// Embed all chunks with bounded parallelism across request batches.
    /// All batches must succeed before indexing begins; a single failed
    /// batch fails the whole upload with nothing indexed.
    async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<()> {
        let batch_size = self.embedding.batch_size.max(1);
        let parallelism = self.processing.embed_parallelism();
        let semaphore = Arc::new(Semaphore::new(parallelism));

        let batches: Vec<Vec<String>> = chunks
            .chunks(batch_size)
            .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
            .collect();
        let total_batches = batches.len();

        let futures: Vec<_> = batches
            .into_iter()
            .enumerate()
            .map(|(batch_num, texts)| {
                let embedder = Arc::clone(&self.embedder);
                let semaphore = Arc::clone(&semaphore);

                async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|e| Error::internal(e.to_string()))?;
                    tracing::debug!("Embedding batch {}/{}", batch_num + 1, total_batches);
                    embedder.embed_batch(&texts, EmbeddingInput::Passage).await
                }
            })
            .collect();

        // Barrier: indexing must not start until every batch is done
        let results = join_all(futures).await;

        let mut vectors = Vec::with_capacity(chunks.len());
        for result in results {
            vectors.extend(result?);
        }

        if vectors.len() != chunks.len() {
            return Err(Error::embedding(format!(
                "Expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = vector;
        }

        Ok(())
    }

    /// Compensating deletion after a failed stage. A failure here is logged
    /// loudly; the metadata record was never written, so the document stays
    /// invisible either way.
    async fn rollback(&self, tenant_id: &str, document_id: &uuid::Uuid) {
        tracing::warn!(
            "Rolling back vectors for document {} (tenant {})",
            document_id,
            tenant_id
        );
        if let Err(e) = self.index.delete_document(tenant_id, document_id).await {
            tracing::error!(
                "Rollback failed, vectors for document {} may be orphaned: {}",
                document_id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use uuid::Uuid;

    use crate::providers::ScoredChunk;

    /// Embedder fake: deterministic vectors, optionally failing
    struct FakeEmbedder {
        dimensions: usize,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
            _input: EmbeddingInput,
        ) -> Result<Vec<Vec<f32>>> {
            if self.fail {
                return Err(Error::embedding("endpoint down"));
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32; self.dimensions])
                .collect())
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// In-memory index fake keyed by (tenant, point id)
    #[derive(Default)]
    struct FakeIndex {
        points: Mutex<HashMap<String, Vec<Chunk>>>,
        fail_upsert: bool,
    }

    impl FakeIndex {
        fn chunk_count(&self, tenant: &str) -> usize {
            self.points
                .lock()
                .get(tenant)
                .map(|c| c.len())
                .unwrap_or(0)
        }

        fn document_ids(&self, tenant: &str) -> Vec<Uuid> {
            self.points
                .lock()
                .get(tenant)
                .map(|chunks| chunks.iter().map(|c| c.document_id).collect())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl VectorIndexProvider for FakeIndex {
        async fn ensure_collection(&self, _tenant_id: &str) -> Result<()> {
            Ok(())
        }

        async fn upsert_chunks(&self, tenant_id: &str, chunks: &[Chunk]) -> Result<()> {
            if self.fail_upsert {
                return Err(Error::index("index down"));
            }
            let mut points = self.points.lock();
            let entry = points.entry(tenant_id.to_string()).or_default();
            for chunk in chunks {
                entry.retain(|c| c.point_id() != chunk.point_id());
                entry.push(chunk.clone());
            }
            Ok(())
        }

        async fn search(
            &self,
            tenant_id: &str,
            _query: &[f32],
            top_k: usize,
            source_file: Option<&str>,
        ) -> Result<Vec<ScoredChunk>> {
            let points = self.points.lock();
            let chunks = points.get(tenant_id).cloned().unwrap_or_default();
            Ok(chunks
                .into_iter()
                .filter(|c| source_file.map_or(true, |s| c.source_file == s))
                .take(top_k)
                .map(|c| ScoredChunk {
                    text: c.text,
                    source_file: c.source_file,
                    page: c.page,
                    ordinal: c.ordinal,
                    score: 0.9,
                })
                .collect())
        }

        async fn delete_document(&self, tenant_id: &str, document_id: &Uuid) -> Result<()> {
            let mut points = self.points.lock();
            if let Some(chunks) = points.get_mut(tenant_id) {
                chunks.retain(|c| c.document_id != *document_id);
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct FakeVision;

    #[async_trait]
    impl VisionExtractor for FakeVision {
        async fn transcribe_image(&self, _image: &[u8], _mime: &str) -> Result<String> {
            Ok("# Scanned page\n\nTranscribed text.\n\n| a | b |\n| --- | --- |\n| 1 | 2 |\n"
                .to_string())
        }
    }

    /// Observer fake recording the stage sequence
    #[derive(Default)]
    struct RecordingObserver {
        stages: Mutex<Vec<UploadStage>>,
    }

    impl StageObserver for RecordingObserver {
        fn on_stage(&self, stage: UploadStage) {
            self.stages.lock().push(stage);
        }
    }

    fn pipeline(
        embedder_fails: bool,
        index_fails: bool,
    ) -> (UploadPipeline, Arc<FakeIndex>, Arc<MetadataStore>) {
        let index = Arc::new(FakeIndex {
            fail_upsert: index_fails,
            ..FakeIndex::default()
        });
        let store = Arc::new(MetadataStore::in_memory().unwrap());

        let pipeline = UploadPipeline::new(
            Arc::new(FakeEmbedder {
                dimensions: 8,
                fail: embedder_fails,
            }),
            Arc::clone(&index) as Arc<dyn VectorIndexProvider>,
            Arc::new(FakeVision),
            Arc::clone(&store),
            ChunkingConfig::default(),
            EmbeddingConfig {
                batch_size: 2,
                ..EmbeddingConfig::default()
            },
            ProcessingConfig::default(),
        );

        (pipeline, index, store)
    }

    const TEXT_DOC: &[u8] = b"First paragraph with enough words to form a chunk of text \
for the pipeline to index and retrieve later on.\n\nSecond paragraph that also carries \
a reasonable amount of words for chunking purposes in this test document.";

    #[tokio::test]
    async fn test_successful_upload_indexes_and_records() {
        let (pipeline, index, store) = pipeline(false, false);

        let receipt = pipeline.process("t1", "notes.txt", TEXT_DOC).await.unwrap();

        assert!(receipt.chunks_processed >= 1);
        assert_eq!(index.chunk_count("t1"), receipt.chunks_processed as usize);

        let recorded = store.get_document("t1", "notes.txt").unwrap().unwrap();
        assert_eq!(recorded.chunk_count, receipt.chunks_processed);
    }

    #[tokio::test]
    async fn test_unsupported_format_is_terminal() {
        let (pipeline, index, store) = pipeline(false, false);

        let result = pipeline.process("t1", "binary.exe", b"MZ").await;
        assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
        assert_eq!(index.chunk_count("t1"), 0);
        assert!(store.get_document("t1", "binary.exe").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_zero_vectors() {
        let (pipeline, index, store) = pipeline(true, false);

        let result = pipeline.process("t1", "notes.txt", TEXT_DOC).await;
        assert!(matches!(result, Err(Error::EmbeddingFailure(_))));
        assert_eq!(index.chunk_count("t1"), 0);
        assert!(store.get_document("t1", "notes.txt").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_failure_writes_no_metadata() {
        let (pipeline, _index, store) = pipeline(false, true);

        let result = pipeline.process("t1", "notes.txt", TEXT_DOC).await;
        assert!(matches!(result, Err(Error::IndexUnavailable(_))));
        assert!(store.get_document("t1", "notes.txt").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reupload_replaces_prior_document() {
        let (pipeline, index, store) = pipeline(false, false);

        let first = pipeline.process("t1", "notes.txt", TEXT_DOC).await.unwrap();
        let second = pipeline.process("t1", "notes.txt", TEXT_DOC).await.unwrap();

        assert_ne!(first.document.id, second.document.id);

        // Exactly one record and one set of chunks, all owned by the new
        // document
        assert_eq!(store.list_documents("t1").unwrap().len(), 1);
        let owners = index.document_ids("t1");
        assert!(!owners.is_empty());
        assert!(owners.iter().all(|id| *id == second.document.id));
    }

    #[tokio::test]
    async fn test_image_goes_through_vision() {
        let (pipeline, index, _store) = pipeline(false, false);

        let receipt = pipeline.process("t1", "scan.png", b"fakepng").await.unwrap();
        assert!(receipt.chunks_processed >= 1);

        let points = index.points.lock();
        let chunks = points.get("t1").unwrap();
        assert!(chunks.iter().any(|c| c.text.contains("| 1 | 2 |")));
    }

    #[tokio::test]
    async fn test_stage_sequence_on_success() {
        let (pipeline, _index, _store) = pipeline(false, false);
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = pipeline.with_observer(Arc::clone(&observer) as Arc<dyn StageObserver>);

        pipeline.process("t1", "notes.txt", TEXT_DOC).await.unwrap();

        let stages = observer.stages.lock().clone();
        assert_eq!(
            stages,
            vec![
                UploadStage::Received,
                UploadStage::Parsing,
                UploadStage::Chunking,
                UploadStage::Embedding,
                UploadStage::Indexing,
                UploadStage::MetadataWrite,
                UploadStage::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_stage_is_observed() {
        let (pipeline, _index, _store) = pipeline(true, false);
        let observer = Arc::new(RecordingObserver::default());
        let pipeline = pipeline.with_observer(Arc::clone(&observer) as Arc<dyn StageObserver>);

        let _ = pipeline.process("t1", "notes.txt", TEXT_DOC).await;

        let stages = observer.stages.lock().clone();
        assert_eq!(stages.last(), Some(&UploadStage::Failed));
        assert!(!stages.contains(&UploadStage::Indexing));
    }
}
