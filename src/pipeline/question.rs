//! Question orchestration: retrieve, generate, persist
//!
//! Retrieval and generation failures fail the request; persisting the chat
//! turn is best-effort and degrades to a soft warning on the response.

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::generation::AnswerGenerator;
use crate::providers::{EmbeddingProvider, ScoredChunk, VectorIndexProvider};
use crate::storage::MetadataStore;
use crate::types::{AnswerMode, AskRequest, AskResponse, ChatTurn};

/// Minimum question length accepted
const MIN_QUESTION_CHARS: usize = 3;

/// Orchestrates one question end to end
pub struct QuestionPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndexProvider>,
    generator: Arc<AnswerGenerator>,
    store: Arc<MetadataStore>,
    retrieval: RetrievalConfig,
}

impl QuestionPipeline {
    /// Create a pipeline over the given providers and store
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndexProvider>,
        generator: Arc<AnswerGenerator>,
        store: Arc<MetadataStore>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            store,
            retrieval,
        }
    }

    /// Mode for a request: RAG when a source document is selected
    pub fn mode_for(request: &AskRequest) -> AnswerMode {
        if request.source_file.is_some() {
            AnswerMode::Rag
        } else {
            AnswerMode::General
        }
    }

    /// Answer one question
    pub async fn answer(&self, request: &AskRequest) -> Result<AskResponse> {
        let question = request.question.trim();
        if question.len() < MIN_QUESTION_CHARS {
            return Err(Error::InvalidRequest("Question is too short".into()));
        }

        let mode = Self::mode_for(request);
        tracing::info!(
            "Question from tenant {} ({:?} mode{})",
            request.tenant_id,
            mode,
            request
                .source_file
                .as_deref()
                .map(|s| format!(", document: {}", s))
                .unwrap_or_default()
        );

        let chunks = match &request.source_file {
            Some(source_file) => self.retrieve(&request.tenant_id, question, source_file).await?,
            None => Vec::new(),
        };

        let generated = self
            .generator
            .generate(mode, question, &chunks, &request.recent_history)
            .await?;

        // Best-effort persistence: a generated answer is not invalidated by
        // a history write failure
        let turn = ChatTurn::new(
            &request.tenant_id,
            question,
            &generated.answer,
            request.source_file.clone(),
        );
        let warning = match self.store.insert_chat_turn(&turn) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Failed to persist chat turn for {}: {}", request.tenant_id, e);
                Some("The answer could not be saved to your chat history.".to_string())
            }
        };

        Ok(AskResponse {
            answer: generated.answer,
            sources: generated.sources,
            chunks_used: generated.chunks_used,
            mode,
            warning,
            error: None,
        })
    }

    /// Embed the question and search the tenant's collection, keeping only
    /// hits above the relevance threshold
    async fn retrieve(
        &self,
        tenant_id: &str,
        question: &str,
        source_file: &str,
    ) -> Result<Vec<ScoredChunk>> {
        let query_vector = self.embedder.embed_query(question).await?;

        let mut hits = self
            .index
            .search(
                tenant_id,
                &query_vector,
                self.retrieval.top_k,
                Some(source_file),
            )
            .await?;

        let before = hits.len();
        hits.retain(|hit| hit.score >= self.retrieval.relevance_threshold);

        if hits.is_empty() {
            tracing::warn!(
                "No chunks above threshold {} in '{}' ({} retrieved)",
                self.retrieval.relevance_threshold,
                source_file,
                before
            );
        } else {
            tracing::info!("Using {} context chunks from '{}'", hits.len(), source_file);
        }

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use uuid::Uuid;

    use crate::providers::{ChatMessage, ChatProvider, EmbeddingInput};
    use crate::types::Chunk;

    struct FakeEmbedder {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
            _input: EmbeddingInput,
        ) -> Result<Vec<Vec<f32>>> {
            *self.calls.lock() += 1;
            Ok(texts.iter().map(|_| vec![0.5; 4]).collect())
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// Index fake returning preset hits
    struct FakeIndex {
        hits: Vec<ScoredChunk>,
        searches: Mutex<usize>,
    }

    #[async_trait]
    impl VectorIndexProvider for FakeIndex {
        async fn ensure_collection(&self, _tenant_id: &str) -> Result<()> {
            Ok(())
        }

        async fn upsert_chunks(&self, _tenant_id: &str, _chunks: &[Chunk]) -> Result<()> {
            Ok(())
        }

        async fn search(
            &self,
            _tenant_id: &str,
            _query: &[f32],
            _top_k: usize,
            _source_file: Option<&str>,
        ) -> Result<Vec<ScoredChunk>> {
            *self.searches.lock() += 1;
            Ok(self.hits.clone())
        }

        async fn delete_document(&self, _tenant_id: &str, _document_id: &Uuid) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    struct CannedChat;

    #[async_trait]
    impl ChatProvider for CannedChat {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            Ok("the answer".to_string())
        }

        fn model(&self) -> &str {
            "canned"
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn hit(source: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            text: "context".into(),
            source_file: source.into(),
            page: None,
            ordinal: 0,
            score,
        }
    }

    fn build(hits: Vec<ScoredChunk>) -> (QuestionPipeline, Arc<FakeIndex>, Arc<MetadataStore>) {
        let index = Arc::new(FakeIndex {
            hits,
            searches: Mutex::new(0),
        });
        let store = Arc::new(MetadataStore::in_memory().unwrap());
        let generator = Arc::new(AnswerGenerator::new(
            Arc::new(CannedChat),
            Arc::new(CannedChat),
            6,
        ));

        let pipeline = QuestionPipeline::new(
            Arc::new(FakeEmbedder {
                calls: Mutex::new(0),
            }),
            Arc::clone(&index) as Arc<dyn VectorIndexProvider>,
            generator,
            Arc::clone(&store),
            RetrievalConfig::default(),
        );

        (pipeline, index, store)
    }

    fn ask(source_file: Option<&str>) -> AskRequest {
        AskRequest {
            question: "What does the report say?".into(),
            tenant_id: "t1".into(),
            source_file: source_file.map(String::from),
            recent_history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_general_mode_skips_retrieval() {
        let (pipeline, index, store) = build(vec![hit("a.pdf", 0.9)]);

        let response = pipeline.answer(&ask(None)).await.unwrap();

        assert_eq!(response.mode, AnswerMode::General);
        assert!(response.sources.is_empty());
        assert_eq!(response.chunks_used, 0);
        assert_eq!(*index.searches.lock(), 0);

        // Turn persisted with no source file
        let turns = store.list_chat_turns("t1", None, 20).unwrap();
        assert_eq!(turns.len(), 1);
        assert!(turns[0].source_file.is_none());
    }

    #[tokio::test]
    async fn test_rag_mode_uses_retrieved_sources() {
        let (pipeline, index, _store) = build(vec![hit("a.pdf", 0.9), hit("a.pdf", 0.8)]);

        let response = pipeline.answer(&ask(Some("a.pdf"))).await.unwrap();

        assert_eq!(response.mode, AnswerMode::Rag);
        assert_eq!(response.sources, vec!["a.pdf".to_string()]);
        assert_eq!(response.chunks_used, 2);
        assert_eq!(*index.searches.lock(), 1);
    }

    #[tokio::test]
    async fn test_low_relevance_hits_are_dropped_but_answer_returns() {
        let (pipeline, _index, _store) = build(vec![hit("a.pdf", 0.05), hit("a.pdf", 0.1)]);

        let response = pipeline.answer(&ask(Some("a.pdf"))).await.unwrap();

        assert_eq!(response.mode, AnswerMode::Rag);
        assert_eq!(response.chunks_used, 0);
        assert!(response.sources.is_empty());
        assert_eq!(response.answer, "the answer");
    }

    #[tokio::test]
    async fn test_short_question_is_rejected() {
        let (pipeline, _index, _store) = build(Vec::new());

        let mut request = ask(None);
        request.question = "hi".into();

        let result = pipeline.answer(&request).await;
        assert!(matches!(result, Err(Error::InvalidRequest(_))));
    }
}
