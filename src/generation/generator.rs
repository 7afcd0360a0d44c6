//! Dual-backend answer generation

use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::providers::{ChatProvider, ScoredChunk};
use crate::types::{AnswerMode, HistoryMessage};

use super::prompt::PromptBuilder;

/// A generated answer with its source attribution
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    /// Answer text
    pub answer: String,
    /// Distinct source filenames of the context chunks, in retrieval order
    pub sources: Vec<String>,
    /// Number of chunks supplied as context
    pub chunks_used: usize,
}

/// Answer generator selecting a backend by mode
pub struct AnswerGenerator {
    rag: Arc<dyn ChatProvider>,
    general: Arc<dyn ChatProvider>,
    history_turns: usize,
}

impl AnswerGenerator {
    /// Create a generator over the two backends
    pub fn new(
        rag: Arc<dyn ChatProvider>,
        general: Arc<dyn ChatProvider>,
        history_turns: usize,
    ) -> Self {
        Self {
            rag,
            general,
            history_turns,
        }
    }

    /// Generate an answer. RAG mode grounds the prompt in the supplied
    /// chunks; general mode uses conversation context only.
    pub async fn generate(
        &self,
        mode: AnswerMode,
        question: &str,
        chunks: &[ScoredChunk],
        history: &[HistoryMessage],
    ) -> Result<GeneratedAnswer> {
        let (provider, messages) = match mode {
            AnswerMode::Rag => (
                &self.rag,
                PromptBuilder::rag_messages(question, chunks, history, self.history_turns),
            ),
            AnswerMode::General => (
                &self.general,
                PromptBuilder::general_messages(question, history, self.history_turns),
            ),
        };

        tracing::info!("Generating answer with {} ({:?} mode)", provider.model(), mode);
        let start = Instant::now();
        let answer = provider.complete(&messages).await?;
        tracing::info!("Model latency: {:.2}s", start.elapsed().as_secs_f64());

        let sources = match mode {
            AnswerMode::Rag => distinct_sources(chunks),
            AnswerMode::General => Vec::new(),
        };

        Ok(GeneratedAnswer {
            answer,
            sources,
            chunks_used: chunks.len(),
        })
    }
}

/// Distinct source filenames in first-seen order
fn distinct_sources(chunks: &[ScoredChunk]) -> Vec<String> {
    let mut sources = Vec::new();
    for chunk in chunks {
        if !sources.contains(&chunk.source_file) {
            sources.push(chunk.source_file.clone());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::providers::ChatMessage;

    struct CannedChat {
        reply: &'static str,
        model: &'static str,
    }

    #[async_trait]
    impl ChatProvider for CannedChat {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            Ok(self.reply.to_string())
        }

        fn model(&self) -> &str {
            self.model
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn generator() -> AnswerGenerator {
        AnswerGenerator::new(
            Arc::new(CannedChat { reply: "rag answer", model: "rag-model" }),
            Arc::new(CannedChat { reply: "general answer", model: "general-model" }),
            6,
        )
    }

    fn hit(source: &str) -> ScoredChunk {
        ScoredChunk {
            text: "text".into(),
            source_file: source.into(),
            page: None,
            ordinal: 0,
            score: 0.8,
        }
    }

    #[tokio::test]
    async fn test_mode_selects_backend() {
        let generator = generator();

        let rag = generator
            .generate(AnswerMode::Rag, "q", &[hit("a.pdf")], &[])
            .await
            .unwrap();
        assert_eq!(rag.answer, "rag answer");

        let general = generator
            .generate(AnswerMode::General, "q", &[], &[])
            .await
            .unwrap();
        assert_eq!(general.answer, "general answer");
    }

    #[tokio::test]
    async fn test_sources_are_distinct_filenames() {
        let generator = generator();
        let chunks = vec![hit("a.pdf"), hit("b.pdf"), hit("a.pdf")];

        let result = generator
            .generate(AnswerMode::Rag, "q", &chunks, &[])
            .await
            .unwrap();

        assert_eq!(result.sources, vec!["a.pdf".to_string(), "b.pdf".to_string()]);
        assert_eq!(result.chunks_used, 3);
    }

    #[tokio::test]
    async fn test_general_mode_reports_no_sources() {
        let generator = generator();
        let result = generator
            .generate(AnswerMode::General, "q", &[], &[])
            .await
            .unwrap();

        assert!(result.sources.is_empty());
        assert_eq!(result.chunks_used, 0);
    }
}
