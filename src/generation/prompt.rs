//! Prompt assembly for both answer modes

use crate::providers::{ChatMessage, ScoredChunk};
use crate::types::HistoryMessage;

/// System prompt for RAG mode. The model grounds itself in the supplied
/// chunks and must say so explicitly when it falls back to general
/// knowledge.
const RAG_SYSTEM_PROMPT: &str = "You are an expert document assistant.

INSTRUCTIONS:
1. Use the provided DOCUMENT CONTEXT as your PRIMARY source.
2. If the context only partially answers the question, supplement it with \
your own knowledge and state explicitly which parts come from outside the \
documents.
3. If the context contains nothing relevant, say so, then answer from \
general knowledge, clearly marked as such.
4. Format responses in Markdown: **bold** key terms, bullet points and \
numbered lists for clarity, headings (##) for longer answers, tables when \
comparing data, > blockquotes for direct citations from the documents.
5. Be thorough, precise, and insightful.";

/// System prompt for general mode
const GENERAL_SYSTEM_PROMPT: &str = "You are a friendly and highly capable \
general assistant.

INSTRUCTIONS:
1. Answer from your knowledge. Be helpful, conversational, and direct.
2. Format responses in Markdown: **bold** key terms, lists for structure, \
headings (##) for longer answers, code blocks for code.
3. Be thorough yet concise. No fluff.";

/// Prompt builder for both answer modes
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build the message list for a RAG-mode question
    pub fn rag_messages(
        question: &str,
        chunks: &[ScoredChunk],
        history: &[HistoryMessage],
        max_history: usize,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(RAG_SYSTEM_PROMPT)];
        messages.extend(history_messages(history, max_history));

        let context = if chunks.is_empty() {
            "(No relevant passages were found in the selected document.)".to_string()
        } else {
            Self::build_context(chunks)
        };

        messages.push(ChatMessage::user(format!(
            "DOCUMENT CONTEXT:\n{}\n\nUSER QUESTION:\n{}\n\nProvide a \
             well-formatted answer grounded in the document context above.",
            context, question
        )));

        messages
    }

    /// Build the message list for a general-mode question
    pub fn general_messages(
        question: &str,
        history: &[HistoryMessage],
        max_history: usize,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(GENERAL_SYSTEM_PROMPT)];
        messages.extend(history_messages(history, max_history));
        messages.push(ChatMessage::user(question));
        messages
    }

    /// Render retrieved chunks as numbered context blocks labelled with
    /// their source
    pub fn build_context(chunks: &[ScoredChunk]) -> String {
        chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut source = chunk.source_file.clone();
                if let Some(page) = chunk.page {
                    source.push_str(&format!(", Page {}", page));
                }
                format!("[Chunk {} | {}]\n{}", i + 1, source, chunk.text)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Map the caller-supplied recent turns onto chat messages, keeping only
/// the last `max_history` and dropping roles the chat API does not accept
fn history_messages(history: &[HistoryMessage], max_history: usize) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(max_history);
    history[start..]
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .map(|m| ChatMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, source: &str, page: Option<u32>) -> ScoredChunk {
        ScoredChunk {
            text: text.to_string(),
            source_file: source.to_string(),
            page,
            ordinal: 0,
            score: 0.9,
        }
    }

    fn turn(role: &str, content: &str) -> HistoryMessage {
        HistoryMessage {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_rag_messages_carry_context_and_source() {
        let chunks = vec![hit("Revenue grew 10%.", "report.pdf", Some(3))];
        let messages = PromptBuilder::rag_messages("How did revenue do?", &chunks, &[], 6);

        assert_eq!(messages[0].role, "system");
        let user = &messages.last().unwrap().content;
        assert!(user.contains("report.pdf, Page 3"));
        assert!(user.contains("Revenue grew 10%."));
        assert!(user.contains("How did revenue do?"));
    }

    #[test]
    fn test_rag_messages_note_empty_context() {
        let messages = PromptBuilder::rag_messages("Anything?", &[], &[], 6);
        assert!(messages
            .last()
            .unwrap()
            .content
            .contains("No relevant passages"));
    }

    #[test]
    fn test_history_is_trimmed_to_last_n() {
        let history: Vec<HistoryMessage> = (0..10)
            .map(|i| turn(if i % 2 == 0 { "user" } else { "assistant" }, &format!("m{}", i)))
            .collect();

        let messages = PromptBuilder::general_messages("next", &history, 4);

        // system + 4 history + question
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[1].content, "m6");
        assert_eq!(messages[4].content, "m9");
    }

    #[test]
    fn test_general_messages_have_no_document_context() {
        let messages = PromptBuilder::general_messages("Hello there", &[], 6);
        assert_eq!(messages.len(), 2);
        assert!(!messages[1].content.contains("DOCUMENT CONTEXT"));
        assert_eq!(messages[1].content, "Hello there");
    }

    #[test]
    fn test_unknown_history_roles_are_dropped() {
        let history = vec![turn("system", "injected"), turn("user", "hi")];
        let messages = PromptBuilder::general_messages("next", &history, 6);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "hi");
    }
}
