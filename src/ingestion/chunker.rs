//! Segment-aware chunking with a word budget and overlap
//!
//! Chunk boundaries are a pure function of the input segments, so
//! re-indexing the same bytes always reproduces the same chunks.

use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;

use super::{Segment, SegmentKind};

/// One chunk of text ready for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkText {
    /// Chunk text
    pub text: String,
    /// Page the chunk starts on, if known
    pub page: Option<u32>,
    /// Heading the chunk falls under, if one was seen
    pub section: Option<String>,
}

#[derive(Clone)]
struct Part {
    text: String,
    words: usize,
    /// Overlap carried from the previous chunk, not counted as content
    seed: bool,
    heading: bool,
    page: Option<u32>,
}

#[derive(Default)]
struct Accum {
    parts: Vec<Part>,
}

impl Accum {
    fn words(&self) -> usize {
        self.parts.iter().map(|p| p.words).sum()
    }

    fn content_words(&self) -> usize {
        self.parts.iter().filter(|p| !p.seed).map(|p| p.words).sum()
    }

    fn page(&self) -> Option<u32> {
        self.parts.iter().find(|p| !p.seed).and_then(|p| p.page)
    }

    fn push(&mut self, text: String, seed: bool, heading: bool, page: Option<u32>) {
        let words = word_count(&text);
        if words == 0 {
            return;
        }
        self.parts.push(Part {
            text,
            words,
            seed,
            heading,
            page,
        });
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Segment-aware chunker
pub struct SegmentChunker {
    max_words: usize,
    overlap_words: usize,
    min_words: usize,
}

impl SegmentChunker {
    /// Create a new chunker from config
    pub fn new(config: &ChunkingConfig) -> Self {
        let max_words = config.max_chunk_words.max(16);
        Self {
            max_words,
            overlap_words: config.overlap_words.min(max_words / 2),
            min_words: config.min_chunk_words,
        }
    }

    /// Chunk ordered segments into bounded texts.
    ///
    /// Tables are never split: a table that fits rides along with the text
    /// accumulated before it, and one that does not becomes its own chunk
    /// even past the nominal budget. Headings stay attached to the text
    /// that follows them.
    pub fn chunk(&self, segments: &[Segment]) -> Vec<ChunkText> {
        let mut chunks = Vec::new();
        let mut acc = Accum::default();
        let mut section: Option<String> = None;

        for segment in segments {
            let count = word_count(&segment.text);
            match segment.kind {
                SegmentKind::Heading => {
                    // Flush under the outgoing section before switching
                    if acc.words() + count > self.max_words && acc.content_words() > 0 {
                        self.flush(&mut acc, &mut chunks, &section);
                    }
                    section = Some(strip_heading_marks(&segment.text));
                    acc.push(segment.text.clone(), false, true, segment.page);
                }
                SegmentKind::Table => {
                    if acc.words() + count <= self.max_words {
                        acc.push(segment.text.clone(), false, false, segment.page);
                    } else {
                        self.flush(&mut acc, &mut chunks, &section);
                        if acc.words() + count <= self.max_words {
                            acc.push(segment.text.clone(), false, false, segment.page);
                        } else {
                            // Oversized table: emit whole, truncating a table
                            // destroys its meaning
                            chunks.push(ChunkText {
                                text: segment.text.clone(),
                                page: segment.page,
                                section: section.clone(),
                            });
                        }
                    }
                }
                SegmentKind::Prose => {
                    if count <= self.max_words {
                        if acc.words() + count > self.max_words && acc.content_words() > 0 {
                            self.flush(&mut acc, &mut chunks, &section);
                        }
                        acc.push(segment.text.clone(), false, false, segment.page);
                    } else {
                        self.chunk_long_prose(segment, &mut acc, &mut chunks, &section);
                    }
                }
            }
        }

        self.flush(&mut acc, &mut chunks, &section);

        // A document that ends on a heading still emits it
        if acc.content_words() > 0 {
            let text = acc
                .parts
                .iter()
                .filter(|p| !p.seed)
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let page = acc.page();
            chunks.push(ChunkText {
                text,
                page,
                section: section.clone(),
            });
        }

        // Drop exact duplicates after normalization
        let mut seen = HashSet::new();
        chunks.retain(|chunk| {
            let normalized = chunk
                .text
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            seen.insert(normalized)
        });

        chunks
    }

    /// Split an oversized prose segment at sentence boundaries
    fn chunk_long_prose(
        &self,
        segment: &Segment,
        acc: &mut Accum,
        chunks: &mut Vec<ChunkText>,
        section: &Option<String>,
    ) {
        for sentence in segment.text.split_sentence_bounds() {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }

            let count = word_count(sentence);
            if count > self.max_words {
                // A single run-on sentence past the budget falls back to
                // fixed word windows
                self.flush(acc, chunks, section);
                self.window_split(sentence, segment.page, section, chunks);
                continue;
            }

            if acc.words() + count > self.max_words && acc.content_words() > 0 {
                self.flush(acc, chunks, section);
            }
            acc.push(sentence.to_string(), false, false, segment.page);
        }
    }

    fn window_split(
        &self,
        text: &str,
        page: Option<u32>,
        section: &Option<String>,
        chunks: &mut Vec<ChunkText>,
    ) {
        let words: Vec<&str> = text.split_whitespace().collect();
        let step = (self.max_words - self.overlap_words).max(1);

        let mut start = 0;
        while start < words.len() {
            let end = (start + self.max_words).min(words.len());
            if end - start >= self.min_words || chunks.is_empty() {
                chunks.push(ChunkText {
                    text: words[start..end].join(" "),
                    page,
                    section: section.clone(),
                });
            }
            if end == words.len() {
                break;
            }
            start += step;
        }
    }

    /// Emit the accumulated chunk, seed the next one with overlap, and carry
    /// any trailing heading forward so it stays with the text it introduces.
    fn flush(&self, acc: &mut Accum, chunks: &mut Vec<ChunkText>, section: &Option<String>) {
        let mut carried: Vec<Part> = Vec::new();
        while matches!(acc.parts.last(), Some(p) if p.heading) {
            if let Some(part) = acc.parts.pop() {
                carried.push(part);
            }
        }
        carried.reverse();

        if acc.content_words() > 0 {
            let text = acc
                .parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string();
            let content_words = acc.content_words();
            let page = acc.page();

            if content_words >= self.min_words || chunks.is_empty() {
                chunks.push(ChunkText {
                    text: text.clone(),
                    page,
                    section: section.clone(),
                });
            }

            acc.parts.clear();
            if let Some(seed) = overlap_tail(&text, self.overlap_words) {
                acc.push(seed, true, false, None);
            }
        } else {
            acc.parts.clear();
        }

        acc.parts.extend(carried);
    }
}

/// Last `overlap` words of a chunk, carried into the next one for
/// continuity. Skipped when the chunk is not longer than the overlap.
fn overlap_tail(text: &str, overlap: usize) -> Option<String> {
    if overlap == 0 {
        return None;
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= overlap {
        return None;
    }
    Some(words[words.len() - overlap..].join(" "))
}

fn strip_heading_marks(text: &str) -> String {
    text.trim_start_matches('#').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max: usize, overlap: usize, min: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chunk_words: max,
            overlap_words: overlap,
            min_chunk_words: min,
        }
    }

    fn prose(text: &str) -> Segment {
        Segment {
            text: text.to_string(),
            kind: SegmentKind::Prose,
            page: None,
        }
    }

    fn table(text: &str) -> Segment {
        Segment {
            text: text.to_string(),
            kind: SegmentKind::Table,
            page: None,
        }
    }

    fn heading(text: &str) -> Segment {
        Segment {
            text: text.to_string(),
            kind: SegmentKind::Heading,
            page: None,
        }
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let chunker = SegmentChunker::new(&config(50, 10, 5));
        let segments = vec![
            prose(&"one sentence here. ".repeat(30)),
            table("| a | b |\n| --- | --- |\n| 1 | 2 |"),
        ];

        let first = chunker.chunk(&segments);
        let second = chunker.chunk(&segments);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    fn numbered_sentences(count: usize) -> String {
        (0..count)
            .map(|i| format!("Sentence number {} has exactly seven words total.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_long_prose_splits_at_sentences_within_budget() {
        let chunker = SegmentChunker::new(&config(40, 8, 5));
        let text = numbered_sentences(20);
        let chunks = chunker.chunk(&[prose(&text)]);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(word_count(&chunk.text) <= 40 + 8);
        }
    }

    #[test]
    fn test_oversized_table_is_emitted_whole() {
        let chunker = SegmentChunker::new(&config(20, 4, 2));
        let mut rows = String::from("| col1 | col2 | col3 |\n| --- | --- | --- |");
        for i in 0..30 {
            rows.push_str(&format!("\n| v{} | v{} | v{} |", i, i, i));
        }
        let chunks = chunker.chunk(&[table(&rows)]);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, rows);
    }

    #[test]
    fn test_small_table_joins_surrounding_text() {
        let chunker = SegmentChunker::new(&config(100, 10, 2));
        let chunks = chunker.chunk(&[
            prose("The quarterly figures are below."),
            table("| q | revenue |\n| --- | --- |\n| 1 | 10 |"),
        ]);

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("quarterly figures"));
        assert!(chunks[0].text.contains("| 1 | 10 |"));
    }

    #[test]
    fn test_table_rows_never_split_across_chunks() {
        let chunker = SegmentChunker::new(&config(30, 5, 2));
        let table_text = "| part | qty |\n| --- | --- |\n| bolt | 10 |\n| nut | 20 |";
        let filler = "Some leading text that takes space in the chunk budget here. ".repeat(5);
        let chunks = chunker.chunk(&[prose(&filler), table(table_text)]);

        let with_table: Vec<_> = chunks
            .iter()
            .filter(|c| c.text.contains("| part | qty |"))
            .collect();
        assert_eq!(with_table.len(), 1);
        assert!(with_table[0].text.contains("| nut | 20 |"));
    }

    #[test]
    fn test_heading_stays_with_following_prose() {
        let chunker = SegmentChunker::new(&config(30, 5, 2));
        let filler = "Filler words to nearly exhaust the running chunk budget now. ".repeat(4);
        let chunks = chunker.chunk(&[
            prose(&filler),
            heading("## Results"),
            prose("The results were positive overall."),
        ]);

        let with_heading: Vec<_> = chunks
            .iter()
            .filter(|c| c.text.contains("## Results"))
            .collect();
        assert_eq!(with_heading.len(), 1);
        assert!(with_heading[0].text.contains("results were positive"));
    }

    #[test]
    fn test_section_label_tracks_headings() {
        let chunker = SegmentChunker::new(&config(50, 5, 2));
        let chunks = chunker.chunk(&[
            heading("## Intro"),
            prose("Opening words about the document."),
        ]);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section.as_deref(), Some("Intro"));
    }

    #[test]
    fn test_overlap_is_carried_between_chunks() {
        let chunker = SegmentChunker::new(&config(20, 5, 2));
        let text = numbered_sentences(10);
        let chunks = chunker.chunk(&[prose(&text)]);

        assert!(chunks.len() > 1);
        let first_words: Vec<&str> = chunks[0].text.split_whitespace().collect();
        let tail = first_words[first_words.len() - 5..].join(" ");
        assert!(chunks[1].text.starts_with(&tail));
    }

    #[test]
    fn test_duplicate_chunks_are_dropped() {
        let chunker = SegmentChunker::new(&config(50, 0, 2));
        let chunks = chunker.chunk(&[
            prose("Repeated paragraph of text."),
            prose("Repeated   paragraph of TEXT."),
        ]);

        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_page_of_first_segment_wins() {
        let chunker = SegmentChunker::new(&config(100, 10, 2));
        let chunks = chunker.chunk(&[
            Segment {
                text: "Page two text.".into(),
                kind: SegmentKind::Prose,
                page: Some(2),
            },
            Segment {
                text: "Page three text.".into(),
                kind: SegmentKind::Prose,
                page: Some(3),
            },
        ]);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page, Some(2));
    }
}
