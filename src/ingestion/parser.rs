//! Multi-format text extraction
//!
//! Each accepted format has one `TextExtractor`; dispatch happens once in
//! `DocumentParser::parse`. Extractors are pure transforms from bytes to
//! ordered segments. Images carry no machine-readable text, so the pipeline
//! transcribes them with the vision model first and feeds the transcript
//! through `markdown_segments`.

use regex::Regex;

use crate::error::{Error, Result};
use crate::types::FileType;

use super::{Segment, SegmentKind};

/// Rows per table segment when flattening large CSV files. The header row
/// repeats in every segment so each chunk stays self-describing.
const CSV_ROWS_PER_SEGMENT: usize = 50;

/// A page with less extractable text than this is treated as empty
const MIN_PAGE_TEXT_CHARS: usize = 10;

/// Extracts normalized text segments from one file format
pub trait TextExtractor {
    fn extract(&self, filename: &str, data: &[u8]) -> Result<Vec<Segment>>;
}

/// Format dispatcher
pub struct DocumentParser;

impl DocumentParser {
    /// Parse machine-readable bytes into ordered segments
    pub fn parse(filename: &str, file_type: &FileType, data: &[u8]) -> Result<Vec<Segment>> {
        let extractor: &dyn TextExtractor = match file_type {
            FileType::Pdf => &PdfExtractor,
            FileType::Docx => &DocxExtractor,
            FileType::Txt => &PlainTextExtractor,
            FileType::Markdown => &MarkdownExtractor,
            FileType::Csv => &CsvExtractor,
            FileType::Json => &JsonExtractor,
            FileType::Image => {
                return Err(Error::internal("Images must be transcribed before parsing"))
            }
            FileType::Unknown => return Err(Error::UnsupportedFormat(filename.to_string())),
        };

        let segments = extractor.extract(filename, data)?;
        if segments.is_empty() {
            return Err(Error::parse_failure(filename, "No readable content found"));
        }
        Ok(segments)
    }
}

/// Clean extracted text: collapse runs of blank lines and spaces, strip NULs
fn clean_text(text: &str) -> String {
    let text = text.replace('\0', "");
    let text = Regex::new(r"\n{3,}").unwrap().replace_all(&text, "\n\n");
    let text = Regex::new(r" {3,}").unwrap().replace_all(&text, " ");
    text.trim().to_string()
}

/// Render rows as a Markdown table. Needs a header row plus at least one
/// data row; short cells are padded to the header width.
fn table_to_markdown(rows: &[Vec<String>]) -> Option<String> {
    if rows.len() < 2 {
        return None;
    }
    let width = rows[0].len();
    if width == 0 {
        return None;
    }

    let render_row = |row: &Vec<String>| {
        let cells: Vec<String> = (0..width)
            .map(|i| {
                row.get(i)
                    .map(|c| c.split_whitespace().collect::<Vec<_>>().join(" "))
                    .unwrap_or_default()
            })
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render_row(&rows[0]));
    lines.push(format!("| {} |", vec!["---"; width].join(" | ")));
    for row in &rows[1..] {
        lines.push(render_row(row));
    }

    Some(lines.join("\n"))
}

/// Split a line into columns on tabs or runs of 2+ spaces. Returns None for
/// lines that do not look like table rows.
fn split_columns(line: &str) -> Option<Vec<String>> {
    let cells: Vec<String> = Regex::new(r"\t+| {2,}")
        .unwrap()
        .split(line.trim())
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    if cells.len() >= 2 {
        Some(cells)
    } else {
        None
    }
}

fn push_prose(segments: &mut Vec<Segment>, prose: &mut Vec<String>, page: Option<u32>) {
    if prose.is_empty() {
        return;
    }
    let text = prose.join("\n").trim().to_string();
    prose.clear();
    if !text.is_empty() {
        segments.push(Segment {
            text,
            kind: SegmentKind::Prose,
            page,
        });
    }
}

fn push_table(segments: &mut Vec<Segment>, rows: &mut Vec<Vec<String>>, page: Option<u32>) {
    if rows.is_empty() {
        return;
    }
    if let Some(markdown) = table_to_markdown(rows) {
        segments.push(Segment {
            text: markdown,
            kind: SegmentKind::Table,
            page,
        });
    } else {
        // A single columnar line is not a table; keep the text as prose
        let text = rows
            .iter()
            .map(|r| r.join(" "))
            .collect::<Vec<_>>()
            .join("\n");
        segments.push(Segment {
            text,
            kind: SegmentKind::Prose,
            page,
        });
    }
    rows.clear();
}

/// Split page text into prose and table segments, preserving line order.
/// Consecutive lines with aligned columns are treated as one tabular region.
fn page_segments(text: &str, page: Option<u32>) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut prose: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            push_table(&mut segments, &mut rows, page);
            push_prose(&mut segments, &mut prose, page);
            continue;
        }

        if let Some(cells) = split_columns(line) {
            push_prose(&mut segments, &mut prose, page);
            rows.push(cells);
        } else {
            push_table(&mut segments, &mut rows, page);
            prose.push(line.to_string());
        }
    }

    push_table(&mut segments, &mut rows, page);
    push_prose(&mut segments, &mut prose, page);

    segments
}

// ---------------------------------------------------------------- PDF

struct PdfExtractor;

impl PdfExtractor {
    /// Whole-document extraction in a separate thread with a timeout.
    /// pdf-extract can hang on PDFs with unusual font programs.
    fn extract_with_timeout(filename: &str, data: &[u8]) -> Result<String> {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let data_vec = data.to_vec();
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = pdf_extract::extract_text_from_mem(&data_vec);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(Duration::from_secs(60)) {
            Ok(Ok(text)) => {
                let _ = handle.join();
                Ok(text)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(Error::parse_failure(filename, e.to_string()))
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::error!("PDF extraction timeout after 60s for {}", filename);
                Err(Error::parse_failure(filename, "PDF extraction timed out"))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(Error::parse_failure(filename, "PDF extraction crashed"))
            }
        }
    }
}

impl TextExtractor for PdfExtractor {
    fn extract(&self, filename: &str, data: &[u8]) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();

        match lopdf::Document::load_mem(data) {
            Ok(doc) => {
                let pages = doc.get_pages();
                let total_pages = pages.len();

                for (&page_num, _) in pages.iter() {
                    let text = match doc.extract_text(&[page_num]) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::debug!("Could not extract page {}: {}", page_num, e);
                            continue;
                        }
                    };

                    let text = clean_text(&text);
                    if text.len() < MIN_PAGE_TEXT_CHARS {
                        tracing::warn!(
                            "No usable text on page {}/{} of {}",
                            page_num,
                            total_pages,
                            filename
                        );
                        continue;
                    }

                    segments.extend(page_segments(&text, Some(page_num)));
                }
            }
            Err(e) => {
                tracing::warn!("lopdf failed to load {}: {}", filename, e);
            }
        }

        // Fallback for fonts lopdf cannot decode
        if segments.is_empty() {
            let text = Self::extract_with_timeout(filename, data)?;
            let text = clean_text(&text);
            if text.is_empty() {
                return Err(Error::parse_failure(
                    filename,
                    "No text content could be extracted from PDF",
                ));
            }
            segments = page_segments(&text, None);
        }

        Ok(segments)
    }
}

// ---------------------------------------------------------------- DOCX

struct DocxExtractor;

fn paragraph_text(paragraph: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let docx_rs::RunChild::Text(t) = run_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text.trim().to_string()
}

/// Markdown heading depth for a styled paragraph, following the original
/// document's style hierarchy: Heading 1 maps to `##`, Heading 2 to `###`,
/// deeper levels to `####`.
fn heading_depth(paragraph: &docx_rs::Paragraph) -> Option<usize> {
    let style = paragraph.property.style.as_ref()?.val.to_lowercase();
    if !style.starts_with("heading") {
        return None;
    }
    let digits: String = style.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.parse::<usize>() {
        Ok(1) => Some(2),
        Ok(2) => Some(3),
        _ => Some(4),
    }
}

fn docx_table_rows(table: &docx_rs::Table) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for row_child in &table.rows {
        match row_child {
            docx_rs::TableChild::TableRow(row) => {
                let mut cells = Vec::new();
                for cell_child in &row.cells {
                    match cell_child {
                        docx_rs::TableRowChild::TableCell(cell) => {
                            let mut cell_text = String::new();
                            for content in &cell.children {
                                if let docx_rs::TableCellContent::Paragraph(p) = content {
                                    let text = paragraph_text(p);
                                    if !text.is_empty() {
                                        if !cell_text.is_empty() {
                                            cell_text.push(' ');
                                        }
                                        cell_text.push_str(&text);
                                    }
                                }
                            }
                            cells.push(cell_text);
                        }
                    }
                }
                rows.push(cells);
            }
        }
    }
    rows
}

impl TextExtractor for DocxExtractor {
    fn extract(&self, filename: &str, data: &[u8]) -> Result<Vec<Segment>> {
        let doc = docx_rs::read_docx(data)
            .map_err(|e| Error::parse_failure(filename, e.to_string()))?;

        let mut segments = Vec::new();

        for child in doc.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(paragraph) => {
                    let text = paragraph_text(&paragraph);
                    if text.is_empty() {
                        continue;
                    }
                    match heading_depth(&paragraph) {
                        Some(depth) => segments.push(Segment {
                            text: format!("{} {}", "#".repeat(depth), text),
                            kind: SegmentKind::Heading,
                            page: None,
                        }),
                        None => segments.push(Segment {
                            text,
                            kind: SegmentKind::Prose,
                            page: None,
                        }),
                    }
                }
                docx_rs::DocumentChild::Table(table) => {
                    let rows = docx_table_rows(&table);
                    if let Some(markdown) = table_to_markdown(&rows) {
                        segments.push(Segment {
                            text: markdown,
                            kind: SegmentKind::Table,
                            page: None,
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(segments)
    }
}

// ---------------------------------------------------------------- Text

struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, _filename: &str, data: &[u8]) -> Result<Vec<Segment>> {
        let text = clean_text(&String::from_utf8_lossy(data));

        let segments = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| Segment {
                text: p.to_string(),
                kind: SegmentKind::Prose,
                page: None,
            })
            .collect();

        Ok(segments)
    }
}

// ---------------------------------------------------------------- Markdown

struct MarkdownExtractor;

impl TextExtractor for MarkdownExtractor {
    fn extract(&self, _filename: &str, data: &[u8]) -> Result<Vec<Segment>> {
        Ok(markdown_segments(&String::from_utf8_lossy(data)))
    }
}

fn heading_hashes(level: pulldown_cmark::HeadingLevel) -> usize {
    use pulldown_cmark::HeadingLevel::*;
    match level {
        H1 => 1,
        H2 => 2,
        H3 => 3,
        H4 => 4,
        H5 => 5,
        H6 => 6,
    }
}

fn flush_markdown_block(segments: &mut Vec<Segment>, block: &mut String) {
    let text = block.trim().to_string();
    block.clear();
    if !text.is_empty() {
        segments.push(Segment {
            text,
            kind: SegmentKind::Prose,
            page: None,
        });
    }
}

/// Walk a Markdown document into segments: headings and pipe tables become
/// their own segments, everything else is prose per block. Also used for
/// vision-model transcripts so transcribed tables survive as tables.
pub fn markdown_segments(text: &str) -> Vec<Segment> {
    use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

    let mut segments = Vec::new();
    let mut block = String::new();
    let mut heading_level: Option<usize> = None;
    let mut in_table = false;
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut cell = String::new();

    for event in Parser::new_ext(text, Options::ENABLE_TABLES) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                flush_markdown_block(&mut segments, &mut block);
                heading_level = Some(heading_hashes(level));
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(level) = heading_level.take() {
                    let text = block.trim().to_string();
                    block.clear();
                    if !text.is_empty() {
                        segments.push(Segment {
                            text: format!("{} {}", "#".repeat(level), text),
                            kind: SegmentKind::Heading,
                            page: None,
                        });
                    }
                }
            }
            Event::Start(Tag::Table(_)) => {
                flush_markdown_block(&mut segments, &mut block);
                in_table = true;
                rows.clear();
            }
            Event::End(TagEnd::Table) => {
                in_table = false;
                if let Some(markdown) = table_to_markdown(&rows) {
                    segments.push(Segment {
                        text: markdown,
                        kind: SegmentKind::Table,
                        page: None,
                    });
                }
                rows.clear();
            }
            Event::Start(Tag::TableCell) => cell.clear(),
            Event::End(TagEnd::TableCell) => {
                cells.push(cell.trim().to_string());
                cell.clear();
            }
            Event::End(TagEnd::TableHead) | Event::End(TagEnd::TableRow) => {
                if !cells.is_empty() {
                    rows.push(std::mem::take(&mut cells));
                }
            }
            Event::Text(t) | Event::Code(t) => {
                if in_table {
                    cell.push_str(&t);
                } else {
                    block.push_str(&t);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if in_table {
                    cell.push(' ');
                } else {
                    block.push('\n');
                }
            }
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::CodeBlock) => {
                flush_markdown_block(&mut segments, &mut block);
            }
            _ => {}
        }
    }

    flush_markdown_block(&mut segments, &mut block);
    segments
}

// ---------------------------------------------------------------- CSV

struct CsvExtractor;

impl TextExtractor for CsvExtractor {
    fn extract(&self, filename: &str, data: &[u8]) -> Result<Vec<Segment>> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| Error::parse_failure(filename, e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut segments = Vec::new();
        let mut rows: Vec<Vec<String>> = vec![headers.clone()];

        for record in reader.records() {
            let record = record.map_err(|e| Error::parse_failure(filename, e.to_string()))?;
            rows.push(record.iter().map(|c| c.to_string()).collect());

            if rows.len() > CSV_ROWS_PER_SEGMENT {
                if let Some(markdown) = table_to_markdown(&rows) {
                    segments.push(Segment {
                        text: markdown,
                        kind: SegmentKind::Table,
                        page: None,
                    });
                }
                rows = vec![headers.clone()];
            }
        }

        if rows.len() > 1 {
            if let Some(markdown) = table_to_markdown(&rows) {
                segments.push(Segment {
                    text: markdown,
                    kind: SegmentKind::Table,
                    page: None,
                });
            }
        }

        Ok(segments)
    }
}

// ---------------------------------------------------------------- JSON

struct JsonExtractor;

impl TextExtractor for JsonExtractor {
    fn extract(&self, filename: &str, data: &[u8]) -> Result<Vec<Segment>> {
        let value: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| Error::parse_failure(filename, format!("Invalid JSON: {}", e)))?;

        let pretty = serde_json::to_string_pretty(&value)?;

        Ok(vec![Segment {
            text: pretty,
            kind: SegmentKind::Prose,
            page: None,
        }])
    }
}
