//! Text cleaning and recursive chunking.
//!
//! All lengths here are measured in characters, not bytes.

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{Document, DocumentChunk, DomainError};

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Mis-decoded UTF-8 sequences seen in extracted PDF and Windows text.
const MOJIBAKE: &[(&str, &str)] = &[("â€™", "'"), ("Â", ""), ("â", "")];

/// Separators tried in order: paragraph, line, sentence, word, then single characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Normalizes extracted text.
///
/// Known mojibake is repaired first so that removed characters cannot leave
/// behind a whitespace run; every whitespace run (blank lines included) then
/// collapses to a single space. The result is stable under repeated cleaning.
pub fn clean_text(text: &str) -> String {
    let mut repaired = text.to_string();
    for (broken, fixed) in MOJIBAKE {
        if repaired.contains(broken) {
            repaired = repaired.replace(broken, fixed);
        }
    }

    WHITESPACE_RUN
        .replace_all(&repaired, " ")
        .trim()
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkingOptions {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, DomainError> {
        if chunk_size == 0 {
            return Err(DomainError::validation("chunk_size must be greater than zero"));
        }
        if chunk_overlap >= chunk_size {
            return Err(DomainError::validation(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

/// Length-based splitter that recurses through progressively finer separators.
///
/// Pieces shorter than the chunk size are merged greedily; when a chunk is
/// emitted, its tail (at most `chunk_overlap` characters worth of pieces)
/// seeds the next one.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    options: ChunkingOptions,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(options: ChunkingOptions) -> Self {
        Self {
            options,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.options.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }

        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let ChunkingOptions {
            chunk_size,
            chunk_overlap,
        } = self.options;

        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > chunk_size && !window.is_empty() {
                if let Some(chunk) = join_trimmed(&window) {
                    merged.push(chunk);
                }
                while total > chunk_overlap || (total + len > chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        if let Some(chunk) = join_trimmed(&window) {
            merged.push(chunk);
        }
        merged
    }
}

/// Cleans each document and splits it into ordered chunks that inherit its metadata.
pub fn chunk_documents(documents: &[Document], options: &ChunkingOptions) -> Vec<DocumentChunk> {
    let splitter = RecursiveSplitter::new(*options);

    documents
        .iter()
        .flat_map(|doc| {
            let cleaned = clean_text(&doc.content);
            splitter
                .split_text(&cleaned)
                .into_iter()
                .enumerate()
                .map(|(i, text)| {
                    DocumentChunk::new(doc.id, text, i).with_metadata(doc.metadata.clone())
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits on `separator`, attaching each separator to the start of the piece that follows it.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (pos, _) in text.match_indices(separator) {
        if pos > start {
            pieces.push(&text[start..pos]);
        }
        start = pos;
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join_trimmed(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn splitter(size: usize, overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(ChunkingOptions::new(size, overlap).unwrap())
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        let cleaned = clean_text("  Hello \t world\n\n\n  second   line \r\n");
        assert_eq!(cleaned, "Hello world second line");
    }

    #[test]
    fn test_clean_text_repairs_mojibake() {
        assert_eq!(clean_text("itâ€™s fine"), "it's fine");
        assert_eq!(clean_text("price:Â 10"), "price: 10");
        assert_eq!(clean_text("a Â b"), "a b");
    }

    #[test]
    fn test_options_reject_overlap_not_below_size() {
        assert!(ChunkingOptions::new(100, 100).is_err());
        assert!(ChunkingOptions::new(100, 150).is_err());
        assert!(ChunkingOptions::new(0, 0).is_err());
        assert!(ChunkingOptions::new(100, 99).is_ok());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let chunks =
            splitter(30, 0).split_text("First paragraph here.\n\nSecond paragraph here.");
        assert_eq!(chunks, vec!["First paragraph here.", "Second paragraph here."]);
    }

    #[test]
    fn test_falls_back_to_words() {
        let chunks = splitter(12, 0).split_text("alpha beta gamma delta");
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn test_word_overlap() {
        let chunks = splitter(17, 6).split_text("one two three four five six");
        assert_eq!(chunks, vec!["one two three", "three four five", "five six"]);
    }

    #[test]
    fn test_two_thousand_characters_make_five_chunks() {
        let text: String = "abcdefghij".repeat(200);
        let doc = Document::new("plain.txt", text.clone()).with_source("plain.txt");

        let chunks = chunk_documents(&[doc.clone()], &ChunkingOptions::new(512, 50).unwrap());

        assert_eq!(chunks.len(), 5);
        let lengths: Vec<usize> = chunks.iter().map(|c| c.char_len()).collect();
        assert_eq!(lengths, vec![512, 512, 512, 512, 152]);
        for pair in chunks.windows(2) {
            let tail: String = pair[0].content.chars().skip(512 - 50).collect();
            assert!(pair[1].content.starts_with(&tail));
        }
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.document_id, doc.id);
            assert_eq!(chunk.source(), Some("plain.txt"));
        }
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let text = "é".repeat(40);
        let chunks = splitter(16, 4).split_text(&text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 16));
        assert!(chunks.iter().all(|c| c.chars().all(|ch| ch == 'é')));
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        let doc = Document::new("empty.txt", "   \n\n ");
        assert!(chunk_documents(&[doc], &ChunkingOptions::default()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_clean_text_is_idempotent(text in "\\PC{0,200}") {
            let once = clean_text(&text);
            prop_assert_eq!(clean_text(&once), once);
        }

        #[test]
        fn prop_clean_text_idempotent_with_mojibake(text in "[a-z Âââ€™\n\t]{0,200}") {
            let once = clean_text(&text);
            prop_assert_eq!(clean_text(&once), once);
        }

        #[test]
        fn prop_chunks_never_exceed_size(
            text in "[a-z .\n]{0,1500}",
            size in 1usize..300,
            overlap_seed in 0usize..300,
        ) {
            let overlap = overlap_seed % size;
            for chunk in splitter(size, overlap).split_text(&text) {
                prop_assert!(chunk.chars().count() <= size);
            }
        }

        #[test]
        fn prop_unbroken_text_overlaps_exactly(
            text in "[a-z]{1,1500}",
            size in 2usize..300,
            overlap_seed in 0usize..300,
        ) {
            let overlap = overlap_seed % size;
            let chunks = splitter(size, overlap).split_text(&text);
            for pair in chunks.windows(2) {
                let first: Vec<char> = pair[0].chars().collect();
                prop_assert_eq!(first.len(), size);
                let tail: String = first[size - overlap..].iter().collect();
                prop_assert!(pair[1].starts_with(&tail));
            }
        }

        #[test]
        fn prop_every_word_survives(
            words in proptest::collection::vec("[a-z]{1,8}", 1..80),
            size in 10usize..120,
        ) {
            let text = words.join(" ");
            let chunks = splitter(size, size / 4).split_text(&text);
            for word in &words {
                prop_assert!(chunks.iter().any(|c| c.split(' ').any(|w| w == word)));
            }
        }
    }
}
