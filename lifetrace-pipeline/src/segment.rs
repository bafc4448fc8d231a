//! Document segmentation.
//!
//! Two segmenters feed the chunked strategies:
//! - [`split_paragraphs`] cuts on line breaks and folds short paragraphs
//!   forward so every chunk carries enough text to extract from.
//! - [`RecursiveSplitter`] cuts on the coarsest separator that occurs in the
//!   text, recursing into finer separators for oversized pieces, and packs
//!   the pieces into chunks with a trailing overlap.
//!
//! All lengths are measured in characters, not bytes.

use std::collections::VecDeque;

use lifetrace_core::Document;

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters and always applies.
pub const DEFAULT_SEPARATORS: [&str; 9] = ["\n\n", "\n", "。", "！", "？", ";", ":", " ", ""];

fn char_len(text: &str) -> usize {
    text.chars().count()
}

// ============================================================================
// PARAGRAPH SEGMENTATION
// ============================================================================

/// Split text on paragraph boundaries.
///
/// A paragraph shorter than `min_length` is merged into the paragraph that
/// follows it. A short tail with nothing after it is appended to the last
/// chunk instead. Blank lines are dropped.
pub fn split_paragraphs(text: &str, min_length: usize) -> Vec<Document> {
    let mut chunks: Vec<String> = Vec::new();
    let mut pending = String::new();

    for paragraph in text.lines().map(str::trim).filter(|p| !p.is_empty()) {
        if !pending.is_empty() {
            pending.push('\n');
        }
        pending.push_str(paragraph);
        if char_len(&pending) >= min_length {
            chunks.push(std::mem::take(&mut pending));
        }
    }

    if !pending.is_empty() {
        match chunks.last_mut() {
            Some(last) => {
                last.push('\n');
                last.push_str(&pending);
            }
            None => chunks.push(pending),
        }
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(index, content)| Document::new(content, index))
        .collect()
}

/// Trajectory points each chunk may return.
///
/// A single chunk gets the full per-chunk cap. Otherwise the total target is
/// shared evenly, clamped to `[1, max_per_chunk]`.
pub fn points_per_chunk(chunk_count: usize, max_per_chunk: usize, total_target: usize) -> usize {
    if chunk_count <= 1 {
        return max_per_chunk;
    }
    (total_target / chunk_count).min(max_per_chunk).max(1)
}

// ============================================================================
// RECURSIVE SPLITTER
// ============================================================================

/// Length and separator aware splitter with overlap between chunks.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split into trimmed, non-empty chunks of at most `chunk_size` characters.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    /// Split and drop chunks shorter than `min_length`.
    pub fn split_documents(&self, text: &str, min_length: usize) -> Vec<Document> {
        self.split(text)
            .into_iter()
            .filter(|chunk| char_len(chunk) >= min_length)
            .enumerate()
            .map(|(index, content)| Document::new(content, index))
            .collect()
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, finer) = match separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()))
        {
            Some(index) => (separators[index].as_str(), &separators[index + 1..]),
            None => ("", &separators[separators.len()..]),
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.pack(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.pack(&fitting));
        }
        chunks
    }

    /// Greedily pack pieces into chunks, carrying up to `chunk_overlap`
    /// characters of trailing pieces into the next chunk.
    fn pack(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Split so each separator stays attached to the start of the piece after it.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, c)| &text[start..start + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        if index > start {
            pieces.push(&text[start..index]);
        }
        start = index;
    }
    pieces.push(&text[start..]);
    pieces.retain(|piece| !piece.is_empty());
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn para(len: usize, fill: char) -> String {
        std::iter::repeat(fill).take(len).collect()
    }

    #[test]
    fn test_paragraphs_long_enough_stay_separate() {
        let text = format!("{}\n\n{}", para(210, 'a'), para(220, 'b'));
        let docs = split_paragraphs(&text, 200);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].length(), 210);
        assert_eq!(docs[1].sequence_index(), 1);
    }

    #[test]
    fn test_short_paragraph_merges_forward() {
        let text = format!("{}\n{}\n{}", para(50, 'a'), para(180, 'b'), para(300, 'c'));
        let docs = split_paragraphs(&text, 200);
        assert_eq!(docs.len(), 2);
        assert!(docs[0].content().starts_with('a'));
        assert!(docs[0].content().ends_with('b'));
        assert_eq!(docs[1].content(), para(300, 'c'));
    }

    #[test]
    fn test_short_tail_joins_last_chunk() {
        let text = format!("{}\n\n{}", para(250, 'a'), para(20, 'z'));
        let docs = split_paragraphs(&text, 200);
        assert_eq!(docs.len(), 1);
        assert!(docs[0].content().ends_with('z'));
    }

    #[test]
    fn test_whole_text_shorter_than_minimum_is_one_chunk() {
        let docs = split_paragraphs("tiny\n\nalso tiny", 200);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content(), "tiny\nalso tiny");
    }

    #[test]
    fn test_blank_text_yields_nothing() {
        assert!(split_paragraphs("  \n\n \n", 200).is_empty());
    }

    #[test]
    fn test_points_per_chunk() {
        assert_eq!(points_per_chunk(0, 10, 40), 10);
        assert_eq!(points_per_chunk(1, 10, 40), 10);
        assert_eq!(points_per_chunk(2, 10, 40), 10);
        assert_eq!(points_per_chunk(5, 10, 40), 8);
        assert_eq!(points_per_chunk(100, 10, 40), 1);
    }

    #[test]
    fn test_splitter_prefers_paragraph_breaks() {
        let splitter = RecursiveSplitter::new(30, 0);
        let chunks = splitter.split("first paragraph here\n\nsecond paragraph here");
        assert_eq!(chunks, vec!["first paragraph here", "second paragraph here"]);
    }

    #[test]
    fn test_splitter_handles_cjk_sentences() {
        let splitter = RecursiveSplitter::new(12, 0);
        let text = "苏轼生于眉州眉山。后来到开封参加科举。晚年被贬到儋州。";
        let chunks = splitter.split(text);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 12, "chunk too long: {chunk}");
        }
        assert!(chunks[0].starts_with("苏轼"));
    }

    #[test]
    fn test_splitter_carries_overlap() {
        let splitter = RecursiveSplitter::new(20, 10);
        let chunks = splitter.split("aaaa bbbb cccc dddd eeee ffff");
        assert_eq!(chunks, vec!["aaaa bbbb cccc dddd", "cccc dddd eeee ffff"]);
    }

    #[test]
    fn test_split_documents_filters_short_chunks() {
        let splitter = RecursiveSplitter::new(46, 0).with_separators(["\n\n", ""]);
        let text = format!("{}\n\nhi", para(45, 'x'));
        let docs = splitter.split_documents(&text, 30);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].length(), 45);
    }

    proptest! {
        #[test]
        fn prop_chunks_respect_size(
            text in lifetrace_test_utils::generators::arb_article_text(),
            size in 20usize..300,
            overlap_ratio in 0usize..50,
        ) {
            let overlap = size * overlap_ratio / 100;
            let splitter = RecursiveSplitter::new(size, overlap);
            for chunk in splitter.split(&text) {
                prop_assert!(!chunk.is_empty());
                prop_assert!(chunk.chars().count() <= size);
            }
        }

        #[test]
        fn prop_points_per_chunk_bounded(
            chunks in 0usize..500,
            per_chunk in 1usize..50,
            target in 0usize..500,
        ) {
            let cap = points_per_chunk(chunks, per_chunk, target);
            prop_assert!(cap >= 1);
            prop_assert!(cap <= per_chunk);
        }
    }
}
