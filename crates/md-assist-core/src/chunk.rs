//! Paragraph-boundary, word-bounded chunk packer.
//!
//! Splits a markdown document into [`Chunk`]s whose whitespace-delimited
//! word count stays within `max_words`. Paragraphs (text between `\n\n`
//! separators) are indivisible, so sentences and markdown blocks are never
//! broken mid-way.
//!
//! Word count stands in for model tokens. It is an approximation, not an
//! exact token budget.
//!
//! # Algorithm
//!
//! 1. Split the text on every `\n\n` (empty paragraphs are kept).
//! 2. For each paragraph, form a candidate: the accumulator, the separator,
//!    and the paragraph, trimmed.
//! 3. If the candidate is over `max_words`, flush the accumulator as a
//!    chunk and restart it with the paragraph alone.
//! 4. Otherwise the candidate becomes the accumulator.
//! 5. Flush whatever is left at the end.
//!
//! An empty accumulator is never flushed, so a leading oversized paragraph
//! does not produce an empty first chunk, and an empty document yields no
//! chunks at all. A paragraph that alone exceeds the limit becomes its own
//! oversized chunk.
//!
//! # Example
//!
//! ```rust
//! use md_assist_core::chunk::pack_paragraphs;
//!
//! let chunks = pack_paragraphs("one two\n\nthree four\n\nfive", 4);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "one two\n\nthree four");
//! assert_eq!(chunks[1].text, "five");
//! ```

use crate::models::{Chunk, ChunkStats};

/// Markdown paragraph break.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Default per-chunk word budget.
pub const DEFAULT_MAX_WORDS: usize = 4000;

/// Split text into paragraphs on every `\n\n`.
///
/// Empty strings are kept: consecutive separators, or a separator at either
/// end of the text, produce empty paragraphs.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    text.split(PARAGRAPH_SEPARATOR).collect()
}

/// Count whitespace-delimited words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Pack paragraphs greedily into chunks of at most `max_words` words.
///
/// Returns chunks with contiguous indices starting at 0. The result is
/// deterministic for a given `(text, max_words)`.
///
/// # Guarantees
///
/// - Every chunk text is trimmed and non-empty.
/// - Every chunk is within `max_words`, except a chunk made of a single
///   paragraph that alone exceeds it.
/// - Joining the chunk texts with `\n\n` gives back the document's
///   non-empty paragraphs in order.
pub fn pack_paragraphs(text: &str, max_words: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_words = 0;

    for paragraph in split_paragraphs(text) {
        // The separator is whitespace, so words never merge across it and
        // the candidate's count is the sum of both sides.
        let paragraph_words = word_count(paragraph);
        let candidate_words = current_words + paragraph_words;

        if candidate_words > max_words {
            flush(&mut chunks, &current, current_words);
            current = paragraph.trim().to_string();
            current_words = paragraph_words;
        } else {
            let candidate = format!("{}{}{}", current, PARAGRAPH_SEPARATOR, paragraph);
            current = candidate.trim().to_string();
            current_words = candidate_words;
        }
    }

    flush(&mut chunks, &current, current_words);
    chunks
}

fn flush(chunks: &mut Vec<Chunk>, text: &str, words: usize) {
    if text.is_empty() {
        return;
    }
    chunks.push(Chunk {
        index: chunks.len(),
        text: text.to_string(),
        word_count: words,
    });
}

/// Summarize a chunk sequence against the budget it was packed with.
pub fn summarize(chunks: &[Chunk], max_words: usize) -> ChunkStats {
    ChunkStats {
        chunks: chunks.len(),
        total_words: chunks.iter().map(|c| c.word_count).sum(),
        largest_chunk_words: chunks.iter().map(|c| c.word_count).max().unwrap_or(0),
        oversized_chunks: chunks.iter().filter(|c| c.is_oversized(max_words)).count(),
    }
}
