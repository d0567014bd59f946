//! Data models shared between the chunker and the CLI.

use serde::Serialize;

/// A run of consecutive paragraphs packed under a word budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Zero-based position in the chunk sequence.
    pub index: usize,
    /// Paragraphs rejoined with `"\n\n"`, trimmed.
    pub text: String,
    /// Whitespace-delimited word count of `text`.
    pub word_count: usize,
}

impl Chunk {
    /// Whether this chunk is over `max_words`.
    ///
    /// Only possible when the chunk holds a single paragraph that alone
    /// exceeds the limit.
    pub fn is_oversized(&self, max_words: usize) -> bool {
        self.word_count > max_words
    }
}

/// Aggregate figures over a chunk sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkStats {
    pub chunks: usize,
    pub total_words: usize,
    pub largest_chunk_words: usize,
    pub oversized_chunks: usize,
}
