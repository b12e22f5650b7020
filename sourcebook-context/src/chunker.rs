//! Token-windowed text chunking for retrieval indexing.
//!
//! This module splits raw document text into overlapping chunks sized in
//! whitespace-delimited tokens rather than bytes or characters. Overlap between
//! consecutive windows preserves context that would otherwise be lost at chunk
//! boundaries, which matters for retrieval quality: a sentence cut in half at a
//! boundary is still fully present in at least one chunk.
//!
//! The two main types are:
//! - [`TokenChunker`]: Validated chunking configuration plus the `split` operation.
//! - [`Chunk`]: A single window of text with its position and token count.
//!
//! Chunk text is always a contiguous slice of the original document, spanning
//! from the first byte of the window's first token to the last byte of its last
//! token. Interior whitespace is preserved exactly; leading and trailing
//! whitespace around each window is not.
//!
//! # Usage
//!
//! ```
//! use sourcebook_context::TokenChunker;
//!
//! let chunker = TokenChunker::new(500, 100).unwrap();
//! let chunks = chunker.split("some document text here");
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].token_count, 4);
//! ```

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

/// Matches one whitespace-delimited token. Compiled once per process.
fn token_pattern() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(r"\S+").expect("token pattern is valid"))
}

/// Errors from constructing a [`TokenChunker`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkerError {
    /// `max_tokens` must be at least 1 for the window to make progress.
    #[error("max_tokens must be nonzero")]
    ZeroWindow,

    /// The overlap must be strictly smaller than the window, otherwise the
    /// window start never advances.
    #[error("overlap_tokens ({overlap}) must be smaller than max_tokens ({max})")]
    OverlapTooLarge { overlap: usize, max: usize },
}

/// One window of document text produced by [`TokenChunker::split`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Zero-based position of this chunk within its source document.
    pub index: usize,
    /// The chunk text, sliced verbatim from the original document.
    pub text: String,
    /// Number of whitespace-delimited tokens in `text`.
    pub token_count: usize,
}

/// Splits text into overlapping token windows.
///
/// Windows are `max_tokens` tokens wide and each window after the first starts
/// `max_tokens - overlap_tokens` tokens after its predecessor, so consecutive
/// chunks share exactly `overlap_tokens` tokens (except possibly the final
/// chunk, which may be shorter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenChunker {
    max_tokens: usize,
    overlap_tokens: usize,
}

impl TokenChunker {
    /// Create a chunker, validating that the configuration can make progress.
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Result<Self, ChunkerError> {
        if max_tokens == 0 {
            return Err(ChunkerError::ZeroWindow);
        }
        if overlap_tokens >= max_tokens {
            return Err(ChunkerError::OverlapTooLarge {
                overlap: overlap_tokens,
                max: max_tokens,
            });
        }
        Ok(Self {
            max_tokens,
            overlap_tokens,
        })
    }

    /// The maximum number of tokens per chunk.
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// The number of tokens shared between consecutive chunks.
    pub fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }

    /// Split `text` into overlapping chunks.
    ///
    /// Text that is empty or contains only whitespace produces no chunks.
    /// Text with `max_tokens` tokens or fewer produces a single chunk holding
    /// the whole token stream.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        // Byte spans of every token, in document order.
        let spans: Vec<(usize, usize)> = token_pattern()
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect();
        if spans.is_empty() {
            return Vec::new();
        }

        let stride = self.max_tokens - self.overlap_tokens;
        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.max_tokens).min(spans.len());
            let first = spans[start].0;
            let last = spans[end - 1].1;
            chunks.push(Chunk {
                index: chunks.len(),
                text: text[first..last].to_string(),
                token_count: end - start,
            });
            if end == spans.len() {
                break;
            }
            start += stride;
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_window() {
        assert_eq!(TokenChunker::new(0, 0), Err(ChunkerError::ZeroWindow));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_window() {
        assert_eq!(
            TokenChunker::new(10, 10),
            Err(ChunkerError::OverlapTooLarge {
                overlap: 10,
                max: 10
            })
        );
        assert_eq!(
            TokenChunker::new(10, 15),
            Err(ChunkerError::OverlapTooLarge {
                overlap: 15,
                max: 10
            })
        );
    }

    #[test]
    fn empty_and_whitespace_input_produce_no_chunks() {
        let chunker = TokenChunker::new(5, 2).unwrap();
        assert!(chunker.split("").is_empty());
        assert!(chunker.split("   \n\t  ").is_empty());
    }

    #[test]
    fn short_input_yields_single_chunk() {
        let chunker = TokenChunker::new(10, 3).unwrap();
        let chunks = chunker.split("only four tokens here");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "only four tokens here");
        assert_eq!(chunks[0].token_count, 4);
    }

    #[test]
    fn single_token_input() {
        let chunker = TokenChunker::new(5, 2).unwrap();
        let chunks = chunker.split("  lonely  ");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "lonely");
        assert_eq!(chunks[0].token_count, 1);
    }

    #[test]
    fn windows_overlap_by_configured_token_count() {
        let chunker = TokenChunker::new(5, 2).unwrap();
        let text = "the quick brown fox jumps over the lazy dog today";
        let chunks = chunker.split(text);

        // 10 tokens, stride 3: windows start at tokens 0, 3, 6.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "the quick brown fox jumps");
        assert_eq!(chunks[1].text, "fox jumps over the lazy");
        assert_eq!(chunks[2].text, "the lazy dog today");
        assert_eq!(chunks[2].token_count, 4);

        // The last 2 tokens of each chunk are the first 2 of the next.
        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].text.split_whitespace().collect();
            let next: Vec<&str> = pair[1].text.split_whitespace().collect();
            assert_eq!(prev[prev.len() - 2..], next[..2]);
        }
    }

    #[test]
    fn exact_window_size_produces_one_chunk() {
        let chunker = TokenChunker::new(4, 1).unwrap();
        let chunks = chunker.split("one two three four");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_count, 4);
    }

    #[test]
    fn every_token_appears_in_some_chunk() {
        let chunker = TokenChunker::new(7, 3).unwrap();
        let text: String = (0..50)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunker.split(&text);

        // Dropping each later chunk's leading overlap tokens reconstructs the
        // original token stream exactly.
        let mut reconstructed: Vec<&str> = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let tokens: Vec<&str> = chunk.text.split_whitespace().collect();
            let skip = if i == 0 { 0 } else { 3 };
            reconstructed.extend(&tokens[skip..]);
        }
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(reconstructed, original);
    }

    #[test]
    fn chunk_text_preserves_interior_whitespace() {
        let chunker = TokenChunker::new(10, 2).unwrap();
        let text = "alpha\n\nbeta\tgamma  delta";
        let chunks = chunker.split(text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn indexes_are_sequential() {
        let chunker = TokenChunker::new(3, 1).unwrap();
        let text = "a b c d e f g h i j";
        let chunks = chunker.split(text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }
}
