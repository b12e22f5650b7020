//! Blended relevance scoring for search hits.
//!
//! Pure semantic similarity ranks paraphrases well but can miss chunks that
//! literally contain the query terms, so the final ranking blends four signals
//! into one score:
//!
//! - semantic similarity between query and chunk (weight 0.4)
//! - fraction of meaningful query words appearing in the chunk (weight 0.3)
//! - a fixed bonus when the chunk contains the whole query as a phrase (0.2)
//! - a fixed bonus when semantic similarity alone is already strong (0.1)
//!
//! All text comparison is case-insensitive. Common question words carry no
//! signal and are excluded from the word-overlap fraction.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Weight of the semantic similarity component.
pub const SEMANTIC_WEIGHT: f32 = 0.4;
/// Weight of the query-word overlap component.
pub const LEXICAL_WEIGHT: f32 = 0.3;
/// Flat bonus when the chunk contains the whole query verbatim.
pub const PHRASE_BONUS: f32 = 0.2;
/// Flat bonus when semantic similarity exceeds [`HIGH_SEMANTIC_THRESHOLD`].
pub const HIGH_SEMANTIC_BONUS: f32 = 0.1;
/// Semantic score above which the high-similarity bonus applies.
pub const HIGH_SEMANTIC_THRESHOLD: f32 = 0.5;
/// Default floor below which results are dropped entirely.
pub const DEFAULT_MIN_RELEVANCE: f32 = 0.3;

/// Question words that carry no retrieval signal.
const STOPWORDS: &[&str] = &[
    "what", "does", "do", "is", "are", "the", "a", "an", "in", "on", "at", "to", "for", "of",
    "with", "by",
];

fn word_pattern() -> &'static Regex {
    static WORD_RE: OnceLock<Regex> = OnceLock::new();
    WORD_RE.get_or_init(|| Regex::new(r"\w+").expect("word pattern is valid"))
}

/// Blend semantic similarity with lexical overlap into the final relevance
/// score for one chunk.
///
/// A query containing only stopwords has no lexical signal; its relevance is
/// the raw semantic score.
pub fn relevance_score(chunk_text: &str, query: &str, semantic_score: f32) -> f32 {
    let chunk_lower = chunk_text.to_lowercase();
    let query_lower = query.to_lowercase();

    let query_words: HashSet<&str> = word_pattern()
        .find_iter(&query_lower)
        .map(|m| m.as_str())
        .filter(|word| !STOPWORDS.contains(word))
        .collect();
    if query_words.is_empty() {
        return semantic_score;
    }

    let matched = query_words
        .iter()
        .filter(|word| chunk_lower.contains(**word))
        .count();
    let word_match_ratio = matched as f32 / query_words.len() as f32;

    let mut score = SEMANTIC_WEIGHT * semantic_score + LEXICAL_WEIGHT * word_match_ratio;
    if chunk_lower.contains(&query_lower) {
        score += PHRASE_BONUS;
    }
    if semantic_score > HIGH_SEMANTIC_THRESHOLD {
        score += HIGH_SEMANTIC_BONUS;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_chunk_match_scores_full_marks() {
        // Chunk containing the query verbatim, with perfect semantic score:
        // every component fires.
        let score = relevance_score("rust borrow checker", "rust borrow checker", 1.0);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn stopword_only_query_falls_back_to_semantic() {
        assert_eq!(relevance_score("anything at all", "what is the", 0.42), 0.42);
    }

    #[test]
    fn word_overlap_raises_the_score() {
        let with_overlap = relevance_score("the borrow checker rejects this", "borrow checker", 0.4);
        let without_overlap = relevance_score("unrelated text entirely", "borrow checker", 0.4);
        assert!(with_overlap > without_overlap);
    }

    #[test]
    fn phrase_presence_beats_scattered_words() {
        let phrase = relevance_score("the borrow checker is strict", "borrow checker", 0.4);
        let scattered = relevance_score("borrow this book and checker that", "borrow checker", 0.4);
        assert!((phrase - scattered - PHRASE_BONUS).abs() < 1e-6);
    }

    #[test]
    fn high_semantic_bonus_applies_above_threshold() {
        let below = relevance_score("no overlap here", "zebra", 0.5);
        let above = relevance_score("no overlap here", "zebra", 0.51);
        assert!(above > below + HIGH_SEMANTIC_BONUS - 0.05);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let lower = relevance_score("the borrow checker", "borrow checker", 0.0);
        let upper = relevance_score("The BORROW Checker", "Borrow CHECKER", 0.0);
        assert_eq!(lower, upper);
    }

    #[test]
    fn stopwords_do_not_count_toward_overlap() {
        // "what is rust" reduces to the single meaningful word "rust".
        let score = relevance_score("rust is a language", "what is rust", 0.0);
        assert!((score - LEXICAL_WEIGHT).abs() < 1e-6);
    }
}
