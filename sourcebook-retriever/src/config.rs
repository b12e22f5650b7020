//! Configuration for the retrieval pipeline.

use crate::scoring::DEFAULT_MIN_RELEVANCE;
use crate::store::StoreBackend;
use std::time::Duration;

/// Tunables for ingestion and federated search.
///
/// Defaults match the sizing the pipeline was tuned with: 500-token chunks
/// with 100 tokens of overlap, and a 0.3 relevance floor on results.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Maximum tokens per chunk.
    pub max_chunk_tokens: usize,
    /// Tokens shared between consecutive chunks.
    pub overlap_tokens: usize,
    /// Results scoring below this floor are dropped.
    pub min_relevance: f32,
    /// Upper bound on per-source searches running concurrently.
    pub max_concurrent_searches: usize,
    /// Deadline for a single source's search.
    pub search_timeout: Duration,
    /// Which store implementation to open.
    pub backend: StoreBackend,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 500,
            overlap_tokens: 100,
            min_relevance: DEFAULT_MIN_RELEVANCE,
            max_concurrent_searches: 8,
            search_timeout: Duration::from_secs(10),
            backend: StoreBackend::Memory,
        }
    }
}

impl RetrievalConfig {
    /// Set the chunk window size in tokens.
    pub fn with_max_chunk_tokens(mut self, max_chunk_tokens: usize) -> Self {
        self.max_chunk_tokens = max_chunk_tokens;
        self
    }

    /// Set the overlap between consecutive chunks in tokens.
    pub fn with_overlap_tokens(mut self, overlap_tokens: usize) -> Self {
        self.overlap_tokens = overlap_tokens;
        self
    }

    /// Set the relevance floor for search results.
    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = min_relevance;
        self
    }

    /// Set the per-source search concurrency bound.
    pub fn with_max_concurrent_searches(mut self, max_concurrent_searches: usize) -> Self {
        self.max_concurrent_searches = max_concurrent_searches;
        self
    }

    /// Set the per-source search deadline.
    pub fn with_search_timeout(mut self, search_timeout: Duration) -> Self {
        self.search_timeout = search_timeout;
        self
    }

    /// Set the storage backend.
    pub fn with_backend(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self
    }
}
