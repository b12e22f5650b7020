//! Federated search across multiple source indexes.
//!
//! A query names the set of sources it wants answers from. The [`Retriever`]
//! embeds the query once, fans the vector out to every named source index
//! under a concurrency bound, then blends the per-source hits into a single
//! ranked result list using [`crate::scoring`].
//!
//! A single misbehaving source never sinks the whole query: per-source
//! failures and timeouts are logged and contribute zero results, and the
//! remaining sources answer normally.

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::scoring;
use crate::store::IndexStore;
use futures::StreamExt;
use serde::Serialize;
use sourcebook_embed::EmbeddingProvider;
use std::cmp::Ordering;
use std::sync::Arc;

/// One chunk in the final blended ranking.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// The source this chunk came from.
    pub file_id: String,
    /// Position of the chunk within its source.
    pub chunk_index: usize,
    /// The chunk text.
    pub chunk_text: String,
    /// Raw semantic similarity between query and chunk.
    pub semantic_score: f32,
    /// Blended relevance score used for the final ordering.
    pub relevance_score: f32,
}

/// Searches a fixed set of source indexes and blends the results.
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn IndexStore>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn IndexStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// Search every index in `file_ids` and return the `top_k` most relevant
    /// chunks overall.
    ///
    /// Results are ordered by descending relevance, with semantic score and
    /// then the position of the source in `file_ids` breaking ties, so a
    /// repeated query over the same indexes returns the same ordering.
    /// Sources that are missing, pending, failing, or slow contribute nothing.
    pub async fn search_across(
        &self,
        query: &str,
        file_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if file_ids.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        // Embed the query once, shared across every per-source search.
        let query_vector = self.provider.embed_text(query).await?;

        let per_source = file_ids.iter().enumerate().map(|(position, file_id)| {
            let store = Arc::clone(&self.store);
            let query_vector = query_vector.clone();
            let timeout = self.config.search_timeout;
            async move {
                let hits =
                    match tokio::time::timeout(timeout, store.search(file_id, &query_vector, top_k))
                        .await
                    {
                        Ok(Ok(hits)) => hits,
                        Ok(Err(error)) => {
                            tracing::warn!("Search failed for source {file_id}: {error}");
                            Vec::new()
                        }
                        Err(_) => {
                            tracing::warn!("Search timed out for source {file_id}");
                            Vec::new()
                        }
                    };
                (position, file_id, hits)
            }
        });
        let source_hits: Vec<_> = futures::stream::iter(per_source)
            .buffer_unordered(self.config.max_concurrent_searches)
            .collect()
            .await;

        let mut ranked: Vec<(usize, SearchResult)> = Vec::new();
        for (position, file_id, hits) in source_hits {
            for hit in hits {
                let relevance = scoring::relevance_score(&hit.content, query, hit.semantic_score);
                if relevance < self.config.min_relevance {
                    continue;
                }
                ranked.push((
                    position,
                    SearchResult {
                        file_id: file_id.clone(),
                        chunk_index: hit.chunk_index,
                        chunk_text: hit.content,
                        semantic_score: hit.semantic_score,
                        relevance_score: relevance,
                    },
                ));
            }
        }

        ranked.sort_by(|(pos_a, a), (pos_b, b)| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    b.semantic_score
                        .partial_cmp(&a.semantic_score)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| pos_a.cmp(pos_b))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        ranked.truncate(top_k);

        tracing::debug!(
            "Query over {} sources produced {} results",
            file_ids.len(),
            ranked.len()
        );
        Ok(ranked.into_iter().map(|(_, result)| result).collect())
    }
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("provider", &self.provider.provider_name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
