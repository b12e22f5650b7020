//! In-process index store for tests and ephemeral runs.

use super::{
    ChunkHit, IndexStatus, IndexStore, StorageError, StoreStats, inner_product, validate_rows,
};
use async_trait::async_trait;
use half::f16;
use sourcebook_context::Chunk;
use std::collections::HashMap;
use tokio::sync::RwLock;

enum Entry {
    Pending,
    Ready {
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f16>>,
        dimension: usize,
    },
}

/// Index store held entirely in process memory. Same contract as the SQLite
/// store, nothing survives shutdown.
#[derive(Default)]
pub struct MemoryIndexStore {
    indexes: RwLock<HashMap<String, Entry>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryIndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryIndexStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn mark_pending(&self, file_id: &str) -> Result<(), StorageError> {
        let mut indexes = self.indexes.write().await;
        indexes.entry(file_id.to_string()).or_insert(Entry::Pending);
        Ok(())
    }

    async fn persist(
        &self,
        file_id: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f16>],
    ) -> Result<(), StorageError> {
        let dimension = validate_rows(chunks, embeddings)?;
        let mut indexes = self.indexes.write().await;
        indexes.insert(
            file_id.to_string(),
            Entry::Ready {
                chunks: chunks.to_vec(),
                embeddings: embeddings.to_vec(),
                dimension,
            },
        );
        Ok(())
    }

    async fn search(
        &self,
        file_id: &str,
        query: &[f16],
        top_k: usize,
    ) -> Result<Vec<ChunkHit>, StorageError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let indexes = self.indexes.read().await;
        let Some(Entry::Ready {
            chunks,
            embeddings,
            dimension,
        }) = indexes.get(file_id)
        else {
            return Ok(Vec::new());
        };
        if *dimension != query.len() {
            tracing::warn!(
                "Index {file_id} has dimension {dimension}, query has {}; skipping",
                query.len()
            );
            return Ok(Vec::new());
        }

        let mut hits: Vec<ChunkHit> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| ChunkHit {
                chunk_index: chunk.index,
                content: chunk.text.clone(),
                semantic_score: inner_product(query, embedding),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.semantic_score
                .partial_cmp(&a.semantic_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn status(&self, file_id: &str) -> Result<IndexStatus, StorageError> {
        let indexes = self.indexes.read().await;
        Ok(match indexes.get(file_id) {
            None => IndexStatus::Missing,
            Some(Entry::Pending) => IndexStatus::Pending,
            Some(Entry::Ready {
                chunks, dimension, ..
            }) => IndexStatus::Ready {
                chunk_count: chunks.len(),
                dimension: *dimension,
            },
        })
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        let mut indexes = self.indexes.write().await;
        indexes.remove(file_id);
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StorageError> {
        let indexes = self.indexes.read().await;
        let mut stats = StoreStats {
            sources: indexes.len(),
            ..StoreStats::default()
        };
        for entry in indexes.values() {
            match entry {
                Entry::Pending => stats.pending_sources += 1,
                Entry::Ready { chunks, .. } => {
                    stats.ready_sources += 1;
                    stats.chunks += chunks.len();
                }
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            index,
            text: text.to_string(),
            token_count: text.split_whitespace().count(),
        }
    }

    fn unit_x() -> Vec<f16> {
        vec![f16::from_f32(1.0), f16::from_f32(0.0)]
    }

    #[tokio::test]
    async fn follows_the_index_store_contract() {
        let store = MemoryIndexStore::new();
        assert_eq!(store.status("doc").await.unwrap(), IndexStatus::Missing);
        assert!(store.search("doc", &unit_x(), 5).await.unwrap().is_empty());

        store.mark_pending("doc").await.unwrap();
        assert_eq!(store.status("doc").await.unwrap(), IndexStatus::Pending);
        assert!(store.search("doc", &unit_x(), 5).await.unwrap().is_empty());

        store
            .persist("doc", &[chunk(0, "hello")], &[unit_x()])
            .await
            .unwrap();
        let hits = store.search("doc", &unit_x(), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].semantic_score - 1.0).abs() < 1e-3);

        store.delete("doc").await.unwrap();
        assert_eq!(store.status("doc").await.unwrap(), IndexStatus::Missing);
        store.delete("doc").await.unwrap();
    }

    #[tokio::test]
    async fn stats_count_entries_by_state() {
        let store = MemoryIndexStore::new();
        store.mark_pending("a").await.unwrap();
        store
            .persist("b", &[chunk(0, "x"), chunk(1, "y")], &[unit_x(), unit_x()])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.sources, 2);
        assert_eq!(stats.pending_sources, 1);
        assert_eq!(stats.ready_sources, 1);
        assert_eq!(stats.chunks, 2);
    }
}
