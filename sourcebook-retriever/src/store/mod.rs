//! Per-source vector index storage.
//!
//! Every ingested source gets its own logical index, addressed by `file_id`.
//! The [`IndexStore`] trait abstracts over where those indexes live; the two
//! implementations are [`SqliteIndexStore`] (durable, survives restarts) and
//! [`MemoryIndexStore`] (tests and ephemeral runs). The backend is chosen once
//! at startup via [`StoreBackend`] and never switched per call.
//!
//! Stores hold unit-length f16 vectors, so similarity search is a brute-force
//! inner product scan over one source's chunks. Indexes are write-once: a
//! source is re-ingested under a fresh `file_id` rather than mutated in place.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryIndexStore;
pub use sqlite::SqliteIndexStore;

use async_trait::async_trait;
use half::f16;
use sourcebook_context::Chunk;
use std::path::PathBuf;
use std::sync::Arc;

/// Errors from index storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying database failure
    #[error("Database error: {source}")]
    Database {
        #[from]
        source: sqlx::Error,
    },

    /// Chunk and embedding row counts must match exactly
    #[error("Chunk rows ({chunks}) do not match embedding rows ({embeddings})")]
    RowCountMismatch { chunks: usize, embeddings: usize },

    /// All embeddings in one index must share a dimension
    #[error("Embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// An index is never persisted without at least one chunk
    #[error("Refusing to persist an empty index")]
    EmptyIndex,
}

/// One scored chunk returned from a single-source similarity search.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    /// Position of the chunk within its source document.
    pub chunk_index: usize,
    /// The chunk text as it was ingested.
    pub content: String,
    /// Inner product between the query vector and the stored vector.
    pub semantic_score: f32,
}

/// Lifecycle state of one source's index.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexStatus {
    /// No index exists under this `file_id`.
    Missing,
    /// Ingestion has started but the index is not yet searchable.
    Pending,
    /// The index is complete and searchable.
    Ready {
        chunk_count: usize,
        dimension: usize,
    },
}

/// Aggregate counts across every index in a store.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub sources: usize,
    pub ready_sources: usize,
    pub pending_sources: usize,
    pub chunks: usize,
}

/// Storage interface for per-source vector indexes.
///
/// Searching a missing or pending index returns an empty hit list rather than
/// an error; absence of an index is an ordinary state, not a failure.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Record that ingestion for `file_id` has started. Idempotent; never
    /// downgrades a ready index back to pending.
    async fn mark_pending(&self, file_id: &str) -> Result<(), StorageError>;

    /// Atomically persist a complete index: all chunk rows plus the ready
    /// marker land together or not at all. `chunks` and `embeddings` are
    /// parallel and every embedding must share one dimension.
    async fn persist(
        &self,
        file_id: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f16>],
    ) -> Result<(), StorageError>;

    /// Return the `top_k` chunks of one source most similar to `query`,
    /// ordered by descending inner product.
    async fn search(
        &self,
        file_id: &str,
        query: &[f16],
        top_k: usize,
    ) -> Result<Vec<ChunkHit>, StorageError>;

    /// Report the lifecycle state of one source's index.
    async fn status(&self, file_id: &str) -> Result<IndexStatus, StorageError>;

    /// Remove one source's index. Deleting an index that does not exist
    /// succeeds; the end state is the same.
    async fn delete(&self, file_id: &str) -> Result<(), StorageError>;

    /// Aggregate counts across the whole store.
    async fn stats(&self) -> Result<StoreStats, StorageError>;
}

/// Which storage implementation to use, fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    /// Durable SQLite database at the given path.
    Sqlite { path: PathBuf },
    /// In-process storage, lost on shutdown.
    Memory,
}

/// Open the configured backend and return it behind the trait object the rest
/// of the pipeline works with.
pub async fn open_store(backend: &StoreBackend) -> Result<Arc<dyn IndexStore>, StorageError> {
    match backend {
        StoreBackend::Sqlite { path } => Ok(Arc::new(SqliteIndexStore::open(path).await?)),
        StoreBackend::Memory => Ok(Arc::new(MemoryIndexStore::new())),
    }
}

/// Validate parallel chunk/embedding rows and return the shared dimension.
pub(crate) fn validate_rows(
    chunks: &[Chunk],
    embeddings: &[Vec<f16>],
) -> Result<usize, StorageError> {
    if chunks.is_empty() {
        return Err(StorageError::EmptyIndex);
    }
    if chunks.len() != embeddings.len() {
        return Err(StorageError::RowCountMismatch {
            chunks: chunks.len(),
            embeddings: embeddings.len(),
        });
    }
    let dimension = embeddings[0].len();
    for embedding in embeddings {
        if embedding.len() != dimension {
            return Err(StorageError::DimensionMismatch {
                expected: dimension,
                found: embedding.len(),
            });
        }
    }
    Ok(dimension)
}

/// Inner product of two same-length f16 vectors, accumulated in f32.
pub(crate) fn inner_product(a: &[f16], b: &[f16]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.to_f32() * y.to_f32())
        .sum()
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

    fn embedding(values: &[f32]) -> Vec<f16> {
        values.iter().copied().map(f16::from_f32).collect()
    }

    #[test]
    fn validate_rows_accepts_parallel_rows() {
        let chunks = vec![chunk(0, "a"), chunk(1, "b")];
        let embeddings = vec![embedding(&[1.0, 0.0]), embedding(&[0.0, 1.0])];
        assert_eq!(validate_rows(&chunks, &embeddings).unwrap(), 2);
    }

    #[test]
    fn validate_rows_rejects_empty_index() {
        assert!(matches!(
            validate_rows(&[], &[]),
            Err(StorageError::EmptyIndex)
        ));
    }

    #[test]
    fn validate_rows_rejects_count_mismatch() {
        let chunks = vec![chunk(0, "a")];
        assert!(matches!(
            validate_rows(&chunks, &[]),
            Err(StorageError::RowCountMismatch {
                chunks: 1,
                embeddings: 0
            })
        ));
    }

    #[test]
    fn validate_rows_rejects_ragged_dimensions() {
        let chunks = vec![chunk(0, "a"), chunk(1, "b")];
        let embeddings = vec![embedding(&[1.0, 0.0]), embedding(&[1.0])];
        assert!(matches!(
            validate_rows(&chunks, &embeddings),
            Err(StorageError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn inner_product_of_orthogonal_vectors_is_zero() {
        let a = embedding(&[1.0, 0.0]);
        let b = embedding(&[0.0, 1.0]);
        assert_eq!(inner_product(&a, &b), 0.0);
        assert!((inner_product(&a, &a) - 1.0).abs() < 1e-3);
    }
}
