//! Error types for the retrieval pipeline.

use crate::store::StorageError;
use sourcebook_context::ChunkerError;
use sourcebook_embed::EmbedError;

/// Result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Error type covering the whole ingest/search/delete pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// The source text chunked to nothing; there is nothing to index
    #[error("Source text produced no indexable chunks")]
    NoContent,

    /// Invalid chunking configuration
    #[error("Invalid chunker configuration: {source}")]
    Chunker {
        #[from]
        source: ChunkerError,
    },

    /// Embedding generation failed
    #[error("Embedding generation failed: {source}")]
    Embedding {
        #[from]
        source: EmbedError,
    },

    /// Index storage failed
    #[error("Index storage failed: {source}")]
    Storage {
        #[from]
        source: StorageError,
    },

    /// A background ingestion task panicked or was cancelled
    #[error("Background ingestion task failed: {source}")]
    Background {
        #[from]
        source: tokio::task::JoinError,
    },
}
