//! Source lifecycle: ingestion and deletion.
//!
//! Ingestion turns one source document into a searchable index: chunk the
//! text, embed every chunk, persist chunks and vectors together, and hand back
//! the generated `file_id`. The persist step is atomic, so a source is either
//! fully searchable or not searchable at all; there is no state in which a
//! query sees half a document.
//!
//! Background ingestion does the same work off the caller's task. The index
//! is visible as pending from the moment the ticket is issued, and a failed
//! background run cleans its pending marker back out so nothing is left
//! half-born.
//!
//! Deletion is best-effort and idempotent: deleting a missing index is
//! success, and a storage failure during delete is logged rather than
//! propagated.

use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};
use crate::store::IndexStore;
use sourcebook_context::TokenChunker;
use sourcebook_embed::EmbeddingProvider;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Handle to one in-flight background ingestion.
#[derive(Debug)]
pub struct IngestTicket {
    file_id: String,
    handle: JoinHandle<Result<()>>,
}

impl IngestTicket {
    /// The `file_id` the source will be searchable under once ingestion
    /// completes.
    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    /// Wait for ingestion to finish, returning the `file_id` on success.
    pub async fn wait(self) -> Result<String> {
        self.handle.await??;
        Ok(self.file_id)
    }
}

/// Drives sources through their lifecycle against one store and one provider.
#[derive(Clone)]
pub struct LifecycleManager {
    chunker: Arc<TokenChunker>,
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn IndexStore>,
}

impl LifecycleManager {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn IndexStore>,
        config: &RetrievalConfig,
    ) -> Result<Self> {
        let chunker = TokenChunker::new(config.max_chunk_tokens, config.overlap_tokens)?;
        Ok(Self {
            chunker: Arc::new(chunker),
            provider,
            store,
        })
    }

    /// Ingest one source document, returning its generated `file_id`.
    ///
    /// Empty or whitespace-only text fails with [`RetrievalError::NoContent`]
    /// and persists nothing.
    pub async fn ingest_source(&self, text: &str) -> Result<String> {
        let file_id = Uuid::new_v4().to_string();
        self.ingest_as(&file_id, text).await?;
        Ok(file_id)
    }

    /// Start ingesting a source off the caller's task.
    ///
    /// The returned ticket carries the `file_id` immediately; the index shows
    /// as pending (and searches as empty) until the background work commits.
    pub async fn ingest_source_background(&self, text: String) -> Result<IngestTicket> {
        let file_id = Uuid::new_v4().to_string();
        self.store.mark_pending(&file_id).await?;

        let manager = self.clone();
        let task_file_id = file_id.clone();
        let handle = tokio::spawn(async move {
            match manager.ingest_as(&task_file_id, &text).await {
                Ok(()) => Ok(()),
                Err(error) => {
                    tracing::warn!("Background ingestion of {task_file_id} failed: {error}");
                    // Remove the pending marker so the failure leaves no trace.
                    if let Err(cleanup) = manager.store.delete(&task_file_id).await {
                        tracing::warn!(
                            "Cleanup of failed ingestion {task_file_id} also failed: {cleanup}"
                        );
                    }
                    Err(error)
                }
            }
        });

        Ok(IngestTicket { file_id, handle })
    }

    /// Remove one source's index. Best-effort: a missing index is success and
    /// a storage failure is logged, never propagated.
    pub async fn delete_source(&self, file_id: &str) {
        if let Err(error) = self.store.delete(file_id).await {
            tracing::warn!("Failed to delete index {file_id}: {error}");
        } else {
            tracing::info!("Deleted source {file_id}");
        }
    }

    async fn ingest_as(&self, file_id: &str, text: &str) -> Result<()> {
        let chunks = self.chunker.split(text);
        if chunks.is_empty() {
            return Err(RetrievalError::NoContent);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let result = self.provider.embed_texts(&texts).await?;
        self.store
            .persist(file_id, &chunks, &result.embeddings)
            .await?;

        tracing::info!(
            "Ingested source {file_id}: {} chunks, dimension {}",
            chunks.len(),
            result.dimension
        );
        Ok(())
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("chunker", &self.chunker)
            .field("provider", &self.provider.provider_name())
            .finish_non_exhaustive()
    }
}
