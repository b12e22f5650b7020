//! SQLite-backed index store.
//!
//! One database file holds every source index. The `source_indexes` table
//! carries the lifecycle row per source (pending/ready, dimension, counts) and
//! `source_chunks` holds the chunk text plus its embedding as a little-endian
//! f16 BLOB. Persisting an index writes the chunk rows and flips the status to
//! ready inside a single transaction, so a reader never observes a partially
//! written index: before the commit the source is pending and unsearchable,
//! after it the full index is visible.

use super::{
    ChunkHit, IndexStatus, IndexStore, StorageError, StoreStats, inner_product, validate_rows,
};
use async_trait::async_trait;
use chrono::Utc;
use half::f16;
use sourcebook_context::Chunk;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// Index store persisted in a single SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteIndexStore {
    pool: SqlitePool,
}

impl SqliteIndexStore {
    /// Open (or create) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16),
        )
        .await?;
        Self::with_pool(pool).await
    }

    /// Open an in-memory database. Pooled to a single connection so every
    /// query sees the same database.
    pub async fn open_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().in_memory(true).foreign_keys(true))
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS source_indexes (
                file_id TEXT PRIMARY KEY,
                status TEXT NOT NULL DEFAULT 'pending',
                dimension INTEGER,
                chunk_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                ready_at INTEGER
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS source_chunks (
                file_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (file_id, chunk_index),
                FOREIGN KEY (file_id) REFERENCES source_indexes (file_id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// The underlying connection pool, exposed for diagnostics.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn mark_pending(&self, file_id: &str) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO source_indexes (file_id, status, created_at) VALUES (?1, 'pending', ?2)
             ON CONFLICT (file_id) DO NOTHING",
        )
        .bind(file_id)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn persist(
        &self,
        file_id: &str,
        chunks: &[Chunk],
        embeddings: &[Vec<f16>],
    ) -> Result<(), StorageError> {
        let dimension = validate_rows(chunks, embeddings)?;
        let now = Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO source_indexes (file_id, status, dimension, chunk_count, created_at, ready_at)
             VALUES (?1, 'ready', ?2, ?3, ?4, ?4)
             ON CONFLICT (file_id) DO UPDATE SET
                 status = 'ready',
                 dimension = excluded.dimension,
                 chunk_count = excluded.chunk_count,
                 ready_at = excluded.ready_at",
        )
        .bind(file_id)
        .bind(dimension as i64)
        .bind(chunks.len() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // A retried ingest replaces any rows from an earlier attempt.
        sqlx::query("DELETE FROM source_chunks WHERE file_id = ?1")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let embedding_bytes = bytemuck::cast_slice::<f16, u8>(embedding);
            sqlx::query(
                "INSERT INTO source_chunks (file_id, chunk_index, content, token_count, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(file_id)
            .bind(chunk.index as i64)
            .bind(&chunk.text)
            .bind(chunk.token_count as i64)
            .bind(embedding_bytes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!("Persisted index {file_id}: {} chunks", chunks.len());
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

        let index_row =
            sqlx::query("SELECT status, dimension FROM source_indexes WHERE file_id = ?1")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(index_row) = index_row else {
            return Ok(Vec::new());
        };
        if index_row.get::<String, _>("status") != "ready" {
            return Ok(Vec::new());
        }
        let dimension = index_row.get::<Option<i64>, _>("dimension").unwrap_or(0);
        if dimension as usize != query.len() {
            tracing::warn!(
                "Index {file_id} has dimension {dimension}, query has {}; skipping",
                query.len()
            );
            return Ok(Vec::new());
        }

        let rows =
            sqlx::query("SELECT chunk_index, content, embedding FROM source_chunks WHERE file_id = ?1")
                .bind(file_id)
                .fetch_all(&self.pool)
                .await?;

        let mut hits: Vec<ChunkHit> = rows
            .into_iter()
            .map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let embedding = bytemuck::pod_collect_to_vec::<u8, f16>(&embedding_bytes);
                ChunkHit {
                    chunk_index: row.get::<i64, _>("chunk_index") as usize,
                    content: row.get("content"),
                    semantic_score: inner_product(query, &embedding),
                }
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
        let row = sqlx::query(
            "SELECT status, dimension, chunk_count FROM source_indexes WHERE file_id = ?1",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => IndexStatus::Missing,
            Some(row) if row.get::<String, _>("status") == "ready" => IndexStatus::Ready {
                chunk_count: row.get::<i64, _>("chunk_count") as usize,
                dimension: row.get::<Option<i64>, _>("dimension").unwrap_or(0) as usize,
            },
            Some(_) => IndexStatus::Pending,
        })
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM source_chunks WHERE file_id = ?1")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM source_indexes WHERE file_id = ?1")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::debug!(
            "Deleted index {file_id} ({} row(s) removed)",
            result.rows_affected()
        );
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS sources,
                    COALESCE(SUM(CASE WHEN status = 'ready' THEN 1 ELSE 0 END), 0) AS ready,
                    COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS pending,
                    COALESCE(SUM(chunk_count), 0) AS chunks
             FROM source_indexes",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            sources: row.get::<i64, _>("sources") as usize,
            ready_sources: row.get::<i64, _>("ready") as usize,
            pending_sources: row.get::<i64, _>("pending") as usize,
            chunks: row.get::<i64, _>("chunks") as usize,
        })
    }
}
